//! In-process checkpoint storage.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;

use crate::store::{CheckpointID, CheckpointRecord, CheckpointStore};

/// Checkpoint store that lives in process memory.
///
/// Nothing survives a restart of the process, so this is only useful for
/// tests and dry runs. Every stored offset is also appended to a history
/// so tests can check how checkpoints moved over time.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<CheckpointID, CheckpointRecord>>,
    history: Mutex<HashMap<CheckpointID, Vec<i64>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every offset stored for `id`, oldest first.
    pub fn history(&self, id: &CheckpointID) -> Vec<i64> {
        self.history
            .lock()
            .map(|h| h.get(id).cloned().unwrap_or_default())
            .unwrap_or_default()
    }
}

#[async_trait]
impl CheckpointStore for MemoryStore {
    async fn store_checkpoint(&self, id: &CheckpointID, record: &CheckpointRecord) -> Result<()> {
        self.records
            .lock()
            .map_err(|_| anyhow::anyhow!("checkpoint map poisoned"))?
            .insert(id.clone(), record.clone());
        self.history
            .lock()
            .map_err(|_| anyhow::anyhow!("checkpoint history poisoned"))?
            .entry(id.clone())
            .or_default()
            .push(record.offset);
        Ok(())
    }

    async fn read_checkpoint(&self, id: &CheckpointID) -> Result<Option<CheckpointRecord>> {
        Ok(self
            .records
            .lock()
            .map_err(|_| anyhow::anyhow!("checkpoint map poisoned"))?
            .get(id)
            .cloned())
    }

    async fn list_checkpoints(&self, topic: &str) -> Result<Vec<CheckpointRecord>> {
        let mut records: Vec<CheckpointRecord> = self
            .records
            .lock()
            .map_err(|_| anyhow::anyhow!("checkpoint map poisoned"))?
            .iter()
            .filter(|(id, _)| id.topic == topic)
            .map(|(_, record)| record.clone())
            .collect();
        records.sort_by_key(|r| r.partition);
        Ok(records)
    }
}

//! Per-partition checkpoint tracking on top of a store.

use std::sync::Arc;

use anyhow::Result;

use crate::store::{CheckpointID, CheckpointRecord, CheckpointStore};

/// Manager for handling checkpoint operations of one topic.
///
/// Hands out a [`PartitionCheckpoint`] per partition. Each handle is owned
/// by exactly one partition loop, so no state is shared between partitions
/// beyond the store itself.
///
/// # Example
///
/// ```rust,ignore
/// use checkpoint::{CheckpointManager, FilesystemStore};
///
/// let manager = CheckpointManager::new(Arc::new(FilesystemStore::new("/tmp/checkpoint_aqi")), "aqi_stream");
/// let mut partition = manager.partition(0).await?;
///
/// // After the sink confirms offsets up to 41 are durable:
/// partition.commit(41).await?;
/// assert_eq!(partition.resume_offset(), Some(42));
/// ```
#[derive(Clone)]
pub struct CheckpointManager {
    store: Arc<dyn CheckpointStore>,
    topic: String,
}

impl CheckpointManager {
    pub fn new(store: Arc<dyn CheckpointStore>, topic: impl Into<String>) -> Self {
        Self {
            store,
            topic: topic.into(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Last committed offset of `partition`, if any.
    pub async fn load(&self, partition: i32) -> Result<Option<i64>> {
        let id = CheckpointID::new(self.topic.clone(), partition);
        Ok(self.store.read_checkpoint(&id).await?.map(|r| r.offset))
    }

    /// Load the checkpoint of `partition` into a handle that commits to it.
    pub async fn partition(&self, partition: i32) -> Result<PartitionCheckpoint> {
        let id = CheckpointID::new(self.topic.clone(), partition);
        let last = self.store.read_checkpoint(&id).await?;
        Ok(PartitionCheckpoint {
            store: Arc::clone(&self.store),
            id,
            last,
        })
    }

    /// All committed checkpoints of the topic.
    pub async fn list(&self) -> Result<Vec<CheckpointRecord>> {
        self.store.list_checkpoints(&self.topic).await
    }
}

/// Checkpoint of a single partition.
///
/// Enforces monotonic commits: a lower offset than the last committed one
/// is refused, the same offset is a no-op.
pub struct PartitionCheckpoint {
    store: Arc<dyn CheckpointStore>,
    id: CheckpointID,
    last: Option<CheckpointRecord>,
}

impl PartitionCheckpoint {
    pub fn id(&self) -> &CheckpointID {
        &self.id
    }

    /// Last committed offset.
    pub fn last_committed(&self) -> Option<i64> {
        self.last.as_ref().map(|r| r.offset)
    }

    /// Offset consumption should resume from, if anything was committed.
    pub fn resume_offset(&self) -> Option<i64> {
        self.last.as_ref().map(CheckpointRecord::resume_offset)
    }

    /// Persist `offset` as the last durable offset of this partition.
    ///
    /// Returns the stored record, or `None` when `offset` was already
    /// committed.
    pub async fn commit(&mut self, offset: i64) -> Result<Option<CheckpointRecord>> {
        if let Some(last) = self.last_committed() {
            if offset < last {
                anyhow::bail!(
                    "Refusing to move checkpoint {} back from offset {} to {}",
                    self.id,
                    last,
                    offset
                );
            }
            if offset == last {
                return Ok(None);
            }
        }

        let record = CheckpointRecord::new(self.id.partition, offset);
        self.store.store_checkpoint(&self.id, &record).await?;
        tracing::debug!("Committed checkpoint {} at offset {}", self.id, offset);
        self.last = Some(record.clone());
        Ok(Some(record))
    }
}

//! In-memory sink keyed like the reading table.

use std::collections::BTreeMap;
use std::sync::Mutex;

use aqi_core::{ParsedReading, WriteBatch};

use crate::error::WriteError;
use crate::traits::SinkWriter;

/// Sink that keeps rows in a map keyed by `(city, timestamp)`.
///
/// Mirrors the upsert semantics of the reading table: a later write to the
/// same key replaces the earlier row. A batch is applied under one lock, so
/// it becomes visible all at once.
#[derive(Default)]
pub struct MemorySink {
    rows: Mutex<BTreeMap<(String, String), ParsedReading>>,
    upserts: Mutex<u64>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct rows stored.
    pub fn len(&self) -> usize {
        self.rows.lock().map(|rows| rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Row stored under `(city, timestamp)`.
    pub fn get(&self, city: &str, timestamp: &str) -> Option<ParsedReading> {
        self.rows
            .lock()
            .ok()?
            .get(&(city.to_string(), timestamp.to_string()))
            .cloned()
    }

    /// Every stored row, ordered by key.
    pub fn rows(&self) -> Vec<ParsedReading> {
        self.rows
            .lock()
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of individual upserts applied, including overwrites.
    pub fn upserts(&self) -> u64 {
        self.upserts.lock().map(|n| *n).unwrap_or(0)
    }
}

#[async_trait::async_trait]
impl SinkWriter for MemorySink {
    async fn write_batch(&self, batch: &WriteBatch) -> Result<(), WriteError> {
        let mut rows = self
            .rows
            .lock()
            .map_err(|_| WriteError::Fatal("memory sink poisoned".to_string()))?;
        for reading in &batch.readings {
            rows.insert(
                (reading.city.clone(), reading.timestamp.clone()),
                reading.clone(),
            );
        }
        drop(rows);

        let mut upserts = self
            .upserts
            .lock()
            .map_err(|_| WriteError::Fatal("memory sink poisoned".to_string()))?;
        *upserts += batch.readings.len() as u64;
        Ok(())
    }
}

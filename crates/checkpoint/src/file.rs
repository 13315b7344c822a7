//! On-disk checkpoint file format.

use serde::{Deserialize, Serialize};

use crate::store::{CheckpointID, CheckpointRecord};

/// Self-describing checkpoint file.
///
/// # File Format
///
/// ```json
/// {
///     "topic": "aqi_stream",
///     "partition": 0,
///     "offset": 1041,
///     "committed_at": "2024-01-01T00:00:00Z"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointFile {
    /// Topic the offset belongs to; guards against reading another topic's file
    pub topic: String,
    #[serde(flatten)]
    pub record: CheckpointRecord,
}

impl CheckpointFile {
    pub fn new(id: &CheckpointID, record: &CheckpointRecord) -> Self {
        Self {
            topic: id.topic.clone(),
            record: record.clone(),
        }
    }

    /// File name for a checkpoint id, e.g. `aqi_stream-0.json`.
    pub fn file_name(id: &CheckpointID) -> String {
        format!("{}-{}.json", id.topic, id.partition)
    }

    /// Whether this file belongs to `id`.
    pub fn matches(&self, id: &CheckpointID) -> bool {
        self.topic == id.topic && self.record.partition == id.partition
    }
}

//! Checkpoint storage trait and types
//!
//! This module defines the CheckpointStore trait for backend-agnostic
//! checkpoint storage operations, plus shared types.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Checkpoint identifier for storage
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CheckpointID {
    /// Source topic the offsets belong to
    pub topic: String,
    /// Source partition
    pub partition: i32,
}

impl CheckpointID {
    pub fn new(topic: impl Into<String>, partition: i32) -> Self {
        Self {
            topic: topic.into(),
            partition,
        }
    }
}

impl std::fmt::Display for CheckpointID {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.topic, self.partition)
    }
}

/// Durably recorded progress of one partition.
///
/// `offset` is the last offset whose effects are durable in the sink.
/// Consumption resumes at `offset + 1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub partition: i32,
    pub offset: i64,
    pub committed_at: DateTime<Utc>,
}

impl CheckpointRecord {
    pub fn new(partition: i32, offset: i64) -> Self {
        Self {
            partition,
            offset,
            committed_at: Utc::now(),
        }
    }

    /// Offset consumption should resume from.
    pub fn resume_offset(&self) -> i64 {
        self.offset + 1
    }
}

/// Trait for checkpoint storage operations.
///
/// This trait abstracts the storage backend for checkpoint operations,
/// allowing the same checkpoint logic to work with:
/// - Filesystem storage (`FilesystemStore`)
/// - Cassandra/ScyllaDB (`CassandraStore`)
/// - Process memory (`MemoryStore`)
///
/// Implementations must replace a stored record atomically: a reader that
/// races a crash observes either the previous record or the new one.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Store a checkpoint in the storage backend, replacing any previous one.
    async fn store_checkpoint(&self, id: &CheckpointID, record: &CheckpointRecord) -> Result<()>;

    /// Read a checkpoint from the storage backend.
    ///
    /// Returns None if the checkpoint doesn't exist.
    async fn read_checkpoint(&self, id: &CheckpointID) -> Result<Option<CheckpointRecord>>;

    /// Read every checkpoint stored for a topic, ordered by partition.
    async fn list_checkpoints(&self, topic: &str) -> Result<Vec<CheckpointRecord>>;
}

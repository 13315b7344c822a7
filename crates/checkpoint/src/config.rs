//! Checkpoint storage configuration.

use std::sync::Arc;

use anyhow::Result;
use clap::{Args, ValueEnum};
use scylla::client::session::Session;

use crate::{CassandraStore, CheckpointStore, FilesystemStore, MemoryStore};

/// Default directory for filesystem checkpoints.
pub const DEFAULT_CHECKPOINT_DIR: &str = "/tmp/checkpoint_aqi";

/// Default table for Cassandra checkpoints.
pub const DEFAULT_CHECKPOINT_TABLE: &str = "pipeline_checkpoints";

/// Backend kind selectable on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageKind {
    /// One JSON file per partition in `--checkpoint-dir`
    Filesystem,
    /// A table in the sink keyspace
    Cassandra,
    /// Process memory; lost on exit
    Memory,
}

/// Where checkpoints are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckpointStorage {
    Memory,
    Filesystem { dir: String },
    Cassandra { keyspace: String, table: String },
}

impl Default for CheckpointStorage {
    fn default() -> Self {
        Self::Filesystem {
            dir: DEFAULT_CHECKPOINT_DIR.to_string(),
        }
    }
}

impl CheckpointStorage {
    /// Whether this backend needs a Cassandra session to open.
    pub fn needs_session(&self) -> bool {
        matches!(self, CheckpointStorage::Cassandra { .. })
    }

    /// Open the configured store.
    ///
    /// `session` is required for the Cassandra backend and ignored otherwise.
    pub async fn open(&self, session: Option<Arc<Session>>) -> Result<Arc<dyn CheckpointStore>> {
        match self {
            CheckpointStorage::Memory => Ok(Arc::new(MemoryStore::new())),
            CheckpointStorage::Filesystem { dir } => Ok(Arc::new(FilesystemStore::new(dir))),
            CheckpointStorage::Cassandra { keyspace, table } => {
                let session = session.ok_or_else(|| {
                    anyhow::anyhow!("Cassandra session not provided for checkpoint storage")
                })?;
                Ok(Arc::new(CassandraStore::new(session, keyspace, table).await?))
            }
        }
    }
}

/// Checkpoint options for the command line.
#[derive(Debug, Clone, Args)]
pub struct CheckpointOpts {
    /// Checkpoint storage backend
    #[arg(long, value_enum, default_value = "filesystem", env = "AQI_CHECKPOINT_STORAGE")]
    pub checkpoint_storage: StorageKind,

    /// Directory for filesystem checkpoints
    #[arg(long, default_value = DEFAULT_CHECKPOINT_DIR, env = "AQI_CHECKPOINT_DIR")]
    pub checkpoint_dir: String,

    /// Table for Cassandra checkpoints (created in the sink keyspace)
    #[arg(long, default_value = DEFAULT_CHECKPOINT_TABLE)]
    pub checkpoint_table: String,
}

impl CheckpointOpts {
    /// Resolve the storage, placing Cassandra checkpoints in `keyspace`.
    pub fn storage(&self, keyspace: &str) -> CheckpointStorage {
        match self.checkpoint_storage {
            StorageKind::Filesystem => CheckpointStorage::Filesystem {
                dir: self.checkpoint_dir.clone(),
            },
            StorageKind::Cassandra => CheckpointStorage::Cassandra {
                keyspace: keyspace.to_string(),
                table: self.checkpoint_table.clone(),
            },
            StorageKind::Memory => CheckpointStorage::Memory,
        }
    }
}

//! Checkpoint management for aqi-sync
//!
//! Records, per source partition, the last offset whose readings are
//! durably stored in the sink.
//!
//! # Architecture
//!
//! This crate provides a backend-agnostic checkpoint system that:
//! - Defines the `CheckpointStore` trait for storage backends
//! - Provides `CheckpointManager` / `PartitionCheckpoint` for monotonic,
//!   per-partition commits
//! - Selects a backend from `CheckpointOpts` / `CheckpointStorage`
//!
//! ## Storage Backends
//!
//! - `FilesystemStore` - One JSON file per partition, replaced atomically
//! - `CassandraStore` - One row per partition in a Cassandra/ScyllaDB table
//! - `MemoryStore` - Process memory, for tests
//!
//! Only the pipeline coordinator commits checkpoints, and only after the
//! sink has confirmed that every reading up to the offset is durable.

mod cassandra;
mod config;
mod file;
mod filesystem;
mod manager;
mod memory;
pub mod store;


// Re-export config types
pub use config::{
    CheckpointOpts, CheckpointStorage, StorageKind, DEFAULT_CHECKPOINT_DIR,
    DEFAULT_CHECKPOINT_TABLE,
};

// Re-export file types
pub use file::CheckpointFile;

// Re-export manager types
pub use manager::{CheckpointManager, PartitionCheckpoint};

// Re-export store trait and types
pub use store::{CheckpointID, CheckpointRecord, CheckpointStore};

// Re-export storage implementations
pub use cassandra::{CassandraStore, CheckpointCql};
pub use filesystem::FilesystemStore;
pub use memory::MemoryStore;

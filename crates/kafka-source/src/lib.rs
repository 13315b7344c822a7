//! Kafka source for `aqi-sync`.
//!
//! Features:
//!
//! - Per-partition readers: one rdkafka consumer per partition, manually
//!   assigned at the checkpointed offset, so partitions never block each other
//! - No broker-side offsets: auto-commit and partition EOF events are disabled;
//!   progress lives only in the pipeline's checkpoint store
//! - Bounded batch pulls: wait for the first message, then linger briefly to
//!   fill the batch
//! - Transient broker errors are retried with exponential backoff and escalate
//!   to a fatal error once the retry budget is used up
//! - Dead-letter topic producer for rejected records

/// High-level API over one topic
///
/// Answers partition and watermark queries and opens the partition readers.
pub mod client;

/// CLI options
pub mod config;

/// Low-level reader pinned to one partition
pub mod consumer;
pub mod dead_letter;
pub mod error;

/// Traits the pipeline is written against
pub mod source;

pub use client::Client;
pub use config::KafkaOpts;
pub use consumer::{ConsumerConfig, PartitionConsumer};
pub use dead_letter::KafkaDeadLetter;
pub use error::{is_transient_code, Error, Result};
pub use source::{LogSource, PartitionReader, StartOffset};

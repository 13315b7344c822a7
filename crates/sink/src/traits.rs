//! SinkWriter and DeadLetterSink trait definitions.
//!
//! These traits abstract over the storage behind the pipeline, allowing the
//! coordinator to be compiled against a single interface that works with
//! the Cassandra sink in production and in-memory sinks in tests.

use aqi_core::{DeadLetterRecord, WriteBatch};

use crate::error::WriteError;

/// Trait for writing readings to the column store.
///
/// # Contract
///
/// - Every reading is written as an upsert keyed by `(city, timestamp)`, so
///   writing the same reading twice leaves the store unchanged.
/// - `Ok(())` means every reading in the batch is durably visible. There is
///   no partial success: if any reading fails, the whole call fails and the
///   whole batch may be retried.
/// - Concurrent calls from different partitions must be safe without
///   external locking; overlapping keys resolve by last-write-wins.
///
/// # Usage Pattern
///
/// The coordinator uses generics for zero-cost dispatch:
///
/// ```ignore
/// pub async fn run_partition<W: SinkWriter>(sink: &W, batch: &WriteBatch) -> Result<()> {
///     sink.write_batch(batch).await?;
/// }
/// ```
#[async_trait::async_trait]
pub trait SinkWriter: Send + Sync {
    /// Upsert every reading of `batch`.
    async fn write_batch(&self, batch: &WriteBatch) -> Result<(), WriteError>;
}

/// Trait for the side channel receiving rejected records.
///
/// Uses the same error classification as [`SinkWriter`]: transient failures
/// are retried, fatal ones halt the partition.
#[async_trait::async_trait]
pub trait DeadLetterSink: Send + Sync {
    /// Durably record every rejected message of a batch.
    async fn send(&self, records: &[DeadLetterRecord]) -> Result<(), WriteError>;
}

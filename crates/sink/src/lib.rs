//! Sink trait abstraction.
//!
//! This crate defines the `SinkWriter` trait for idempotent, keyed reading
//! writes and the `DeadLetterSink` trait for rejected records. The
//! `cassandra-sink` crate implements `SinkWriter` against Cassandra/ScyllaDB
//! and the Kafka source crate implements `DeadLetterSink` for a dead-letter
//! topic, so the pipeline can be written once against these interfaces.
//!
//! The traits use aqi-core types (WriteBatch, DeadLetterRecord) to avoid
//! coupling to a specific driver.

mod dead_letter;
mod error;
mod memory;
mod traits;

pub use dead_letter::{JsonlDeadLetter, MemoryDeadLetter};
pub use error::WriteError;
pub use memory::MemorySink;
pub use traits::{DeadLetterSink, SinkWriter};

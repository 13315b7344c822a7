//! Core types for the aqi-sync pipeline.
//!
//! This crate provides the foundational types shared by every stage of the
//! pipeline:
//!
//! - [`RawMessage`] - A message as pulled from a source-log partition
//! - [`ParsedReading`] - A validated air-quality reading, keyed by (city, timestamp)
//! - [`WriteBatch`] - Readings handed to the sink together with the offsets they cover
//! - [`SchemaValidator`] - Turns raw payloads into readings or typed rejections
//! - [`DeadLetterRecord`] - A rejected message retained for later inspection
//! - [`RetryPolicy`] - Bounded exponential backoff shared by source, sink and coordinator
//! - [`validate_identifier`] - Guards keyspace and table names interpolated into CQL
//!
//! # Architecture
//!
//! ```text
//! aqi-core (this crate)
//!    │
//!    ├─── checkpoint              (offset checkpoint stores)
//!    ├─── reading-sink            (SinkWriter / DeadLetterSink traits)
//!    │      └─── cassandra-sink   (CQL implementation)
//!    ├─── aqi-sync-kafka-source   (rdkafka partition readers)
//!    └─── aqi-sync-pipeline       (per-partition coordinator loop)
//! ```
//!
//! # Example
//!
//! ```rust
//! use aqi_core::{RawMessage, SchemaValidator};
//!
//! let raw = RawMessage::new(
//!     0,
//!     42,
//!     br#"{"city":"Delhi","aqi":180,"pm25":95.2,"pm10":140.1,"o3":12.0,"no2":40.5,"so2":8.3,"timestamp":"2024-01-01T00:00:00Z"}"#.to_vec(),
//! );
//! let reading = SchemaValidator::new().parse(&raw).unwrap();
//! assert_eq!(reading.key(), ("Delhi", "2024-01-01T00:00:00Z"));
//! ```

pub mod dead_letter;
pub mod identifier;
pub mod reading;
pub mod retry;
pub mod validator;

// Re-exports for convenience
pub use dead_letter::DeadLetterRecord;
pub use identifier::{validate_identifier, InvalidIdentifier};
pub use reading::{ParsedReading, RawMessage, WriteBatch};
pub use retry::RetryPolicy;
pub use validator::{FieldError, FieldProblem, SchemaValidator, ValidationError, READING_FIELDS};

//! Cassandra/ScyllaDB reading sink.
//!
//! Connects with the `scylla` driver, provisions the keyspace and reading
//! table, and implements [`reading_sink::SinkWriter`] with idempotent
//! upserts keyed by `(city, timestamp)`.

mod connect;
mod schema;
mod writer;

pub use connect::{cassandra_connect, cassandra_connect_with_retries, CassandraOpts, WriteConsistency};
pub use schema::{
    create_keyspace, create_reading_table, keyspace_cql, reading_table_cql, validate_identifier,
};
pub use writer::{
    classify_execution_error, coalesce_by_key, is_fatal_db_error, summarize, CassandraSink,
};

//! Cassandra/ScyllaDB checkpoint storage implementation.

use std::sync::Arc;

use anyhow::{Context, Result};
use aqi_core::validate_identifier;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scylla::client::session::Session;
use scylla::statement::prepared::PreparedStatement;
use scylla::statement::Consistency;

use crate::store::{CheckpointID, CheckpointRecord, CheckpointStore};

/// Cassandra implementation of CheckpointStore trait.
///
/// Stores checkpoints in a table keyed by `(topic, partition_id)`. A single
/// row upsert is atomic in Cassandra, which gives the torn-write guarantee.
/// Reads and writes use `LOCAL_QUORUM` so a committed checkpoint survives
/// the loss of a replica.
pub struct CassandraStore {
    session: Arc<Session>,
    upsert: PreparedStatement,
    select_one: PreparedStatement,
    select_topic: PreparedStatement,
}

/// CQL text for the checkpoint table, built from validated names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointCql {
    pub create_table: String,
    pub upsert: String,
    pub select_one: String,
    pub select_topic: String,
}

impl CheckpointCql {
    pub fn new(keyspace: &str, table: &str) -> Result<Self> {
        validate_identifier("keyspace", keyspace)?;
        validate_identifier("checkpoint table", table)?;

        Ok(Self {
            create_table: format!(
                "CREATE TABLE IF NOT EXISTS {keyspace}.{table} (
                    topic TEXT,
                    partition_id INT,
                    last_offset BIGINT,
                    committed_at TIMESTAMP,
                    PRIMARY KEY ((topic), partition_id)
                )"
            ),
            upsert: format!(
                "INSERT INTO {keyspace}.{table} (topic, partition_id, last_offset, committed_at) VALUES (?, ?, ?, ?)"
            ),
            select_one: format!(
                "SELECT partition_id, last_offset, committed_at FROM {keyspace}.{table} WHERE topic = ? AND partition_id = ?"
            ),
            select_topic: format!(
                "SELECT partition_id, last_offset, committed_at FROM {keyspace}.{table} WHERE topic = ?"
            ),
        })
    }
}

impl CassandraStore {
    /// Prepare statements against an existing checkpoint table.
    pub async fn new(session: Arc<Session>, keyspace: &str, table: &str) -> Result<Self> {
        let cql = CheckpointCql::new(keyspace, table)?;

        let mut upsert = session
            .prepare(cql.upsert)
            .await
            .context("Failed to prepare checkpoint upsert")?;
        let mut select_one = session
            .prepare(cql.select_one)
            .await
            .context("Failed to prepare checkpoint read")?;
        let mut select_topic = session
            .prepare(cql.select_topic)
            .await
            .context("Failed to prepare checkpoint listing")?;

        upsert.set_consistency(Consistency::LocalQuorum);
        select_one.set_consistency(Consistency::LocalQuorum);
        select_topic.set_consistency(Consistency::LocalQuorum);

        Ok(Self {
            session,
            upsert,
            select_one,
            select_topic,
        })
    }

    /// Create the checkpoint table if it does not exist.
    pub async fn create_table(session: &Session, keyspace: &str, table: &str) -> Result<()> {
        let cql = CheckpointCql::new(keyspace, table)?;
        session
            .query_unpaged(cql.create_table, &[])
            .await
            .with_context(|| format!("Failed to create checkpoint table {keyspace}.{table}"))?;
        tracing::info!("Checkpoint table {keyspace}.{table} is ready");
        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for CassandraStore {
    async fn store_checkpoint(&self, id: &CheckpointID, record: &CheckpointRecord) -> Result<()> {
        self.session
            .execute_unpaged(
                &self.upsert,
                (&id.topic, id.partition, record.offset, record.committed_at),
            )
            .await
            .with_context(|| format!("Failed to store checkpoint {id}"))?;
        Ok(())
    }

    async fn read_checkpoint(&self, id: &CheckpointID) -> Result<Option<CheckpointRecord>> {
        let rows = self
            .session
            .execute_unpaged(&self.select_one, (&id.topic, id.partition))
            .await
            .with_context(|| format!("Failed to read checkpoint {id}"))?
            .into_rows_result()?;

        let row = rows.maybe_first_row::<(i32, i64, DateTime<Utc>)>()?;
        Ok(row.map(|(partition, offset, committed_at)| CheckpointRecord {
            partition,
            offset,
            committed_at,
        }))
    }

    async fn list_checkpoints(&self, topic: &str) -> Result<Vec<CheckpointRecord>> {
        let rows = self
            .session
            .execute_unpaged(&self.select_topic, (topic,))
            .await
            .with_context(|| format!("Failed to list checkpoints for topic {topic}"))?
            .into_rows_result()?;

        let mut records = Vec::new();
        for row in rows.rows::<(i32, i64, DateTime<Utc>)>()? {
            let (partition, offset, committed_at) = row?;
            records.push(CheckpointRecord {
                partition,
                offset,
                committed_at,
            });
        }
        records.sort_by_key(|r| r.partition);
        Ok(records)
    }
}

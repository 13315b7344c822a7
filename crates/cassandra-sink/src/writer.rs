//! Idempotent reading writes.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;
use aqi_core::{ParsedReading, WriteBatch};
use futures::stream::{self, StreamExt};
use reading_sink::{SinkWriter, WriteError};
use scylla::client::session::Session;
use scylla::errors::{DbError, ExecutionError, RequestAttemptError};
use scylla::statement::prepared::PreparedStatement;
use scylla::statement::Consistency;

use crate::schema::validate_identifier;

/// Writes readings with `INSERT`, which Cassandra applies as an upsert on
/// `(city, timestamp)`.
///
/// A batch is written as concurrent single-row upserts rather than a CQL
/// `BATCH`: rows of different cities live in different partitions, and each
/// single-row write is already atomic and idempotent. The call succeeds only
/// when every upsert was acknowledged at the configured consistency level.
pub struct CassandraSink {
    session: Arc<Session>,
    insert: PreparedStatement,
    concurrency: usize,
}

impl CassandraSink {
    /// Prepare the upsert against an existing reading table.
    pub async fn new(
        session: Arc<Session>,
        keyspace: &str,
        table: &str,
        consistency: Consistency,
        concurrency: usize,
    ) -> anyhow::Result<Self> {
        validate_identifier("keyspace", keyspace)?;
        validate_identifier("table", table)?;

        let mut insert = session
            .prepare(format!(
                "INSERT INTO {keyspace}.{table} (city, aqi, pm25, pm10, o3, no2, so2, timestamp) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)"
            ))
            .await
            .with_context(|| format!("Failed to prepare upsert into {keyspace}.{table}"))?;
        insert.set_consistency(consistency);
        insert.set_is_idempotent(true);

        Ok(Self {
            session,
            insert,
            concurrency: concurrency.max(1),
        })
    }

    async fn upsert(&self, reading: &ParsedReading) -> Result<(), WriteError> {
        self.session
            .execute_unpaged(
                &self.insert,
                (
                    &reading.city,
                    reading.aqi,
                    reading.pm25,
                    reading.pm10,
                    reading.o3,
                    reading.no2,
                    reading.so2,
                    &reading.timestamp,
                ),
            )
            .await
            .map(|_| ())
            .map_err(classify_execution_error)
    }
}

#[async_trait::async_trait]
impl SinkWriter for CassandraSink {
    async fn write_batch(&self, batch: &WriteBatch) -> Result<(), WriteError> {
        if batch.is_empty() {
            return Ok(());
        }

        let readings = coalesce_by_key(&batch.readings);
        let upserts: Vec<_> = readings
            .into_iter()
            .map(|reading| self.upsert(reading))
            .collect();
        let results: Vec<Result<(), WriteError>> = stream::iter(upserts)
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        summarize(results)
    }
}

/// Fold per-row upsert results into one batch result.
///
/// Any fatal row fails the batch as fatal. Otherwise transient failures are
/// reported together so the whole batch gets retried.
pub fn summarize(results: Vec<Result<(), WriteError>>) -> Result<(), WriteError> {
    let total = results.len();
    let mut first_transient = None;
    let mut failed = 0;
    for result in results {
        match result {
            Ok(()) => {}
            Err(e) if !e.is_transient() => return Err(e),
            Err(e) => {
                failed += 1;
                first_transient.get_or_insert(e);
            }
        }
    }

    match first_transient {
        None => Ok(()),
        Some(WriteError::Transient(reason)) => Err(WriteError::Transient(format!(
            "{failed} of {total} upserts failed: {reason}"
        ))),
        Some(other) => Err(other),
    }
}

/// Keep only the last reading of each `(city, timestamp)` key, in batch order.
///
/// Upserts run concurrently, so two writes of the same key inside one batch
/// could land in either order. Dropping all but the last one keeps
/// last-write-wins aligned with offset order.
pub fn coalesce_by_key(readings: &[ParsedReading]) -> Vec<&ParsedReading> {
    let mut last_index: HashMap<(&str, &str), usize> = HashMap::with_capacity(readings.len());
    for (i, reading) in readings.iter().enumerate() {
        last_index.insert(reading.key(), i);
    }
    readings
        .iter()
        .enumerate()
        .filter(|(i, reading)| last_index.get(&reading.key()) == Some(i))
        .map(|(_, reading)| reading)
        .collect()
}

/// Split driver errors into ones worth retrying and ones that are not.
pub fn classify_execution_error(err: ExecutionError) -> WriteError {
    let fatal = match &err {
        ExecutionError::BadQuery(_) | ExecutionError::PrepareError(_) => true,
        ExecutionError::LastAttemptError(RequestAttemptError::DbError(db_error, _)) => {
            is_fatal_db_error(db_error)
        }
        _ => false,
    };

    if fatal {
        WriteError::Fatal(err.to_string())
    } else {
        WriteError::Transient(err.to_string())
    }
}

/// Server-side errors that retrying the same statement cannot fix.
pub fn is_fatal_db_error(err: &DbError) -> bool {
    matches!(
        err,
        DbError::SyntaxError
            | DbError::Invalid
            | DbError::Unauthorized
            | DbError::AuthenticationError
            | DbError::ConfigError
            | DbError::AlreadyExists { .. }
            | DbError::FunctionFailure { .. }
            | DbError::ProtocolError
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(city: &str, ts: &str, aqi: f32) -> ParsedReading {
        ParsedReading {
            city: city.to_string(),
            aqi,
            pm25: 1.0,
            pm10: 1.0,
            o3: 1.0,
            no2: 1.0,
            so2: 1.0,
            timestamp: ts.to_string(),
        }
    }

    #[test]
    fn test_coalesce_keeps_last_per_key_in_order() {
        let readings = vec![
            reading("Delhi", "t1", 100.0),
            reading("Pune", "t1", 50.0),
            reading("Delhi", "t1", 180.0),
            reading("Delhi", "t2", 90.0),
        ];
        let kept = coalesce_by_key(&readings);
        let summary: Vec<(&str, &str, f32)> =
            kept.iter().map(|r| (r.city.as_str(), r.timestamp.as_str(), r.aqi)).collect();
        assert_eq!(
            summary,
            vec![("Pune", "t1", 50.0), ("Delhi", "t1", 180.0), ("Delhi", "t2", 90.0)]
        );
    }

    #[test]
    fn test_coalesce_without_duplicates_is_identity() {
        let readings = vec![reading("A", "1", 1.0), reading("B", "1", 2.0)];
        assert_eq!(coalesce_by_key(&readings).len(), 2);
    }

    #[test]
    fn test_summarize_all_ok() {
        assert!(summarize(vec![Ok(()), Ok(())]).is_ok());
        assert!(summarize(Vec::new()).is_ok());
    }

    #[test]
    fn test_summarize_counts_transient_failures() {
        let result = summarize(vec![
            Ok(()),
            Err(WriteError::Transient("timeout".to_string())),
            Ok(()),
            Err(WriteError::Transient("overloaded".to_string())),
        ]);
        match result {
            Err(WriteError::Transient(reason)) => {
                assert_eq!(reason, "2 of 4 upserts failed: timeout");
            }
            other => panic!("expected transient error, got {other:?}"),
        }
    }

    #[test]
    fn test_summarize_fatal_wins_over_transient() {
        let result = summarize(vec![
            Err(WriteError::Transient("timeout".to_string())),
            Ok(()),
            Err(WriteError::Fatal("unauthorized".to_string())),
        ]);
        match result {
            Err(WriteError::Fatal(reason)) => assert_eq!(reason, "unauthorized"),
            other => panic!("expected fatal error, got {other:?}"),
        }
    }

    #[test]
    fn test_db_error_classification() {
        assert!(is_fatal_db_error(&DbError::SyntaxError));
        assert!(is_fatal_db_error(&DbError::Invalid));
        assert!(is_fatal_db_error(&DbError::Unauthorized));
        assert!(!is_fatal_db_error(&DbError::Overloaded));
        assert!(!is_fatal_db_error(&DbError::IsBootstrapping));
        assert!(!is_fatal_db_error(&DbError::ServerError));
    }
}

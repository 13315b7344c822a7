//! Keyspace and table provisioning.
//!
//! Run once before streaming starts. Both statements use `IF NOT EXISTS`,
//! so provisioning an existing schema is a no-op.

use anyhow::Context;
use scylla::client::session::Session;

pub use aqi_core::validate_identifier;

/// CQL creating the keyspace with `SimpleStrategy` replication.
pub fn keyspace_cql(keyspace: &str, replication_factor: u32) -> String {
    format!(
        "CREATE KEYSPACE IF NOT EXISTS {keyspace} \
         WITH replication = {{'class': 'SimpleStrategy', 'replication_factor': '{replication_factor}'}}"
    )
}

/// CQL creating the reading table.
pub fn reading_table_cql(keyspace: &str, table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {keyspace}.{table} (
            city TEXT,
            aqi FLOAT,
            pm25 FLOAT,
            pm10 FLOAT,
            o3 FLOAT,
            no2 FLOAT,
            so2 FLOAT,
            timestamp TEXT,
            PRIMARY KEY (city, timestamp)
        )"
    )
}

pub async fn create_keyspace(
    session: &Session,
    keyspace: &str,
    replication_factor: u32,
) -> anyhow::Result<()> {
    validate_identifier("keyspace", keyspace)?;
    if replication_factor == 0 {
        anyhow::bail!("Replication factor must be at least 1");
    }

    session
        .query_unpaged(keyspace_cql(keyspace, replication_factor), &[])
        .await
        .with_context(|| format!("Failed to create keyspace {keyspace}"))?;
    tracing::info!(
        "Keyspace {} is ready (replication factor {})",
        keyspace,
        replication_factor
    );
    Ok(())
}

pub async fn create_reading_table(
    session: &Session,
    keyspace: &str,
    table: &str,
) -> anyhow::Result<()> {
    validate_identifier("keyspace", keyspace)?;
    validate_identifier("table", table)?;

    session
        .query_unpaged(reading_table_cql(keyspace, table), &[])
        .await
        .with_context(|| format!("Failed to create table {keyspace}.{table}"))?;
    tracing::info!("Table {}.{} is ready", keyspace, table);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyspace_cql() {
        assert_eq!(
            keyspace_cql("air_quality", 3),
            "CREATE KEYSPACE IF NOT EXISTS air_quality WITH replication = {'class': 'SimpleStrategy', 'replication_factor': '3'}"
        );
    }

    #[test]
    fn test_reading_table_cql_keys_by_city_and_timestamp() {
        let cql = reading_table_cql("air_quality", "aqi_readings");
        assert!(cql.starts_with("CREATE TABLE IF NOT EXISTS air_quality.aqi_readings"));
        assert!(cql.contains("PRIMARY KEY (city, timestamp)"));
        for column in ["aqi", "pm25", "pm10", "o3", "no2", "so2"] {
            assert!(cql.contains(&format!("{column} FLOAT")));
        }
    }
}

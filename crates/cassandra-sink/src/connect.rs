use std::time::Duration;

use aqi_core::RetryPolicy;
use clap::{Args, ValueEnum};
use scylla::client::session::Session;
use scylla::client::session_builder::SessionBuilder;
use scylla::statement::Consistency;

/// Cassandra/ScyllaDB connection and table options
#[derive(Clone, Debug, Args)]
pub struct CassandraOpts {
    /// Contact points (comma-separated host:port list)
    #[arg(
        long,
        value_delimiter = ',',
        default_value = "localhost:9042",
        env = "AQI_CASSANDRA_NODES"
    )]
    pub cassandra_nodes: Vec<String>,

    /// Username for password authentication
    #[arg(long, env = "AQI_CASSANDRA_USERNAME")]
    pub cassandra_username: Option<String>,

    /// Password for password authentication
    #[arg(long, env = "AQI_CASSANDRA_PASSWORD", hide_env_values = true)]
    pub cassandra_password: Option<String>,

    /// Keyspace holding the reading table
    #[arg(long, default_value = "air_quality")]
    pub keyspace: String,

    /// Reading table
    #[arg(long, default_value = "aqi_readings")]
    pub table: String,

    /// Replication factor used when the keyspace is created
    #[arg(long, default_value_t = 1)]
    pub replication_factor: u32,

    /// Consistency level of reading writes
    #[arg(long, value_enum, default_value = "local-quorum")]
    pub write_consistency: WriteConsistency,

    /// Maximum upserts in flight per batch
    #[arg(long, default_value_t = 32)]
    pub write_concurrency: usize,

    /// Connection attempts before giving up
    #[arg(long, default_value_t = DEFAULT_RETRY_ATTEMPTS)]
    pub connect_retries: u32,

    /// Delay before the first connection retry, in seconds
    #[arg(long, default_value_t = DEFAULT_RETRY_DELAY_SECS)]
    pub connect_retry_delay_secs: u64,
}

/// Consistency levels accepted for reading writes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum WriteConsistency {
    One,
    LocalOne,
    Quorum,
    LocalQuorum,
    EachQuorum,
    All,
}

impl From<WriteConsistency> for Consistency {
    fn from(value: WriteConsistency) -> Self {
        match value {
            WriteConsistency::One => Consistency::One,
            WriteConsistency::LocalOne => Consistency::LocalOne,
            WriteConsistency::Quorum => Consistency::Quorum,
            WriteConsistency::LocalQuorum => Consistency::LocalQuorum,
            WriteConsistency::EachQuorum => Consistency::EachQuorum,
            WriteConsistency::All => Consistency::All,
        }
    }
}

/// Default number of connection retry attempts
const DEFAULT_RETRY_ATTEMPTS: u32 = 5;
/// Default delay between retry attempts in seconds
const DEFAULT_RETRY_DELAY_SECS: u64 = 2;

pub async fn cassandra_connect(opts: &CassandraOpts) -> anyhow::Result<Session> {
    let initial = Duration::from_secs(opts.connect_retry_delay_secs);
    let policy = RetryPolicy::new(opts.connect_retries, initial, initial * 8);
    cassandra_connect_with_retries(opts, &policy).await
}

/// Connect to Cassandra with configurable retries.
///
/// This function will retry connection failures up to `policy.max_attempts`
/// times, backing off exponentially between attempts. This handles transient
/// connection issues when the cluster is starting up.
pub async fn cassandra_connect_with_retries(
    opts: &CassandraOpts,
    policy: &RetryPolicy,
) -> anyhow::Result<Session> {
    let nodes = opts.cassandra_nodes.join(",");
    tracing::debug!("Connecting to Cassandra at {}", nodes);

    let mut attempt = 0;
    loop {
        attempt += 1;
        match try_connect(opts).await {
            Ok(session) => {
                if attempt > 1 {
                    tracing::info!(
                        "Successfully connected to Cassandra after {} attempts",
                        attempt
                    );
                }
                return Ok(session);
            }
            Err(e) if policy.is_exhausted(attempt) => {
                return Err(anyhow::anyhow!(
                    "Failed to connect to Cassandra at '{nodes}' after {attempt} attempts. Last error: {e}"
                ));
            }
            Err(e) => {
                let delay = policy.backoff(attempt);
                tracing::warn!(
                    "Failed to connect to Cassandra at '{}' (attempt {}/{}): {}. Retrying in {:?}...",
                    nodes,
                    attempt,
                    policy.max_attempts,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Attempt a single connection to Cassandra.
async fn try_connect(opts: &CassandraOpts) -> anyhow::Result<Session> {
    let mut builder = SessionBuilder::new().known_nodes(&opts.cassandra_nodes);

    if let Some(username) = &opts.cassandra_username {
        let password = opts.cassandra_password.clone().unwrap_or_default();
        builder = builder.user(username.clone(), password);
    }

    builder
        .build()
        .await
        .map_err(|e| anyhow::anyhow!("Cassandra session setup failed: {e}"))
}

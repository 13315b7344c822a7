//! aqi-sync library
//!
//! Streams air-quality sensor readings from a Kafka topic into a
//! Cassandra/ScyllaDB table with exactly-once effect.
//!
//! # Features
//!
//! - Per-partition loops: poll, validate, upsert, then checkpoint
//! - Idempotent upserts keyed by `(city, timestamp)`, so replays after a
//!   restart leave the table unchanged
//! - Durable checkpoints on the filesystem or in Cassandra
//! - Rejected readings dropped or dead-lettered to a file or topic
//!
//! # Workspace Crates
//!
//! - `aqi_core` - Reading types, schema validation, retry policy
//! - `checkpoint` - Offset checkpoint stores
//! - `reading_sink` - Sink and dead-letter traits
//! - `cassandra_sink` - Cassandra/ScyllaDB connection, schema and writer
//! - `aqi_sync_kafka_source` - Per-partition Kafka readers
//! - `aqi_sync_pipeline` - The coordinator
//!
//! # CLI Usage
//!
//! ```bash
//! # Create keyspace and tables, then stream until Ctrl-C
//! aqi-sync run --brokers localhost:9092 --topic aqi_stream --cassandra-nodes localhost:9042
//!
//! # Only create keyspace and tables
//! aqi-sync provision --replication-factor 3
//!
//! # Show committed checkpoints and lag
//! aqi-sync checkpoints --checkpoint-dir /tmp/checkpoint_aqi
//! ```

use std::sync::Arc;

use anyhow::Context;
use aqi_sync_kafka_source::{Client, KafkaDeadLetter, KafkaOpts, LogSource};
use aqi_sync_pipeline::{PipelineCoordinator, PipelineOpts, RejectPolicy, RunReport};
use cassandra_sink::{
    cassandra_connect, create_keyspace, create_reading_table, validate_identifier, CassandraOpts,
    CassandraSink,
};
use checkpoint::{
    CassandraStore, CheckpointManager, CheckpointOpts, CheckpointRecord, CheckpointStorage,
};
use clap::Args;
use reading_sink::{DeadLetterSink, JsonlDeadLetter};
use scylla::client::session::Session;
use tokio_util::sync::CancellationToken;

// Re-export workspace crates for convenience
pub use aqi_sync_kafka_source as kafka;
pub use aqi_sync_pipeline as pipeline;
pub use cassandra_sink as cassandra;

/// Options of the `run` command
#[derive(Args, Clone, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub kafka: KafkaOpts,

    #[command(flatten)]
    pub cassandra: CassandraOpts,

    #[command(flatten)]
    pub checkpoint: CheckpointOpts,

    #[command(flatten)]
    pub pipeline: PipelineOpts,

    /// Do not create the keyspace and tables before streaming
    #[arg(long)]
    pub skip_provision: bool,
}

/// Options of the `provision` command
#[derive(Args, Clone, Debug)]
pub struct ProvisionArgs {
    #[command(flatten)]
    pub cassandra: CassandraOpts,

    #[command(flatten)]
    pub checkpoint: CheckpointOpts,
}

/// Options of the `checkpoints` command
#[derive(Args, Clone, Debug)]
pub struct CheckpointsArgs {
    #[command(flatten)]
    pub kafka: KafkaOpts,

    #[command(flatten)]
    pub cassandra: CassandraOpts,

    #[command(flatten)]
    pub checkpoint: CheckpointOpts,
}

/// Create the keyspace, the reading table and, for Cassandra checkpoint
/// storage, the checkpoint table. Every statement is `IF NOT EXISTS`.
pub async fn provision(
    session: &Session,
    cassandra: &CassandraOpts,
    storage: &CheckpointStorage,
) -> anyhow::Result<()> {
    create_keyspace(session, &cassandra.keyspace, cassandra.replication_factor).await?;
    create_reading_table(session, &cassandra.keyspace, &cassandra.table).await?;
    if let CheckpointStorage::Cassandra { keyspace, table } = storage {
        validate_identifier("table", table)?;
        CassandraStore::create_table(session, keyspace, table).await?;
    }
    Ok(())
}

pub async fn run_provision(args: ProvisionArgs) -> anyhow::Result<()> {
    let session = cassandra_connect(&args.cassandra).await?;
    let storage = args.checkpoint.storage(&args.cassandra.keyspace);
    provision(&session, &args.cassandra, &storage).await
}

/// Stream until `shutdown` is cancelled or every partition has halted.
pub async fn run_pipeline(args: RunArgs, shutdown: CancellationToken) -> anyhow::Result<RunReport> {
    tracing::info!(
        "Starting AirQualityStreaming: topic {} on {} into {}.{}",
        args.kafka.topic,
        args.kafka.brokers(),
        args.cassandra.keyspace,
        args.cassandra.table
    );

    let session = Arc::new(cassandra_connect(&args.cassandra).await?);
    let storage = args.checkpoint.storage(&args.cassandra.keyspace);
    if args.skip_provision {
        tracing::info!("Skipping keyspace and table provisioning");
    } else {
        provision(&session, &args.cassandra, &storage).await?;
    }

    let store = storage
        .open(Some(Arc::clone(&session)))
        .await
        .context("Failed to open checkpoint storage")?;
    let checkpoints = CheckpointManager::new(store, args.kafka.topic.clone());

    let sink = CassandraSink::new(
        Arc::clone(&session),
        &args.cassandra.keyspace,
        &args.cassandra.table,
        args.cassandra.write_consistency.into(),
        args.cassandra.write_concurrency,
    )
    .await?;

    let client = Client::new(args.kafka.consumer_config())?;
    let config = args.pipeline.pipeline_config();
    let reject_policy = config.reject_policy;

    let mut coordinator = PipelineCoordinator::new(client, Arc::new(sink), checkpoints, config);
    if reject_policy == RejectPolicy::DeadLetter {
        coordinator = coordinator.with_dead_letter(dead_letter_sink(&args)?);
    }

    let report = coordinator.run(shutdown).await?;
    Ok(report)
}

fn dead_letter_sink(args: &RunArgs) -> anyhow::Result<Arc<dyn DeadLetterSink>> {
    match &args.kafka.dead_letter_topic {
        Some(topic) => {
            tracing::info!("Dead-lettering rejected readings to topic {}", topic);
            Ok(Arc::new(KafkaDeadLetter::new(&args.kafka.brokers(), topic)?))
        }
        None => {
            tracing::info!(
                "Dead-lettering rejected readings to {}",
                args.pipeline.dead_letter_path.display()
            );
            Ok(Arc::new(JsonlDeadLetter::new(&args.pipeline.dead_letter_path)))
        }
    }
}

/// Committed progress of one partition next to the head of the log.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionLag {
    pub partition: i32,
    pub checkpoint: Option<CheckpointRecord>,
    /// Offset the next produced message will get
    pub latest: i64,
    /// Messages not yet covered by the checkpoint
    pub lag: i64,
}

/// Compare the checkpoint of every partition with its watermarks.
pub async fn checkpoint_lag<S: LogSource>(
    source: &S,
    checkpoints: &CheckpointManager,
) -> anyhow::Result<Vec<PartitionLag>> {
    let committed = checkpoints.list().await?;
    let mut lags = Vec::new();
    for partition in source.partitions().await? {
        let (earliest, latest) = source.watermarks(partition).await?;
        let checkpoint = committed.iter().find(|r| r.partition == partition).cloned();
        let next = checkpoint
            .as_ref()
            .map(CheckpointRecord::resume_offset)
            .unwrap_or(earliest)
            .max(earliest);
        lags.push(PartitionLag {
            partition,
            checkpoint,
            latest,
            lag: (latest - next).max(0),
        });
    }
    Ok(lags)
}

pub async fn run_checkpoints(args: CheckpointsArgs) -> anyhow::Result<Vec<PartitionLag>> {
    let storage = args.checkpoint.storage(&args.cassandra.keyspace);
    let session = if storage.needs_session() {
        Some(Arc::new(cassandra_connect(&args.cassandra).await?))
    } else {
        None
    };
    let store = storage.open(session).await?;
    let checkpoints = CheckpointManager::new(store, args.kafka.topic.clone());
    let client = Client::new(args.kafka.consumer_config())?;
    checkpoint_lag(&client, &checkpoints).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use aqi_core::RawMessage;
    use aqi_sync_kafka_source::PartitionReader;
    use checkpoint::{FilesystemStore, StorageKind};
    use clap::Parser;
    use std::collections::HashMap;
    use std::time::Duration;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        run: RunArgs,
    }

    #[test]
    fn test_run_args_defaults() {
        let cli = TestCli::parse_from(["aqi-sync"]);
        assert_eq!(cli.run.kafka.topic, "aqi_stream");
        assert_eq!(cli.run.kafka.brokers(), "localhost:9092");
        assert_eq!(cli.run.cassandra.keyspace, "air_quality");
        assert_eq!(cli.run.cassandra.table, "aqi_readings");
        assert_eq!(cli.run.checkpoint.checkpoint_storage, StorageKind::Filesystem);
        assert_eq!(cli.run.checkpoint.checkpoint_dir, "/tmp/checkpoint_aqi");
        assert_eq!(cli.run.pipeline.reject_policy, RejectPolicy::Drop);
        assert!(!cli.run.skip_provision);
    }

    #[test]
    fn test_cassandra_checkpoints_live_in_sink_keyspace() {
        let cli = TestCli::parse_from([
            "aqi-sync",
            "--checkpoint-storage",
            "cassandra",
            "--keyspace",
            "sensors",
            "--skip-provision",
        ]);
        assert!(cli.run.skip_provision);
        assert_eq!(
            cli.run.checkpoint.storage(&cli.run.cassandra.keyspace),
            CheckpointStorage::Cassandra {
                keyspace: "sensors".to_string(),
                table: "pipeline_checkpoints".to_string(),
            }
        );
    }

    struct StubReader(i32);

    #[async_trait::async_trait]
    impl PartitionReader for StubReader {
        fn partition(&self) -> i32 {
            self.0
        }

        async fn poll(
            &mut self,
            _max_messages: usize,
            _timeout: Duration,
        ) -> aqi_sync_kafka_source::Result<Vec<RawMessage>> {
            Ok(Vec::new())
        }
    }

    /// Partition id -> (earliest, latest)
    struct StubSource(HashMap<i32, (i64, i64)>);

    #[async_trait::async_trait]
    impl LogSource for StubSource {
        type Reader = StubReader;

        fn topic(&self) -> &str {
            "aqi_stream"
        }

        async fn partitions(&self) -> aqi_sync_kafka_source::Result<Vec<i32>> {
            let mut ids: Vec<i32> = self.0.keys().copied().collect();
            ids.sort_unstable();
            Ok(ids)
        }

        async fn watermarks(&self, partition: i32) -> aqi_sync_kafka_source::Result<(i64, i64)> {
            Ok(self.0[&partition])
        }

        async fn open(
            &self,
            partitions: &[i32],
            _resume_offsets: &HashMap<i32, i64>,
        ) -> aqi_sync_kafka_source::Result<Vec<StubReader>> {
            Ok(partitions.iter().map(|&p| StubReader(p)).collect())
        }
    }

    #[tokio::test]
    async fn test_checkpoint_lag() {
        let tmp = tempfile::TempDir::new().unwrap();
        let checkpoints =
            CheckpointManager::new(Arc::new(FilesystemStore::new(tmp.path())), "aqi_stream");
        checkpoints.partition(0).await.unwrap().commit(89).await.unwrap();
        checkpoints.partition(2).await.unwrap().commit(4).await.unwrap();

        let source = StubSource(HashMap::from([(0, (0, 100)), (1, (10, 25)), (2, (20, 30))]));
        let lags = checkpoint_lag(&source, &checkpoints).await.unwrap();

        let summary: Vec<(i32, Option<i64>, i64)> = lags
            .iter()
            .map(|l| (l.partition, l.checkpoint.as_ref().map(|c| c.offset), l.lag))
            .collect();
        // Partition 2's checkpoint is below the earliest retained offset.
        assert_eq!(
            summary,
            vec![(0, Some(89), 10), (1, None, 15), (2, Some(4), 10)]
        );
    }
}

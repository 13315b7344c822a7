//! Command-line interface for aqi-sync
//!
//! # Usage Examples
//!
//! ## Streaming
//! ```bash
//! # Stream from the beginning of the topic, dead-lettering bad readings to a file
//! aqi-sync run \
//!   --brokers localhost:9092 --topic aqi_stream \
//!   --cassandra-nodes localhost:9042 \
//!   --reject-policy dead-letter --dead-letter-path /var/lib/aqi/rejected.jsonl
//!
//! # Keep checkpoints next to the readings instead of on local disk
//! aqi-sync run --checkpoint-storage cassandra
//! ```
//!
//! ## Provisioning
//! ```bash
//! aqi-sync provision --keyspace air_quality --replication-factor 3
//! ```
//!
//! ## Inspecting progress
//! ```bash
//! aqi-sync checkpoints --checkpoint-dir /tmp/checkpoint_aqi
//! ```

use aqi_sync::{
    run_checkpoints, run_pipeline, run_provision, CheckpointsArgs, ProvisionArgs, RunArgs,
};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "aqi-sync")]
#[command(about = "Stream air-quality readings from Kafka into Cassandra/ScyllaDB")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream readings until Ctrl-C/SIGTERM or until every partition has halted
    Run(RunArgs),

    /// Create the keyspace, reading table and checkpoint table
    Provision(ProvisionArgs),

    /// Print committed checkpoints and lag per partition
    Checkpoints(CheckpointsArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => {
            let shutdown = CancellationToken::new();
            let signal_token = shutdown.clone();
            tokio::spawn(async move {
                wait_for_shutdown_signal().await;
                tracing::info!("Shutdown requested; finishing in-flight batches");
                signal_token.cancel();
            });

            let report = run_pipeline(args, shutdown).await?;
            for partition in &report.partitions {
                tracing::info!(
                    "Partition {}: {} at checkpoint {:?}, {} messages, {} rows, {} rejected, {} write retries",
                    partition.partition,
                    partition.state,
                    partition.last_committed,
                    partition.messages,
                    partition.rows_written,
                    partition.validation_failures,
                    partition.write_retries
                );
            }

            let halted: Vec<i32> = report.halted().map(|p| p.partition).collect();
            if !halted.is_empty() {
                anyhow::bail!("Partitions {halted:?} halted; see the log for the cause");
            }
        }
        Commands::Provision(args) => {
            run_provision(args).await?;
            println!("Keyspace and tables are ready");
        }
        Commands::Checkpoints(args) => {
            let lags = run_checkpoints(args).await?;
            println!(
                "{:>9}  {:>12}  {:>12}  {:>10}  committed at",
                "partition", "checkpoint", "latest", "lag"
            );
            for lag in lags {
                let (offset, committed_at) = match &lag.checkpoint {
                    Some(record) => (record.offset.to_string(), record.committed_at.to_rfc3339()),
                    None => ("-".to_string(), "-".to_string()),
                };
                println!(
                    "{:>9}  {:>12}  {:>12}  {:>10}  {}",
                    lag.partition, offset, lag.latest, lag.lag, committed_at
                );
            }
        }
    }

    Ok(())
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!("Cannot listen for SIGTERM: {}", e);
                ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c().await;
    }
}

async fn ctrl_c() {
    signalled("Ctrl-C", tokio::signal::ctrl_c()).await
}

/// Resolve when `signal` fires. If the handler cannot be installed, never
/// resolve, so the pipeline keeps running instead of shutting down at once.
async fn signalled(name: &str, signal: impl std::future::Future<Output = std::io::Result<()>>) {
    if let Err(e) = signal.await {
        tracing::error!("Cannot listen for {}: {}", name, e);
        std::future::pending::<()>().await;
    }
}

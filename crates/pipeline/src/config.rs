use std::path::PathBuf;
use std::time::Duration;

use aqi_core::RetryPolicy;
use clap::{Args, ValueEnum};

/// What happens to messages that fail validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum RejectPolicy {
    /// Count and log them, nothing else
    #[default]
    Drop,
    /// Hand them to the dead-letter sink before their offsets are committed
    DeadLetter,
}

/// Tuning of the partition loops.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Maximum messages pulled per poll
    pub batch_size: usize,
    /// How long a poll waits for the first message
    pub poll_timeout: Duration,
    /// Retries of a failing batch before the partition is DEGRADED
    pub write_retry: RetryPolicy,
    pub reject_policy: RejectPolicy,
    /// Reject readings carrying fields outside the reading schema
    pub strict_schema: bool,
    /// Rows between progress log lines
    pub progress_interval: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: 500,
            poll_timeout: Duration::from_secs(1),
            write_retry: RetryPolicy::default(),
            reject_policy: RejectPolicy::Drop,
            strict_schema: false,
            progress_interval: 100,
        }
    }
}

/// Pipeline options for the command line
#[derive(Debug, Clone, Args)]
pub struct PipelineOpts {
    /// Maximum messages pulled from a partition per batch
    #[arg(long, default_value_t = 500)]
    pub batch_size: usize,

    /// Milliseconds a poll waits for the first message
    #[arg(long, default_value_t = 1000)]
    pub poll_timeout_ms: u64,

    /// Write attempts per batch before the partition is marked DEGRADED
    #[arg(long, default_value_t = 5)]
    pub write_retries: u32,

    /// Backoff after the first failed write, in milliseconds
    #[arg(long, default_value_t = 100)]
    pub write_backoff_ms: u64,

    /// Upper bound of the write backoff, in milliseconds
    #[arg(long, default_value_t = 10_000)]
    pub write_max_backoff_ms: u64,

    /// What to do with readings that fail validation
    #[arg(long, value_enum, default_value = "drop", env = "AQI_REJECT_POLICY")]
    pub reject_policy: RejectPolicy,

    /// JSON-lines file receiving rejected readings (used with
    /// `--reject-policy dead-letter` when no dead-letter topic is set)
    #[arg(long, default_value = "/tmp/checkpoint_aqi/dead_letters.jsonl")]
    pub dead_letter_path: PathBuf,

    /// Reject readings that carry unknown fields
    #[arg(long)]
    pub strict_schema: bool,
}

impl PipelineOpts {
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            batch_size: self.batch_size.max(1),
            poll_timeout: Duration::from_millis(self.poll_timeout_ms),
            write_retry: RetryPolicy::new(
                self.write_retries,
                Duration::from_millis(self.write_backoff_ms),
                Duration::from_millis(self.write_max_backoff_ms),
            ),
            reject_policy: self.reject_policy,
            strict_schema: self.strict_schema,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        pipeline: PipelineOpts,
    }

    #[test]
    fn test_defaults() {
        let cli = TestCli::parse_from(["test"]);
        let config = cli.pipeline.pipeline_config();
        assert_eq!(config.batch_size, 500);
        assert_eq!(config.poll_timeout, Duration::from_secs(1));
        assert_eq!(config.write_retry.max_attempts, 5);
        assert_eq!(config.write_retry.max_backoff, Duration::from_secs(10));
        assert_eq!(config.reject_policy, RejectPolicy::Drop);
        assert!(!config.strict_schema);
    }

    #[test]
    fn test_dead_letter_policy() {
        let cli = TestCli::parse_from([
            "test",
            "--reject-policy",
            "dead-letter",
            "--dead-letter-path",
            "/var/lib/aqi/rejected.jsonl",
            "--batch-size",
            "0",
        ]);
        assert_eq!(cli.pipeline.reject_policy, RejectPolicy::DeadLetter);
        assert_eq!(
            cli.pipeline.dead_letter_path,
            PathBuf::from("/var/lib/aqi/rejected.jsonl")
        );
        assert_eq!(cli.pipeline.pipeline_config().batch_size, 1);
    }
}

//! Source-log abstraction the pipeline is written against.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use aqi_core::{RawMessage, RetryPolicy};
use clap::ValueEnum;

use crate::error::{Error, Result};

/// Where a partition without a checkpoint starts reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum StartOffset {
    /// Oldest retained message
    #[default]
    Earliest,
    /// Only messages produced after the reader attaches
    Latest,
}

/// An independent, ordered reader over a single partition.
#[async_trait::async_trait]
pub trait PartitionReader: Send + 'static {
    fn partition(&self) -> i32;

    /// Pull up to `max_messages` messages in offset order.
    ///
    /// Waits up to `timeout` for the first message and returns an empty
    /// batch, not an error, when nothing arrives in time.
    async fn poll(&mut self, max_messages: usize, timeout: Duration) -> Result<Vec<RawMessage>>;
}

/// A partitioned, append-only topic.
#[async_trait::async_trait]
pub trait LogSource: Send + Sync {
    type Reader: PartitionReader;

    fn topic(&self) -> &str;

    /// Partition ids of the topic, sorted.
    async fn partitions(&self) -> Result<Vec<i32>>;

    /// `(earliest, latest)` offsets of a partition. `latest` is the offset
    /// the next produced message will get.
    async fn watermarks(&self, partition: i32) -> Result<(i64, i64)>;

    /// Attach one reader per partition.
    ///
    /// A partition listed in `resume_offsets` starts at that offset; any
    /// other partition starts at the configured [`StartOffset`].
    async fn open(
        &self,
        partitions: &[i32],
        resume_offsets: &HashMap<i32, i64>,
    ) -> Result<Vec<Self::Reader>>;
}

/// Run `op` until it succeeds, fails permanently or uses up `policy`.
pub(crate) async fn retry_transient<T, F, Fut>(
    policy: &RetryPolicy,
    what: &str,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_transient() => return Err(e),
            Err(e) if policy.is_exhausted(attempt) => {
                return Err(Error::RetriesExhausted {
                    attempts: attempt,
                    last: e.to_string(),
                });
            }
            Err(e) => {
                let delay = policy.backoff(attempt);
                tracing::warn!(
                    "{} failed (attempt {}/{}): {}. Retrying in {:?}",
                    what,
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(10), Duration::from_millis(40))
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_recovers_from_transient_errors() {
        let calls = AtomicU32::new(0);
        let result = retry_transient(&policy(5), "poll", || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(Error::Unavailable("broker restarting".to_string()))
            } else {
                Ok(7)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_escalates_on_exhaustion() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = retry_transient(&policy(3), "poll", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::Unavailable("all brokers down".to_string()))
        })
        .await;
        match result {
            Err(Error::RetriesExhausted { attempts, last }) => {
                assert_eq!(attempts, 3);
                assert!(last.contains("all brokers down"));
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_does_not_retry_fatal_errors() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = retry_transient(&policy(5), "poll", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::Consumer("topic authorization failed".to_string()))
        })
        .await;
        assert!(matches!(result, Err(Error::Consumer(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}

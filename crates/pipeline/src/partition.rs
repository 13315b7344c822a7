//! The loop driving a single partition.
//!
//! Each iteration polls a batch, validates it, makes rejects and readings
//! durable, and only then commits the highest offset of the batch. The steps
//! never overlap within a partition, so a committed offset always has its
//! writes behind it.

use std::future::Future;
use std::sync::Arc;

use aqi_core::{DeadLetterRecord, RawMessage, SchemaValidator, WriteBatch};
use aqi_sync_kafka_source::PartitionReader;
use checkpoint::PartitionCheckpoint;
use reading_sink::{DeadLetterSink, SinkWriter, WriteError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{PipelineConfig, RejectPolicy};
use crate::error::PipelineError;
use crate::report::PartitionReport;
use crate::state::PartitionState;

pub(crate) struct PartitionLoop<R, W> {
    pub(crate) reader: R,
    pub(crate) sink: Arc<W>,
    pub(crate) dead_letter: Option<Arc<dyn DeadLetterSink>>,
    pub(crate) checkpoint: PartitionCheckpoint,
    pub(crate) validator: SchemaValidator,
    pub(crate) topic: String,
    pub(crate) config: PipelineConfig,
    pub(crate) cancel: CancellationToken,
    pub(crate) report: PartitionReport,
}

/// How a retried delivery ended without an error.
enum Delivery {
    Done,
    /// Given up while draining; the batch stays uncommitted.
    Abandoned,
}

impl<R, W> PartitionLoop<R, W>
where
    R: PartitionReader,
    W: SinkWriter + 'static,
{
    pub(crate) async fn run(mut self) -> PartitionReport {
        let partition = self.report.partition;
        info!(
            partition,
            resume_offset = ?self.checkpoint.resume_offset(),
            "Partition loop started"
        );

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            let polled = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                polled = self.reader.poll(self.config.batch_size, self.config.poll_timeout) => polled,
            };

            let messages = match polled {
                Ok(messages) => messages,
                Err(e) => {
                    self.halt(PipelineError::Source(e));
                    break;
                }
            };
            if messages.is_empty() {
                continue;
            }

            match self.process(messages).await {
                Ok(Delivery::Done) => {}
                Ok(Delivery::Abandoned) => break,
                Err(e @ PipelineError::Checkpoint(_)) => {
                    self.halt(e);
                    // A checkpoint that cannot be trusted stops every partition.
                    self.cancel.cancel();
                    break;
                }
                Err(e) => {
                    self.halt(e);
                    break;
                }
            }
        }

        if self.report.state != PartitionState::Halted {
            self.report.state = PartitionState::Stopped;
            info!(
                "Partition {} stopped at checkpoint {:?}",
                partition, self.report.last_committed
            );
        }
        self.report
    }

    /// Validate, deliver and commit one polled batch.
    async fn process(&mut self, messages: Vec<RawMessage>) -> Result<Delivery, PipelineError> {
        let partition = self.report.partition;
        let mut batch = WriteBatch::new();
        let mut rejected = Vec::new();

        for message in &messages {
            match self.validator.parse(message) {
                Ok(reading) => batch.push(message.partition, message.offset, reading),
                Err(e) => {
                    self.report.validation_failures += 1;
                    warn!(
                        partition,
                        offset = message.offset,
                        "Rejected message: {}",
                        e
                    );
                    batch.cover(message.partition, message.offset);
                    if self.config.reject_policy == RejectPolicy::DeadLetter {
                        rejected.push(DeadLetterRecord::from_rejection(&self.topic, message, &e));
                    }
                }
            }
        }
        self.report.messages += messages.len() as u64;

        if !rejected.is_empty() {
            if let Some(dead_letter) = self.dead_letter.clone() {
                let delivery = self
                    .deliver("Dead-letter delivery", || dead_letter.send(&rejected))
                    .await?;
                if let Delivery::Abandoned = delivery {
                    return Ok(delivery);
                }
                self.report.dead_lettered += rejected.len() as u64;
            }
        }

        if !batch.is_empty() {
            let sink = Arc::clone(&self.sink);
            let delivery = self.deliver("Write", || sink.write_batch(&batch)).await?;
            if let Delivery::Abandoned = delivery {
                return Ok(delivery);
            }
            self.record_rows(batch.len() as u64);
        }

        if let Some(offset) = batch.covered_offset(partition) {
            self.commit(offset).await?;
        }
        self.report.batches += 1;
        Ok(Delivery::Done)
    }

    /// Retry `op` until it succeeds.
    ///
    /// After the retry budget is spent the partition turns DEGRADED and keeps
    /// retrying at the maximum backoff. Once shutdown has been requested, a
    /// spent budget abandons the batch instead.
    async fn deliver<F, Fut>(&mut self, what: &str, mut op: F) -> Result<Delivery, PipelineError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(), WriteError>>,
    {
        let partition = self.report.partition;
        let policy = self.config.write_retry;
        let mut attempt = 0;

        loop {
            attempt += 1;
            let err = match op().await {
                Ok(()) => {
                    if self.report.state == PartitionState::Degraded {
                        info!("Partition {} recovered after {} attempts", partition, attempt);
                        self.report.state = PartitionState::Healthy;
                    }
                    return Ok(Delivery::Done);
                }
                Err(e) if !e.is_transient() => return Err(PipelineError::Write(e)),
                Err(e) => e,
            };
            self.report.write_retries += 1;

            if policy.is_exhausted(attempt) {
                if self.cancel.is_cancelled() {
                    warn!(
                        "{} for partition {} still failing while draining after {} attempts; \
                         leaving the batch uncommitted: {}",
                        what, partition, attempt, err
                    );
                    return Ok(Delivery::Abandoned);
                }
                if self.report.state == PartitionState::Healthy {
                    self.report.state = PartitionState::Degraded;
                    self.report.degraded_episodes += 1;
                    warn!(
                        "Partition {} is DEGRADED after {} failed attempts; checkpoint held at {:?}: {}",
                        partition, attempt, self.report.last_committed, err
                    );
                }
            }

            let delay = if self.report.state == PartitionState::Degraded {
                policy.max_backoff
            } else {
                policy.backoff(attempt)
            };
            debug!(
                "{} for partition {} failed (attempt {}): {}. Retrying in {:?}",
                what, partition, attempt, err, delay
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn commit(&mut self, offset: i64) -> Result<(), PipelineError> {
        if self.checkpoint.last_committed().is_some_and(|last| offset <= last) {
            // Redelivered messages below the checkpoint.
            debug!(
                "Partition {} batch ends at {} which is already committed",
                self.report.partition, offset
            );
            return Ok(());
        }

        self.checkpoint
            .commit(offset)
            .await
            .map_err(PipelineError::Checkpoint)?;
        self.report.last_committed = Some(offset);
        debug!(partition = self.report.partition, offset, "Committed checkpoint");
        Ok(())
    }

    fn record_rows(&mut self, rows: u64) {
        let before = self.report.rows_written;
        self.report.rows_written += rows;
        let interval = self.config.progress_interval.max(1);
        if before / interval != self.report.rows_written / interval {
            info!(
                "Partition {}: {} rows written, {} validation failures, checkpoint {:?}",
                self.report.partition,
                self.report.rows_written,
                self.report.validation_failures,
                self.checkpoint.last_committed()
            );
        }
    }

    fn halt(&mut self, reason: PipelineError) {
        error!(
            "Partition {} HALTED at checkpoint {:?}: {}",
            self.report.partition, self.report.last_committed, reason
        );
        self.report.state = PartitionState::Halted;
        self.report.error = Some(reason.to_string());
    }
}

use std::collections::HashMap;
use std::sync::Arc;

use aqi_core::SchemaValidator;
use aqi_sync_kafka_source::{LogSource, PartitionReader};
use checkpoint::CheckpointManager;
use reading_sink::{DeadLetterSink, SinkWriter};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::{PipelineConfig, RejectPolicy};
use crate::error::{PipelineError, Result};
use crate::partition::PartitionLoop;
use crate::report::{PartitionReport, RunReport};
use crate::state::{PartitionState, PipelineState};

/// Drives one loop per source partition from checkpoint to sink.
///
/// Owns the source, sink, checkpoint and dead-letter handles for the
/// duration of [`run`](Self::run) and releases them when it returns.
///
/// # Example
///
/// ```rust,ignore
/// let coordinator = PipelineCoordinator::new(client, Arc::new(sink), checkpoints, config);
/// let mut state = coordinator.subscribe();
/// let report = coordinator.run(shutdown).await?;
/// ```
pub struct PipelineCoordinator<S, W> {
    source: S,
    sink: Arc<W>,
    checkpoints: CheckpointManager,
    dead_letter: Option<Arc<dyn DeadLetterSink>>,
    config: PipelineConfig,
    state: watch::Sender<PipelineState>,
}

impl<S, W> PipelineCoordinator<S, W>
where
    S: LogSource,
    W: SinkWriter + 'static,
{
    pub fn new(
        source: S,
        sink: Arc<W>,
        checkpoints: CheckpointManager,
        config: PipelineConfig,
    ) -> Self {
        let (state, _) = watch::channel(PipelineState::Init);
        Self {
            source,
            sink,
            checkpoints,
            dead_letter: None,
            config,
            state,
        }
    }

    /// Route rejected messages to `sink` under [`RejectPolicy::DeadLetter`].
    pub fn with_dead_letter(mut self, sink: Arc<dyn DeadLetterSink>) -> Self {
        self.dead_letter = Some(sink);
        self
    }

    /// Observe state transitions of the run.
    pub fn subscribe(&self) -> watch::Receiver<PipelineState> {
        self.state.subscribe()
    }

    fn transition(&self, next: PipelineState) {
        let changed = self.state.send_if_modified(|current| {
            if *current < next {
                *current = next;
                true
            } else {
                false
            }
        });
        if changed {
            info!("Pipeline {}", next);
        }
    }

    /// Run until `shutdown` is cancelled or every partition loop has ended.
    ///
    /// Returns an error only when INIT fails. Partition failures are
    /// reported per partition in the [`RunReport`].
    pub async fn run(self, shutdown: CancellationToken) -> Result<RunReport> {
        let loops = match self.init(&shutdown).await {
            Ok(loops) => loops,
            Err(e) => {
                error!("Pipeline initialization failed: {}", e);
                self.transition(PipelineState::Stopped);
                return Err(e);
            }
        };
        let cancel = loops.cancel;

        self.transition(PipelineState::Running);
        let handles: Vec<_> = loops
            .loops
            .into_iter()
            .map(|partition_loop| {
                let partition = partition_loop.report.partition;
                let last_committed = partition_loop.report.last_committed;
                let handle = tokio::spawn(partition_loop.run());
                (partition, last_committed, handle)
            })
            .collect();

        let joined = futures::future::join_all(handles.into_iter().map(
            |(partition, last_committed, handle)| async move {
                match handle.await {
                    Ok(report) => report,
                    Err(e) => {
                        error!("Partition {} task failed: {}", partition, e);
                        let mut report = PartitionReport::new(partition, last_committed);
                        report.state = PartitionState::Halted;
                        report.error = Some(format!("Partition task failed: {e}"));
                        report
                    }
                }
            },
        ));
        tokio::pin!(joined);

        let mut draining = false;
        let mut reports = loop {
            tokio::select! {
                reports = &mut joined => break reports,
                _ = cancel.cancelled(), if !draining => {
                    draining = true;
                    self.transition(PipelineState::Draining);
                }
            }
        };

        reports.sort_by_key(|r| r.partition);
        let report = RunReport {
            partitions: reports,
        };
        for halted in report.halted() {
            error!(
                "Partition {} halted: {}",
                halted.partition,
                halted.error.as_deref().unwrap_or("unknown error")
            );
        }
        self.transition(PipelineState::Stopped);
        Ok(report)
    }

    /// Load checkpoints and attach one reader per partition.
    async fn init(&self, shutdown: &CancellationToken) -> Result<PartitionLoops<S::Reader, W>> {
        if self.config.reject_policy == RejectPolicy::DeadLetter && self.dead_letter.is_none() {
            return Err(PipelineError::InvalidConfig(
                "reject policy is dead-letter but no dead-letter sink is configured".to_string(),
            ));
        }

        let topic = self.source.topic().to_string();
        let partitions = self.source.partitions().await?;
        info!(
            "Topic {} has {} partitions: {:?}",
            topic,
            partitions.len(),
            partitions
        );

        let mut checkpoints = HashMap::with_capacity(partitions.len());
        let mut resume_offsets = HashMap::with_capacity(partitions.len());
        for &partition in &partitions {
            let checkpoint = self
                .checkpoints
                .partition(partition)
                .await
                .map_err(PipelineError::Checkpoint)?;
            if let Some(resume) = checkpoint.resume_offset() {
                resume_offsets.insert(partition, resume);
            }
            checkpoints.insert(partition, checkpoint);
        }

        let readers = self.source.open(&partitions, &resume_offsets).await?;

        let validator = if self.config.strict_schema {
            SchemaValidator::strict()
        } else {
            SchemaValidator::new()
        };
        let cancel = shutdown.child_token();

        let mut loops = Vec::with_capacity(readers.len());
        for reader in readers {
            let partition = reader.partition();
            let checkpoint = checkpoints.remove(&partition).ok_or_else(|| {
                PipelineError::InvalidConfig(format!(
                    "source opened partition {partition} which was not requested"
                ))
            })?;
            let report = PartitionReport::new(partition, checkpoint.last_committed());
            loops.push(PartitionLoop {
                reader,
                sink: Arc::clone(&self.sink),
                dead_letter: self.dead_letter.clone(),
                checkpoint,
                validator: validator.clone(),
                topic: topic.clone(),
                config: self.config.clone(),
                cancel: cancel.clone(),
                report,
            });
        }

        Ok(PartitionLoops { loops, cancel })
    }
}

struct PartitionLoops<R, W> {
    loops: Vec<PartitionLoop<R, W>>,
    /// Cancelled on shutdown and on checkpoint failures
    cancel: CancellationToken,
}

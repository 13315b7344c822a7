use reading_sink::WriteError;
use thiserror::Error;

/// Failures surfaced by the coordinator.
///
/// `run` only returns these for problems during INIT. Failures inside a
/// partition loop end up in that partition's report instead.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Source error: {0}")]
    Source(#[from] aqi_sync_kafka_source::Error),

    #[error("{0}")]
    Write(#[from] WriteError),

    #[error("Checkpoint error: {0:#}")]
    Checkpoint(anyhow::Error),

    #[error("Invalid pipeline configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

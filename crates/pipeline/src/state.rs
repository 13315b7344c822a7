use std::fmt;

/// Lifecycle of a pipeline run. States only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PipelineState {
    /// Loading checkpoints and attaching partition readers
    Init,
    /// Partition loops are polling
    Running,
    /// Shutdown requested; in-flight batches are finishing
    Draining,
    /// Every partition loop has ended
    Stopped,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Init => "INIT",
            PipelineState::Running => "RUNNING",
            PipelineState::Draining => "DRAINING",
            PipelineState::Stopped => "STOPPED",
        };
        f.write_str(name)
    }
}

/// Health of a single partition loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionState {
    Healthy,
    /// Writes keep failing past the retry budget. Retries continue at the
    /// maximum backoff and the checkpoint stays where it is.
    Degraded,
    /// Stopped by a fatal source, write or checkpoint error
    Halted,
    /// Ended by shutdown
    Stopped,
}

impl fmt::Display for PartitionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PartitionState::Healthy => "HEALTHY",
            PartitionState::Degraded => "DEGRADED",
            PartitionState::Halted => "HALTED",
            PartitionState::Stopped => "STOPPED",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_states_are_ordered() {
        assert!(PipelineState::Init < PipelineState::Running);
        assert!(PipelineState::Running < PipelineState::Draining);
        assert!(PipelineState::Draining < PipelineState::Stopped);
        assert_eq!(PipelineState::Draining.to_string(), "DRAINING");
        assert_eq!(PartitionState::Degraded.to_string(), "DEGRADED");
    }
}

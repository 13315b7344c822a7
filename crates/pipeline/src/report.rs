use crate::state::PartitionState;

/// Outcome of one partition loop.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionReport {
    pub partition: i32,
    pub state: PartitionState,
    pub last_committed: Option<i64>,
    /// Non-empty polls processed to completion
    pub batches: u64,
    pub messages: u64,
    pub rows_written: u64,
    pub validation_failures: u64,
    pub dead_lettered: u64,
    /// Failed write or dead-letter attempts that were retried
    pub write_retries: u64,
    /// How often the partition entered DEGRADED
    pub degraded_episodes: u64,
    /// Why the partition halted
    pub error: Option<String>,
}

impl PartitionReport {
    pub fn new(partition: i32, last_committed: Option<i64>) -> Self {
        Self {
            partition,
            state: PartitionState::Healthy,
            last_committed,
            batches: 0,
            messages: 0,
            rows_written: 0,
            validation_failures: 0,
            dead_lettered: 0,
            write_retries: 0,
            degraded_episodes: 0,
            error: None,
        }
    }
}

/// Outcome of a whole run, one report per partition in partition order.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub partitions: Vec<PartitionReport>,
}

impl RunReport {
    pub fn partition(&self, partition: i32) -> Option<&PartitionReport> {
        self.partitions.iter().find(|r| r.partition == partition)
    }

    pub fn halted(&self) -> impl Iterator<Item = &PartitionReport> {
        self.partitions
            .iter()
            .filter(|r| r.state == PartitionState::Halted)
    }

    pub fn any_halted(&self) -> bool {
        self.halted().next().is_some()
    }

    pub fn rows_written(&self) -> u64 {
        self.partitions.iter().map(|r| r.rows_written).sum()
    }

    pub fn validation_failures(&self) -> u64 {
        self.partitions.iter().map(|r| r.validation_failures).sum()
    }
}

use thiserror::Error;

/// Failure to make a batch durable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WriteError {
    /// Timeouts, unavailable replicas, dropped connections. The same batch
    /// may succeed later.
    #[error("Transient write error: {0}")]
    Transient(String),

    /// Invalid statements, schema mismatches, authorization failures.
    /// Retrying the same batch cannot succeed.
    #[error("Fatal write error: {0}")]
    Fatal(String),
}

impl WriteError {
    pub fn is_transient(&self) -> bool {
        matches!(self, WriteError::Transient(_))
    }
}

//! Streaming pipeline coordinator.
//!
//! Runs one sequential poll → validate → write → checkpoint loop per source
//! partition:
//!
//! - Validation failures never fail a batch; they are dropped or
//!   dead-lettered according to [`RejectPolicy`]
//! - A checkpoint is committed only after the sink confirmed the batch
//! - Transient write failures retry the whole batch, first with exponential
//!   backoff, then indefinitely at the maximum backoff (DEGRADED)
//! - Fatal source or write failures halt only the affected partition;
//!   checkpoint failures halt the whole pipeline
//! - Shutdown is cooperative and observed between batches, so no batch is
//!   left half committed
//!
//! Readings are upserted by `(city, timestamp)`, which makes replaying an
//! uncommitted batch after a restart invisible in the sink.

mod config;
mod coordinator;
mod error;
mod partition;
mod report;
mod state;

pub use config::{PipelineConfig, PipelineOpts, RejectPolicy};
pub use coordinator::PipelineCoordinator;
pub use error::{PipelineError, Result};
pub use report::{PartitionReport, RunReport};
pub use state::{PartitionState, PipelineState};

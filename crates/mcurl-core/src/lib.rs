//! Batch load generation: concurrent request fan-out, per-batch latency
//! aggregation and repeated runs under an optional time budget.

pub mod batch;
pub mod executor;
pub mod repeat;
pub mod stats;

pub use batch::BatchRunner;
pub use executor::RequestExecutor;
pub use repeat::RepeatController;
pub use stats::{BatchReport, BatchStats, RequestOutcome, RunReport, RunStats, StopReason};

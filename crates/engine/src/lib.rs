//! The upload engine.
//!
//! A run works through one job table with a fixed pool of workers. Each
//! worker leases a disjoint range of ids from [`SharedState`], fetches the
//! pending rows in that range and, for each one, derives the object name,
//! skips it if the store already holds identical bytes, uploads it (in
//! segments when it is larger than the file limit) and marks the row done.
//! A monitor samples throughput alongside. Only setup problems and job store
//! failures stop a run; a job that can't be uploaded is logged and left
//! pending for the next run.

pub mod checksum;
pub mod error;
pub mod manifest;
mod monitor;
pub mod naming;
pub mod prepare;
pub mod report;
pub mod run;
pub mod segment;
pub mod state;
pub mod transfer;
mod worker;

pub use crate::prepare::prepare;
pub use crate::run::{Orchestrator, RunOptions, RunSummary};
pub use crate::state::{Lease, SharedState, Snapshot};
pub use crate::transfer::{Backoff, Executor, RetryPolicy, TransferOutcome};

//! Engine Error Types
//!
//! Only setup problems and job store failures surface as errors: anything
//! that goes wrong with a single job is counted, logged and left pending.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// An engine error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// A job store query failed; the run cannot continue safely.
    #[display("job store failure")]
    JobStore,
    /// The object store refused a run-level operation (e.g. creating the container).
    #[display("object store failure")]
    Storage,
    #[display("no such job table: {_0}")]
    UnknownTable(#[error(not(source))] String),
    #[display("job table {_0} is empty; run prepare first")]
    EmptyTable(#[error(not(source))] String),
    #[display("cannot write run artifact: {}", _0.display())]
    Artifact(#[error(not(source))] PathBuf),
    #[display("worker task aborted")]
    Worker,
    #[display("cannot enumerate directory: {}", _0.display())]
    Prepare(#[error(not(source))] PathBuf),
    #[display("cannot segment file: {}", _0.display())]
    Segment(#[error(not(source))] PathBuf),
    #[display("no valid object name for {}", _0.display())]
    Naming(#[error(not(source))] PathBuf),
    #[display("malformed manifest: {_0}")]
    Manifest(#[error(not(source))] String),
}

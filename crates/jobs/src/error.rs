//! Job Store Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A job store error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for job store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The query itself failed: broken schema, bad SQL, disk full. Fatal.
    #[display("database error")]
    Database,
    /// The database stayed unreachable (or locked) across every reconnect.
    #[display("database connection lost")]
    Connection,
    #[display("invalid table name: {_0:?}")]
    InvalidTable(#[error(not(source))] String),
    #[display("table already exists: {_0}")]
    TableExists(#[error(not(source))] String),
    #[display("no such table: {_0}")]
    UnknownTable(#[error(not(source))] String),
    /// A value could not be converted to or from its column type.
    #[display("invalid job data: {_0}")]
    InvalidData(#[error(not(source))] &'static str),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection)
    }
}

//! Storage Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::io::Error as IoError;
use std::path::PathBuf;

/// A storage error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Remote object does not exist
    #[display("object not found: {_0}")]
    NotFound(#[error(not(source))] String),
    /// The local source of an upload could not be opened or read. Retrying
    /// the upload won't help until someone fixes the file.
    #[display("cannot read local file: {}", _0.display())]
    LocalFile(#[error(not(source))] PathBuf),
    /// Credentials were rejected (or the session token expired).
    #[display("unauthorized: {_0}")]
    Unauthorized(#[error(not(source))] String),
    /// Underlying I/O error
    #[display("I/O error: {_0}")]
    Io(IoError),
    /// Network-related error (connection reset, timeout, DNS, etc.)
    #[display("network error: {_0}")]
    Network(#[error(not(source))] String),
    /// Object name contains invalid characters or escapes the container
    #[display("invalid object name: {_0}")]
    InvalidName(#[error(not(source))] String),
    /// The container could not be created or accessed.
    #[display("container unavailable: {_0}")]
    Container(#[error(not(source))] String),
    /// Backend-specific error
    #[display("backend error: {_0}")]
    BackendError(#[error(not(source))] String),
}
impl From<IoError> for ErrorKind {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    ///
    /// Expired credentials count as retryable: callers are expected to
    /// reconnect before the next attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Network(_) | Self::Unauthorized(_) | Self::BackendError(_))
    }
}

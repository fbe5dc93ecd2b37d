//! Configuration Error Types

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A configuration error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for configuration operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Everything here is fatal: fix the configuration and start again.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("configuration file not found: {}", _0.display())]
    FileNotFound(#[error(not(source))] PathBuf),
    #[display("unsupported configuration format (expected toml, yaml or json): {}", _0.display())]
    UnsupportedFormat(#[error(not(source))] PathBuf),
    /// The merged configuration could not be parsed, or failed validation.
    #[display("invalid configuration: {_0}")]
    Invalid(#[error(not(source))] String),
    /// Required environment variables are unset or empty.
    #[display("missing environment variables: {}", _0.join(", "))]
    MissingVariables(#[error(not(source))] Vec<String>),
}

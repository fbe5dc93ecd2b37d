//! Object store backends.
//!
//! The engine never speaks a wire protocol itself; it goes through the
//! [`ObjectStore`] trait defined here. Backends:
//!
//! - [`S3Backend`](backend::S3Backend) (feature `s3`): any S3-compatible
//!   service, including Swift clusters with the `s3api` middleware.
//! - [`LocalBackend`](backend::LocalBackend): a directory standing in for a
//!   container. Handy for dry runs against a scratch disk.
//! - [`MockBackend`](backend::MockBackend) (feature `mock`): in-memory, with
//!   failure injection for tests.

pub mod backend;
pub mod digest;
pub mod error;
mod models;
mod path;

pub use crate::backend::ObjectStore;
pub use crate::models::ObjectMeta;
pub use crate::path::validate as validate_name;
use std::sync::Arc;

pub type BackendHandle = Arc<dyn ObjectStore + Send + Sync>;

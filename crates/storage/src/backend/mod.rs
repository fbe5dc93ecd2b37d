//! Object store trait and implementations.
//!
//! This module defines the [`ObjectStore`] trait, which provides a unified
//! interface for the handful of object operations the upload engine needs
//! (authenticate, create container, PUT, HEAD, GET, DELETE) across different
//! backends.

mod local;
#[cfg(feature = "mock")]
mod mock;
#[cfg(feature = "s3")]
mod s3;

pub use self::local::LocalBackend;
#[cfg(feature = "mock")]
pub use self::mock::MockBackend;
#[cfg(feature = "s3")]
pub use self::s3::S3Backend;
use crate::ObjectMeta;
use crate::error::Result;
use async_trait::async_trait;
use std::path::Path;

/// Unified interface for object stores.
///
/// Every backend is bound to exactly one container (bucket), chosen at
/// construction time. Object names are validated with
/// [`validate_name`](crate::validate_name) before use; implementations should
/// enforce this validation.
///
/// # Atomicity
/// Callers rely on the store treating an interrupted PUT as "not present":
/// a HEAD after a failed or aborted write must either report the previous
/// object or nothing at all, never a truncated one.
///
/// # Examples
///
/// ```
/// use stow_storage::{ObjectStore, error::Result};
///
/// async fn needs_upload(store: &dyn ObjectStore, name: &str, local_md5: &str) -> Result<bool> {
///     Ok(match store.head(name).await? {
///         Some(meta) => meta.etag != local_md5,
///         None => true,
///     })
/// }
/// ```
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Name of the configured backend (used for logging only).
    fn name(&self) -> &str;

    /// Name of the container every operation targets.
    fn container(&self) -> &str;

    /// Drop any cached session and authenticate again.
    ///
    /// Called between retry attempts, so a token that expired half-way
    /// through a multi-day run is refreshed transparently. Backends without
    /// sessions can make this a no-op.
    async fn reconnect(&self) -> Result<()>;

    /// Create the container if it doesn't already exist.
    ///
    /// "Already exists" (and "already owned by you") is success.
    async fn create_container(&self) -> Result<()>;

    /// Fetch object metadata without reading its contents.
    ///
    /// Returns `Ok(None)` when the object does not exist; errors are reserved
    /// for failures to *ask*.
    async fn head(&self, name: &str) -> Result<Option<ObjectMeta>>;

    /// Read an object's contents.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the object
    /// does not exist. Only used for small objects (manifests).
    async fn get(&self, name: &str) -> Result<Vec<u8>>;

    /// Upload a local file as an object, streaming it from disk.
    ///
    /// Returns [`LocalFile`](crate::error::ErrorKind::LocalFile) if the
    /// source cannot be opened; that error is never worth retrying.
    async fn put_file(&self, name: &str, source: &Path) -> Result<ObjectMeta>;

    /// Upload an in-memory buffer as an object.
    async fn put_bytes(&self, name: &str, data: Vec<u8>) -> Result<ObjectMeta>;

    /// Delete an object.
    ///
    /// Deleting an object that does not exist is not an error.
    async fn delete(&self, name: &str) -> Result<()>;
}

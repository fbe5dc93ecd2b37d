//! Local filesystem object store.
//!
//! Stores each object as a file under `{root}/{container}/{name}`. Writes go
//! to a sibling `.partial` file that is renamed into place once complete, so
//! an interrupted upload is never visible as an object.

use crate::digest::md5_file;
use crate::error::{ErrorKind, Result};
use crate::{ObjectMeta, ObjectStore, validate_name};
use async_trait::async_trait;
use exn::ResultExt;
use std::path::{Path, PathBuf};
use tokio::fs;

const PARTIAL_SUFFIX: &str = ".partial";

/// Local filesystem object store.
///
/// # Examples
///
/// ```no_run
/// use stow_storage::backend::LocalBackend;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = LocalBackend::new("scratch", "/mnt/scratch", "archive-2016")?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct LocalBackend {
    name: String,
    container: String,
    /// Directory holding the container's objects
    dir: PathBuf,
}
impl LocalBackend {
    /// Create a new local filesystem backend.
    ///
    /// # Arguments
    /// * `root` - Absolute path of the directory containing containers
    /// * `container` - Container name; becomes a sub-directory of `root`
    ///
    /// # Errors
    ///
    /// Returns an error if `root` is not absolute or `container` is not a
    /// single plain path component.
    pub fn new(name: impl Into<String>, root: impl AsRef<Path>, container: impl Into<String>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_absolute() {
            exn::bail!(ErrorKind::Container(root.display().to_string()));
        }
        let container = container.into();
        if validate_name(&container).ok().as_deref() != Some(container.as_str()) || container.contains('/') {
            exn::bail!(ErrorKind::Container(container));
        }
        let dir = root.join(&container);
        Ok(Self { name: name.into(), container, dir })
    }

    /// Get the absolute path of the file backing an object.
    fn object_path(&self, name: &str) -> Result<PathBuf> {
        let validated = validate_name(name)?;
        Ok(self.dir.join(validated))
    }

    fn partial_path(path: &Path) -> PathBuf {
        let mut partial = path.as_os_str().to_owned();
        partial.push(PARTIAL_SUFFIX);
        PathBuf::from(partial)
    }

    fn map_io_error(e: std::io::Error, name: &str) -> ErrorKind {
        match e.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound(name.to_string()),
            std::io::ErrorKind::PermissionDenied => ErrorKind::Unauthorized(name.to_string()),
            _ => ErrorKind::Io(e),
        }
    }

    async fn etag(path: PathBuf) -> Result<String> {
        let digest = tokio::task::spawn_blocking(move || md5_file(&path))
            .await
            .or_raise(|| ErrorKind::BackendError("digest task panicked".to_string()))?;
        Ok(digest.map_err(ErrorKind::Io)?)
    }

    /// Move a finished `.partial` file into place and describe the result.
    async fn commit(&self, name: &str, partial: &Path, target: &Path) -> Result<ObjectMeta> {
        fs::rename(partial, target).await.map_err(|e| Self::map_io_error(e, name))?;
        let size = fs::metadata(target).await.map_err(|e| Self::map_io_error(e, name))?.len();
        let etag = Self::etag(target.to_path_buf()).await?;
        Ok(ObjectMeta::new(validate_name(name)?, size, etag))
    }

    async fn prepare_parent(&self, name: &str, target: &Path) -> Result<()> {
        // Create parent directories if needed, to keep behaviour
        // consistent with flat object stores.
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await.map_err(|e| Self::map_io_error(e, name))?;
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for LocalBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn container(&self) -> &str {
        &self.container
    }

    async fn reconnect(&self) -> Result<()> {
        Ok(())
    }

    async fn create_container(&self) -> Result<()> {
        fs::create_dir_all(&self.dir).await.or_raise(|| ErrorKind::Container(self.container.clone()))
    }

    async fn head(&self, name: &str) -> Result<Option<ObjectMeta>> {
        let path = self.object_path(name)?;
        let metadata = match fs::metadata(&path).await {
            Ok(metadata) if metadata.is_file() => metadata,
            Ok(_) => return Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => exn::bail!(Self::map_io_error(e, name)),
        };
        let etag = Self::etag(path).await?;
        Ok(Some(ObjectMeta::new(validate_name(name)?, metadata.len(), etag)))
    }

    async fn get(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.object_path(name)?;
        Ok(fs::read(&path).await.map_err(|e| Self::map_io_error(e, name))?)
    }

    async fn put_file(&self, name: &str, source: &Path) -> Result<ObjectMeta> {
        let target = self.object_path(name)?;
        // Open first so an unreadable source is reported as such rather than
        // as a generic I/O failure half-way through the copy.
        let mut reader = fs::File::open(source).await.or_raise(|| ErrorKind::LocalFile(source.to_path_buf()))?;
        self.prepare_parent(name, &target).await?;
        let partial = Self::partial_path(&target);
        let mut writer = fs::File::create(&partial).await.map_err(|e| Self::map_io_error(e, name))?;
        tokio::io::copy(&mut reader, &mut writer).await.map_err(ErrorKind::Io)?;
        writer.sync_all().await.map_err(ErrorKind::Io)?;
        self.commit(name, &partial, &target).await
    }

    async fn put_bytes(&self, name: &str, data: Vec<u8>) -> Result<ObjectMeta> {
        let target = self.object_path(name)?;
        self.prepare_parent(name, &target).await?;
        let partial = Self::partial_path(&target);
        fs::write(&partial, &data).await.map_err(|e| Self::map_io_error(e, name))?;
        self.commit(name, &partial, &target).await
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let path = self.object_path(name)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => exn::bail!(Self::map_io_error(e, name)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::md5_hex;

    fn backend(root: &Path) -> LocalBackend {
        LocalBackend::new("local", root, "container").unwrap()
    }

    #[test]
    fn test_new_rejects_relative_root() {
        assert!(LocalBackend::new("local", "relative/root", "container").is_err());
    }

    #[test]
    fn test_new_rejects_nested_container() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(LocalBackend::new("local", tmp.path(), "a/b").is_err());
        assert!(LocalBackend::new("local", tmp.path(), "..").is_err());
    }

    #[tokio::test]
    async fn test_put_bytes_and_head() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = backend(tmp.path());
        backend.create_container().await.unwrap();
        let meta = backend.put_bytes("a/b/hello.txt", b"hello".to_vec()).await.unwrap();
        assert_eq!(meta.name, "a/b/hello.txt");
        assert_eq!(meta.size, 5);
        assert_eq!(meta.etag, md5_hex(b"hello"));
        assert_eq!(backend.head("a/b/hello.txt").await.unwrap(), Some(meta));
        assert!(tmp.path().join("container/a/b/hello.txt").is_file());
    }

    #[tokio::test]
    async fn test_head_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = backend(tmp.path());
        assert_eq!(backend.head("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_put_file() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("source.bin");
        std::fs::write(&source, b"some bytes").unwrap();
        let backend = backend(tmp.path());
        let meta = backend.put_file("copy.bin", &source).await.unwrap();
        assert_eq!(meta.etag, md5_hex(b"some bytes"));
        assert_eq!(backend.get("copy.bin").await.unwrap(), b"some bytes");
        // No partial file left behind.
        assert!(!tmp.path().join("container/copy.bin.partial").exists());
    }

    #[tokio::test]
    async fn test_put_file_missing_source() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = backend(tmp.path());
        let err = backend.put_file("copy.bin", &tmp.path().join("missing.bin")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::LocalFile(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = backend(tmp.path());
        backend.put_bytes("x", b"1".to_vec()).await.unwrap();
        backend.delete("x").await.unwrap();
        backend.delete("x").await.unwrap();
        assert_eq!(backend.head("x").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_get_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let err = backend(tmp.path()).get("nope").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_traversal_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = backend(tmp.path());
        assert!(backend.put_bytes("../escape", b"bad".to_vec()).await.is_err());
        assert!(backend.head("../../etc/passwd").await.is_err());
    }
}

//! In-memory object store for testing.

use crate::digest::md5_hex;
use crate::error::{ErrorKind, Result};
use crate::{ObjectMeta, ObjectStore, validate_name};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// In-memory object store for testing.
///
/// Objects are stored in a `HashMap` behind a [`RwLock`], so all trait
/// methods can operate on `&self` without external synchronisation. Every
/// operation is counted, and writes can be made to fail on demand to exercise
/// retry paths.
///
/// # Examples
///
/// ```
/// use stow_storage::ObjectStore;
/// use stow_storage::backend::MockBackend;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = MockBackend::with_objects([("scans/001.tif", b"II*\0...")]);
/// assert!(backend.head("scans/001.tif").await?.is_some());
///
/// backend.fail_next_puts(1);
/// assert!(backend.put_bytes("scans/002.tif", b"data".to_vec()).await.is_err());
/// assert!(backend.put_bytes("scans/002.tif", b"data".to_vec()).await.is_ok());
/// assert_eq!(backend.put_count(), 2);
/// # Ok(())
/// # }
/// ```
pub struct MockBackend {
    name: String,
    container: String,
    storage: RwLock<HashMap<String, Vec<u8>>>,
    /// Number of upcoming writes that should fail (`usize::MAX` = forever).
    failing_puts: AtomicUsize,
    puts: AtomicUsize,
    deletes: AtomicUsize,
    reconnects: AtomicUsize,
    containers_created: AtomicUsize,
}

impl MockBackend {
    /// Create a mock backend pre-populated with objects.
    ///
    /// Panics if any name fails validation. If test setup is wrong, then test
    /// should not pass.
    pub fn with_objects(objects: impl IntoIterator<Item = (impl AsRef<str>, impl Into<Vec<u8>>)>) -> Self {
        let mut map = HashMap::new();
        for (name, data) in objects {
            let Ok(validated) = validate_name(name.as_ref()) else {
                // The panic here is DELIBERATE. MockBackend is intended to be
                // used in tests; panics are expected. There is no error result.
                panic!("MockBackend::with_objects: invalid name {}", name.as_ref());
            };
            map.insert(validated, data.into());
        }
        Self {
            name: "mock".to_string(),
            container: "mock".to_string(),
            storage: RwLock::new(map),
            failing_puts: AtomicUsize::new(0),
            puts: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
            reconnects: AtomicUsize::new(0),
            containers_created: AtomicUsize::new(0),
        }
    }

    /// Change the name of the mock backend.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Make the next `count` writes fail with a network error.
    pub fn fail_next_puts(&self, count: usize) {
        self.failing_puts.store(count, Ordering::SeqCst);
    }

    /// Make every write fail with a network error.
    pub fn fail_all_puts(&self) {
        self.fail_next_puts(usize::MAX);
    }

    /// Number of write attempts (successful or not).
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    /// Number of delete calls.
    pub fn delete_count(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    /// Number of reconnects.
    pub fn reconnect_count(&self) -> usize {
        self.reconnects.load(Ordering::SeqCst)
    }

    /// Number of container creation calls.
    pub fn container_count(&self) -> usize {
        self.containers_created.load(Ordering::SeqCst)
    }

    /// Contents of an object, if present.
    pub async fn object(&self, name: &str) -> Option<Vec<u8>> {
        self.storage.read().await.get(name).cloned()
    }

    /// All object names, sorted.
    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.storage.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Count a write attempt and decide whether it should fail.
    fn attempt_put(&self, name: &str) -> Result<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failing_puts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| match n {
                0 => None,
                usize::MAX => Some(usize::MAX),
                n => Some(n - 1),
            })
            .is_ok();
        if failing {
            exn::bail!(ErrorKind::Network(format!("injected failure writing {name}")));
        }
        Ok(())
    }

    async fn store(&self, name: &str, data: Vec<u8>) -> Result<ObjectMeta> {
        let name = validate_name(name)?;
        let meta = ObjectMeta::new(name.clone(), data.len() as u64, md5_hex(&data));
        self.storage.write().await.insert(name, data);
        Ok(meta)
    }
}
impl Default for MockBackend {
    fn default() -> Self {
        let objects: [(&str, &[u8]); 0] = [];
        Self::with_objects(objects)
    }
}

#[async_trait]
impl ObjectStore for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn container(&self) -> &str {
        &self.container
    }

    async fn reconnect(&self) -> Result<()> {
        self.reconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn create_container(&self) -> Result<()> {
        self.containers_created.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn head(&self, name: &str) -> Result<Option<ObjectMeta>> {
        let name = validate_name(name)?;
        let guard = self.storage.read().await;
        Ok(guard.get(&name).map(|data| ObjectMeta::new(name.clone(), data.len() as u64, md5_hex(data))))
    }

    async fn get(&self, name: &str) -> Result<Vec<u8>> {
        let name = validate_name(name)?;
        self.storage.read().await.get(&name).cloned().ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(name)))
    }

    async fn put_file(&self, name: &str, source: &Path) -> Result<ObjectMeta> {
        // Read before counting: an unreadable source never reaches the store.
        let data = tokio::fs::read(source).await.map_err(|_| ErrorKind::LocalFile(source.to_path_buf()))?;
        self.attempt_put(name)?;
        self.store(name, data).await
    }

    async fn put_bytes(&self, name: &str, data: Vec<u8>) -> Result<ObjectMeta> {
        self.attempt_put(name)?;
        self.store(name, data).await
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let name = validate_name(name)?;
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.storage.write().await.remove(&name);
        Ok(())
    }
}

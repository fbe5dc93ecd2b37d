//! In-memory job store for testing.

use crate::error::{ErrorKind, Result};
use crate::{Job, JobStore, TableName};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

type Table = BTreeMap<i64, Job>;

/// In-memory job store for testing.
///
/// Besides the [`JobStore`] contract it remembers every range handed to
/// [`fetch_range`](JobStore::fetch_range), so tests can check which leases
/// were actually scanned.
///
/// ```
/// use stow_jobs::{JobStore, MemoryJobStore, TableName};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let table = TableName::new("scans")?;
/// let store = MemoryJobStore::with_jobs(&table, [(10, "/a"), (11, "/b")]);
/// assert_eq!(store.count_pending(&table).await?, 2);
/// assert_eq!(store.min_pending_id(&table).await?, Some(10));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    tables: Mutex<HashMap<TableName, Table>>,
    fetched: Mutex<Vec<(i64, i64)>>,
}

impl MemoryJobStore {
    /// Create a store holding one table with the given `(id, path)` rows.
    pub fn with_jobs(table: &TableName, jobs: impl IntoIterator<Item = (i64, impl Into<PathBuf>)>) -> Self {
        let rows = jobs.into_iter().map(|(id, path)| (id, Job::new(id, path))).collect();
        let store = Self::default();
        store.lock().insert(table.clone(), rows);
        store
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<TableName, Table>> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_table<T>(&self, table: &TableName, f: impl FnOnce(&mut Table) -> T) -> Result<T> {
        let mut tables = self.lock();
        match tables.get_mut(table) {
            Some(rows) => Ok(f(rows)),
            None => exn::bail!(ErrorKind::UnknownTable(table.to_string())),
        }
    }

    /// A row by id, whatever its state.
    pub fn job(&self, table: &TableName, id: i64) -> Option<Job> {
        self.lock().get(table).and_then(|rows| rows.get(&id).cloned())
    }

    /// Every `[low, high)` range passed to `fetch_range`, in call order.
    pub fn fetched_ranges(&self) -> Vec<(i64, i64)> {
        self.fetched.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn table_exists(&self, table: &TableName) -> Result<bool> {
        Ok(self.lock().contains_key(table))
    }

    async fn create_table(&self, table: &TableName) -> Result<()> {
        let mut tables = self.lock();
        if tables.contains_key(table) {
            exn::bail!(ErrorKind::TableExists(table.to_string()));
        }
        tables.insert(table.clone(), Table::new());
        Ok(())
    }

    async fn insert_paths(&self, table: &TableName, paths: &[PathBuf]) -> Result<u64> {
        // Same rule as the SQLite column: paths are stored as text.
        if paths.iter().any(|path| path.to_str().is_none()) {
            exn::bail!(ErrorKind::InvalidData("path is not valid UTF-8"));
        }
        self.with_table(table, |rows| {
            let mut next = rows.keys().next_back().copied().unwrap_or(0) + 1;
            for path in paths {
                rows.insert(next, Job::new(next, path.clone()));
                next += 1;
            }
            paths.len() as u64
        })
    }

    async fn count_all(&self, table: &TableName) -> Result<u64> {
        self.with_table(table, |rows| rows.len() as u64)
    }

    async fn count_pending(&self, table: &TableName) -> Result<u64> {
        self.with_table(table, |rows| rows.values().filter(|j| !j.uploaded).count() as u64)
    }

    async fn count_done(&self, table: &TableName) -> Result<u64> {
        self.with_table(table, |rows| rows.values().filter(|j| j.uploaded).count() as u64)
    }

    async fn min_pending_id(&self, table: &TableName) -> Result<Option<i64>> {
        self.with_table(table, |rows| rows.values().find(|j| !j.uploaded).map(|j| j.id))
    }

    async fn max_id(&self, table: &TableName) -> Result<Option<i64>> {
        self.with_table(table, |rows| rows.keys().next_back().copied())
    }

    async fn fetch_range(&self, table: &TableName, low: i64, high: i64) -> Result<Vec<Job>> {
        self.fetched.lock().unwrap_or_else(PoisonError::into_inner).push((low, high));
        if low >= high {
            return Ok(Vec::new());
        }
        self.with_table(table, |rows| {
            rows.range(low..high).rev().filter(|(_, job)| !job.uploaded).map(|(_, job)| job.clone()).collect()
        })
    }

    async fn mark_done(&self, table: &TableName, id: i64) -> Result<()> {
        self.with_table(table, |rows| {
            if let Some(job) = rows.get_mut(&id) {
                job.uploaded = true;
            }
        })
    }
}

//! The job store contract.

use crate::error::Result;
use crate::{Job, TableName};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

/// Durable record of which paths have been uploaded.
///
/// A table holds one row per local file. Rows are only ever inserted (during
/// the prepare phase) and flipped from pending to done; the upload engine
/// never deletes or resets them. Every mutation is committed before the
/// method returns.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn table_exists(&self, table: &TableName) -> Result<bool>;

    /// Create an empty job table.
    ///
    /// Returns [`TableExists`](crate::error::ErrorKind::TableExists) rather
    /// than touching an existing table.
    async fn create_table(&self, table: &TableName) -> Result<()>;

    /// Append pending rows for `paths`, in order, within one transaction.
    ///
    /// Returns the number of rows inserted.
    async fn insert_paths(&self, table: &TableName, paths: &[PathBuf]) -> Result<u64>;

    async fn count_all(&self, table: &TableName) -> Result<u64>;

    async fn count_pending(&self, table: &TableName) -> Result<u64>;

    async fn count_done(&self, table: &TableName) -> Result<u64>;

    /// Lowest id still pending, if any.
    async fn min_pending_id(&self, table: &TableName) -> Result<Option<i64>>;

    /// Highest id in the table, pending or not.
    async fn max_id(&self, table: &TableName) -> Result<Option<i64>>;

    /// Pending rows with `low <= id < high`, highest id first.
    async fn fetch_range(&self, table: &TableName, low: i64, high: i64) -> Result<Vec<Job>>;

    /// Mark a row as uploaded. Marking an already-uploaded row is a no-op.
    async fn mark_done(&self, table: &TableName, id: i64) -> Result<()>;
}

pub type StoreHandle = Arc<dyn JobStore>;

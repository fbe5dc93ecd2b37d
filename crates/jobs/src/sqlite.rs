//! SQLite-backed job tables.

use crate::error::{ErrorKind, Result};
use crate::models::JobRow;
use crate::{Database, Job, JobStore, TableName};
use async_trait::async_trait;
use exn::{OptionExt, ResultExt};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::time::Duration;

/// How many times a query is attempted while the database is unreachable.
const MAX_ATTEMPTS: u32 = 5;
const RECONNECT_DELAY: Duration = Duration::from_millis(500);

// SQLite primary result codes (the low byte of extended codes).
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

/// Job store over a SQLite database, one table per upload run.
///
/// Connection failures and lock contention are retried (the pool hands out a
/// fresh connection each time) up to [`MAX_ATTEMPTS`]; anything else means
/// the schema or the query is broken and is returned as
/// [`ErrorKind::Database`].
#[derive(Debug, Clone)]
pub struct SqliteJobStore {
    pool: SqlitePool,
}
impl From<&Database> for SqliteJobStore {
    fn from(db: &Database) -> Self {
        Self { pool: db.pool().clone() }
    }
}

fn sql(query: &str, table: &TableName) -> String {
    query.replace("{table}", table.as_str())
}

fn is_transient(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::WorkerCrashed => true,
        sqlx::Error::Database(db) => db
            .code()
            .and_then(|code| code.parse::<i32>().ok())
            .is_some_and(|code| matches!(code & 0xff, SQLITE_BUSY | SQLITE_LOCKED)),
        _ => false,
    }
}

fn to_count(value: i64) -> Result<u64> {
    u64::try_from(value).or_raise(|| ErrorKind::InvalidData("row count"))
}

impl SqliteJobStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Run a query, retrying on connection loss.
    async fn retrying<T, F, Fut>(&self, what: &'static str, query: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = sqlx::Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match query().await {
                Ok(value) => return Ok(value),
                Err(e) if is_transient(&e) && attempt < MAX_ATTEMPTS => {
                    tracing::warn!(error = %e, attempt, "{what}: database unavailable, reconnecting");
                    tokio::time::sleep(RECONNECT_DELAY * attempt).await;
                    attempt += 1;
                },
                Err(e) if is_transient(&e) => return Err(exn::Exn::from(e).raise(ErrorKind::Connection)),
                Err(e) => return Err(exn::Exn::from(e).raise(ErrorKind::Database)),
            }
        }
    }

    async fn count(&self, what: &'static str, query: &str, table: &TableName) -> Result<u64> {
        let query = sql(query, table);
        let value: i64 = self.retrying(what, || sqlx::query_scalar(&query).fetch_one(&self.pool)).await?;
        to_count(value)
    }

    async fn scalar_id(&self, what: &'static str, query: &str, table: &TableName) -> Result<Option<i64>> {
        let query = sql(query, table);
        self.retrying(what, || sqlx::query_scalar(&query).fetch_one(&self.pool)).await
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn table_exists(&self, table: &TableName) -> Result<bool> {
        let found: i64 = self
            .retrying("table_exists", || {
                sqlx::query_scalar(include_str!("../queries/table_exists.sql")).bind(table.as_str()).fetch_one(&self.pool)
            })
            .await?;
        Ok(found > 0)
    }

    #[tracing::instrument(skip(self), fields(table = %table))]
    async fn create_table(&self, table: &TableName) -> Result<()> {
        if self.table_exists(table).await? {
            exn::bail!(ErrorKind::TableExists(table.to_string()));
        }
        let query = sql(include_str!("../queries/create_table.sql"), table);
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        sqlx::Executor::execute(&mut *tx, sqlx::raw_sql(&query)).await.or_raise(|| ErrorKind::Database)?;
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    async fn insert_paths(&self, table: &TableName, paths: &[PathBuf]) -> Result<u64> {
        let query = sql(include_str!("../queries/insert_path.sql"), table);
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        for path in paths {
            let path = path.to_str().ok_or_raise(|| ErrorKind::InvalidData("path is not valid UTF-8"))?;
            sqlx::query(&query).bind(path).execute(&mut *tx).await.or_raise(|| ErrorKind::Database)?;
        }
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        Ok(paths.len() as u64)
    }

    async fn count_all(&self, table: &TableName) -> Result<u64> {
        self.count("count_all", include_str!("../queries/count_all.sql"), table).await
    }

    async fn count_pending(&self, table: &TableName) -> Result<u64> {
        self.count("count_pending", include_str!("../queries/count_pending.sql"), table).await
    }

    async fn count_done(&self, table: &TableName) -> Result<u64> {
        self.count("count_done", include_str!("../queries/count_done.sql"), table).await
    }

    async fn min_pending_id(&self, table: &TableName) -> Result<Option<i64>> {
        self.scalar_id("min_pending_id", include_str!("../queries/min_pending_id.sql"), table).await
    }

    async fn max_id(&self, table: &TableName) -> Result<Option<i64>> {
        self.scalar_id("max_id", include_str!("../queries/max_id.sql"), table).await
    }

    async fn fetch_range(&self, table: &TableName, low: i64, high: i64) -> Result<Vec<Job>> {
        let query = sql(include_str!("../queries/fetch_range.sql"), table);
        let rows: Vec<JobRow> = self
            .retrying("fetch_range", || sqlx::query_as(&query).bind(low).bind(high).fetch_all(&self.pool))
            .await?;
        Ok(rows.into_iter().map(Job::from).collect())
    }

    async fn mark_done(&self, table: &TableName, id: i64) -> Result<()> {
        let query = sql(include_str!("../queries/mark_done.sql"), table);
        self.retrying("mark_done", || sqlx::query(&query).bind(id).execute(&self.pool)).await?;
        Ok(())
    }
}

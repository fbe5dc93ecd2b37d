//! Job tables: the durable work queue behind an upload run.
//!
//! Each run works through one table of `(id, path, uploaded)` rows created by
//! the prepare phase. The table is the only record of progress: there is no
//! lease table and no per-run state. Rows flip from pending to uploaded once,
//! after the object is confirmed in the store, so a killed run picks up where
//! it left off just by being started again.
//!
//! - [`SqliteJobStore`]: the real thing, on a WAL-mode SQLite pool.
//! - [`MemoryJobStore`] (feature `mock`): for other crates' tests.

mod db;
pub mod error;
#[cfg(feature = "mock")]
mod memory;
mod models;
mod sqlite;
mod store;
mod table;

pub use crate::db::Database;
#[cfg(feature = "mock")]
pub use crate::memory::MemoryJobStore;
pub use crate::models::Job;
pub use crate::sqlite::SqliteJobStore;
pub use crate::store::{JobStore, StoreHandle};
pub use crate::table::TableName;

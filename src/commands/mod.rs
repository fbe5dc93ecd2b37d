mod prepare;
mod status;
mod upload;

pub use self::prepare::prepare;
pub use self::status::status;
pub use self::upload::{UploadArgs, upload};

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use stow_config::Config;
use stow_jobs::{Database, SqliteJobStore, TableName};

pub(crate) fn table_name(name: &str) -> Result<TableName> {
    TableName::new(name).or_raise(|| ErrorKind::Table)
}

pub(crate) async fn open_jobs(config: &Config) -> Result<(Database, SqliteJobStore)> {
    let database = Database::connect(&config.database).await.or_raise(|| ErrorKind::Database)?;
    let jobs = SqliteJobStore::from(&database);
    Ok((database, jobs))
}

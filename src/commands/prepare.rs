use super::{open_jobs, table_name};
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::path::Path;
use stow_config::Config;

pub async fn prepare(config: &Config, directory: &Path, table: &str) -> Result<()> {
    let table = table_name(table)?;
    let (database, jobs) = open_jobs(config).await?;
    let result = stow_engine::prepare(&jobs, &table, directory).await;
    database.close().await;
    let inserted = result.or_raise(|| ErrorKind::Prepare)?;
    println!("Prepared {inserted} jobs in table {table}.");
    Ok(())
}

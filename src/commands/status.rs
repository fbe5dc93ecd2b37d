use super::{open_jobs, table_name};
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use stow_config::Config;
use stow_engine::report::percent_done;
use stow_jobs::{JobStore, TableName};

/// `(total, done)`, or `None` if the table doesn't exist.
async fn counts(jobs: &dyn JobStore, table: &TableName) -> stow_jobs::error::Result<Option<(u64, u64)>> {
    if !jobs.table_exists(table).await? {
        return Ok(None);
    }
    Ok(Some((jobs.count_all(table).await?, jobs.count_done(table).await?)))
}

pub async fn status(config: &Config, table: &str) -> Result<()> {
    let table = table_name(table)?;
    let (database, jobs) = open_jobs(config).await?;
    let counts = counts(&jobs, &table).await;
    database.close().await;

    let Some((total, done)) = counts.or_raise(|| ErrorKind::Status)? else {
        exn::bail!(ErrorKind::UnknownTable(table.to_string()));
    };
    println!(
        "{table}: {done} of {total} uploaded ({:.2}%), {} pending",
        percent_done(done, 0, total),
        total - done
    );
    // The latest line written by a running (or the last) upload.
    let status_file = config.log_dir.join(format!("{table}.upload.out"));
    if let Ok(line) = tokio::fs::read_to_string(&status_file).await {
        print!("{line}");
    }
    Ok(())
}

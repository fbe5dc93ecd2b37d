use super::{open_jobs, table_name};
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::sync::Arc;
use stow_config::{BackendConfig, Config, Credentials};
use stow_engine::{Orchestrator, RunOptions};
use stow_storage::BackendHandle;
use stow_storage::backend::{LocalBackend, S3Backend};
use tokio_util::sync::CancellationToken;

pub struct UploadArgs<'a> {
    pub container: &'a str,
    pub table: &'a str,
    pub workers: u16,
    pub cutoff: Option<&'a str>,
}

fn backend(config: &Config, container: &str) -> Result<BackendHandle> {
    let backend: BackendHandle = match &config.backend {
        BackendConfig::S3 => {
            let credentials = Credentials::from_env().or_raise(|| ErrorKind::Config)?;
            tracing::debug!(?credentials, "using S3 backend");
            Arc::new(
                S3Backend::new(
                    "s3",
                    container,
                    credentials.project,
                    credentials.region,
                    Some(credentials.endpoint),
                    credentials.identity,
                    credentials.secret,
                )
                .or_raise(|| ErrorKind::Storage)?,
            )
        },
        BackendConfig::Local { root } => {
            Arc::new(LocalBackend::new("local", root, container).or_raise(|| ErrorKind::Storage)?)
        },
    };
    Ok(backend)
}

pub async fn upload(config: &Config, args: UploadArgs<'_>) -> Result<()> {
    let table = table_name(args.table)?;
    let store = backend(config, args.container)?;
    let (database, jobs) = open_jobs(config).await?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, finishing in-flight uploads");
            on_signal.cancel();
        }
    });

    let options = RunOptions {
        table,
        workers: usize::from(args.workers),
        cutoff: args.cutoff.map(str::to_string),
        transfer: config.transfer.clone(),
        monitor_interval: config.monitor.interval(),
        log_dir: config.log_dir.clone(),
    };
    let result = Orchestrator::new(Arc::new(jobs), store, options).run(cancel).await;
    database.close().await;
    let summary = result.or_raise(|| ErrorKind::Upload)?;

    println!("Total uploaded: {}", summary.completed);
    println!("Total skipped (already uploaded): {}", summary.skipped);
    println!("Total failed uploaded: {}", summary.failed);
    if let Some(error_log) = summary.error_log {
        println!("Failed uploads stored in {}", error_log.display());
    }
    Ok(())
}

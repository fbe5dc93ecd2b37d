//! Running one table to completion.

use crate::checksum::Verifier;
use crate::error::{ErrorKind, Result};
use crate::monitor::Monitor;
use crate::report::{Artifacts, percent_done};
use crate::state::SharedState;
use crate::transfer::{Executor, RetryPolicy};
use crate::worker::{Pipeline, Worker};
use exn::ResultExt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use stow_config::TransferConfig;
use stow_jobs::{StoreHandle, TableName};
use stow_storage::BackendHandle;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

#[derive(Clone, Debug)]
pub struct RunOptions {
    pub table: TableName,
    pub workers: usize,
    /// Prefix stripped from local paths to form object names.
    pub cutoff: Option<String>,
    pub transfer: TransferConfig,
    pub monitor_interval: Duration,
    pub log_dir: PathBuf,
}

/// Counts for one run. Jobs finished by earlier runs are not included.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub completed: u64,
    pub skipped: u64,
    pub failed: u64,
    /// `None` when there was nothing to do and no artifacts were written.
    pub error_log: Option<PathBuf>,
}

pub struct Orchestrator {
    jobs: StoreHandle,
    store: BackendHandle,
    options: RunOptions,
}

impl Orchestrator {
    pub fn new(jobs: StoreHandle, store: BackendHandle, options: RunOptions) -> Self {
        Self { jobs, store, options }
    }

    /// Upload every pending job in the table.
    ///
    /// Returns an error only for setup problems and job store failures;
    /// individual jobs that fail are counted in the summary and listed in the
    /// error log. Cancelling `cancel` stops workers from starting new jobs.
    #[tracing::instrument(skip_all, fields(table = %self.options.table, workers = self.options.workers))]
    pub async fn run(&self, cancel: CancellationToken) -> Result<RunSummary> {
        let table = &self.options.table;
        let jobs = &self.jobs;
        if !jobs.table_exists(table).await.or_raise(|| ErrorKind::JobStore)? {
            exn::bail!(ErrorKind::UnknownTable(table.to_string()));
        }
        let total = jobs.count_all(table).await.or_raise(|| ErrorKind::JobStore)?;
        if total == 0 {
            exn::bail!(ErrorKind::EmptyTable(table.to_string()));
        }
        let Some(start) = jobs.min_pending_id(table).await.or_raise(|| ErrorKind::JobStore)? else {
            tracing::info!(total, "nothing pending");
            return Ok(RunSummary::default());
        };
        let upper = jobs.max_id(table).await.or_raise(|| ErrorKind::JobStore)?.unwrap_or(start);
        let baseline = jobs.count_done(table).await.or_raise(|| ErrorKind::JobStore)?;

        self.store.create_container().await.or_raise(|| ErrorKind::Storage)?;
        let artifacts = Arc::new(Artifacts::create(&self.options.log_dir, table).await?);
        let state = SharedState::new(start, upper, self.options.transfer.batch);
        tracing::info!(total, baseline, start, upper, container = self.store.container(), "starting upload");

        let pipeline = Arc::new(Pipeline {
            verifier: Verifier::new(self.store.clone()),
            executor: Executor::new(self.store.clone(), RetryPolicy::from(&self.options.transfer)),
            cutoff: self.options.cutoff.clone(),
            transfer: self.options.transfer.clone(),
            table: table.clone(),
        });

        let run_token = cancel.child_token();
        let monitor_token = run_token.child_token();
        let monitor = tokio::spawn(
            Monitor {
                state: state.clone(),
                artifacts: artifacts.clone(),
                interval: self.options.monitor_interval,
                baseline,
                total,
            }
            .run(monitor_token.clone()),
        );

        let mut workers = JoinSet::new();
        for id in 0..self.options.workers.max(1) {
            let worker = Worker {
                id,
                jobs: jobs.clone(),
                table: table.clone(),
                state: state.clone(),
                pipeline: pipeline.clone(),
                artifacts: artifacts.clone(),
            };
            workers.spawn(worker.run(run_token.clone()));
        }

        let mut fatal = None;
        while let Some(joined) = workers.join_next().await {
            let result = match joined {
                Ok(result) => result,
                Err(e) => Err(exn::Exn::from(e).raise(ErrorKind::Worker)),
            };
            if let Err(e) = result
                && fatal.is_none()
            {
                tracing::error!(error = ?e, "worker failed, stopping the run");
                run_token.cancel();
                fatal = Some(e);
            }
        }

        monitor_token.cancel();
        if let Err(e) = monitor.await {
            tracing::warn!(error = %e, "monitor task failed");
        }

        let snapshot = state.snapshot();
        let summary = RunSummary {
            completed: snapshot.completed,
            skipped: snapshot.skipped,
            failed: snapshot.failed,
            error_log: Some(artifacts.error_log_path().to_path_buf()),
        };
        let percent = percent_done(baseline, summary.completed, total);
        if let Err(e) = artifacts.write_status(percent, snapshot.speed).await {
            tracing::warn!(error = ?e, "cannot update status file");
        }
        artifacts.write_report(&summary).await?;
        if let Some(e) = fatal {
            return Err(e);
        }
        tracing::info!(
            completed = summary.completed,
            skipped = summary.skipped,
            failed = summary.failed,
            cancelled = cancel.is_cancelled(),
            "run finished"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use stow_jobs::{JobStore, MemoryJobStore};
    use stow_storage::backend::MockBackend;

    fn table() -> TableName {
        TableName::new("scans").unwrap()
    }

    fn options(dir: &Path, workers: usize) -> RunOptions {
        RunOptions {
            table: table(),
            workers,
            cutoff: Some(dir.join("data").to_str().unwrap().to_string()),
            transfer: TransferConfig { batch: 2, delay_ms: 0, temp_dir: dir.join("staging"), ..Default::default() },
            monitor_interval: Duration::from_millis(10),
            log_dir: dir.join("logs"),
        }
    }

    /// Three files with ids 10, 11 and 12.
    fn fixture(dir: &Path) -> Vec<(i64, PathBuf)> {
        let data = dir.join("data");
        std::fs::create_dir_all(&data).unwrap();
        ["a.tif", "b.tif", "c.tif"]
            .iter()
            .zip(10..)
            .map(|(name, id)| {
                let path = data.join(name);
                std::fs::write(&path, name.repeat(id as usize)).unwrap();
                (id, path)
            })
            .collect()
    }

    #[tokio::test]
    async fn test_leases_and_completes_every_job() {
        let tmp = tempfile::tempdir().unwrap();
        let jobs = Arc::new(MemoryJobStore::with_jobs(&table(), fixture(tmp.path())));
        let store = Arc::new(MockBackend::default());
        let orchestrator = Orchestrator::new(jobs.clone(), store.clone(), options(tmp.path(), 2));

        let summary = orchestrator.run(CancellationToken::new()).await.unwrap();
        assert_eq!((summary.completed, summary.skipped, summary.failed), (3, 0, 0));
        let mut ranges = jobs.fetched_ranges();
        ranges.sort();
        assert_eq!(ranges, vec![(10, 12), (12, 14)]);
        assert_eq!(jobs.count_pending(&table()).await.unwrap(), 0);
        assert_eq!(store.names().await, vec!["a.tif", "b.tif", "c.tif"]);
        assert_eq!(store.container_count(), 1);

        let report = std::fs::read_to_string(tmp.path().join("logs/scans.upload.report.log")).unwrap();
        assert!(report.contains("Total uploaded: 3\n"));
        let status = std::fs::read_to_string(tmp.path().join("logs/scans.upload.out")).unwrap();
        assert!(status.starts_with("100.00000000% Uploaded at "));
    }

    #[tokio::test]
    async fn test_rerun_uploads_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let files = fixture(tmp.path());
        let store = Arc::new(MockBackend::default());
        let jobs = Arc::new(MemoryJobStore::with_jobs(&table(), files.clone()));
        Orchestrator::new(jobs.clone(), store.clone(), options(tmp.path(), 2))
            .run(CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(store.put_count(), 3);

        // Same table: nothing pending.
        let summary = Orchestrator::new(jobs.clone(), store.clone(), options(tmp.path(), 2))
            .run(CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(summary, RunSummary::default());

        // A fresh table over the same files: every job is a checksum skip.
        let fresh = Arc::new(MemoryJobStore::with_jobs(&table(), files));
        let summary = Orchestrator::new(fresh.clone(), store.clone(), options(tmp.path(), 3))
            .run(CancellationToken::new())
            .await
            .unwrap();
        assert_eq!((summary.completed, summary.skipped), (3, 3));
        assert_eq!(store.put_count(), 3);
        assert_eq!(fresh.count_done(&table()).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_failing_store_is_retried_then_logged_once() {
        let tmp = tempfile::tempdir().unwrap();
        let files = fixture(tmp.path());
        let jobs = Arc::new(MemoryJobStore::with_jobs(&table(), files.into_iter().take(1)));
        let store = Arc::new(MockBackend::default());
        store.fail_all_puts();

        let summary = Orchestrator::new(jobs.clone(), store.clone(), options(tmp.path(), 1))
            .run(CancellationToken::new())
            .await
            .unwrap();
        assert_eq!((summary.completed, summary.failed), (0, 1));
        assert_eq!(store.put_count(), 5);
        assert_eq!(jobs.count_pending(&table()).await.unwrap(), 1);

        let log = std::fs::read_to_string(summary.error_log.unwrap()).unwrap();
        assert_eq!(log.matches("Failed: ").count(), 1);
        assert!(log.contains("a.tif"));
    }

    #[tokio::test]
    async fn test_stale_remote_object_is_replaced() {
        let tmp = tempfile::tempdir().unwrap();
        let files = fixture(tmp.path());
        let expected = std::fs::read(&files[0].1).unwrap();
        let jobs = Arc::new(MemoryJobStore::with_jobs(&table(), files.into_iter().take(1)));
        let store = Arc::new(MockBackend::with_objects([("a.tif", b"stale".to_vec())]));

        let summary = Orchestrator::new(jobs, store.clone(), options(tmp.path(), 1))
            .run(CancellationToken::new())
            .await
            .unwrap();
        assert_eq!((summary.completed, summary.skipped), (1, 0));
        assert_eq!(store.delete_count(), 1);
        assert_eq!(store.object("a.tif").await.unwrap(), expected);
    }

    #[tokio::test]
    async fn test_large_file_is_segmented() {
        let tmp = tempfile::tempdir().unwrap();
        let files = fixture(tmp.path());
        let jobs = Arc::new(MemoryJobStore::with_jobs(&table(), files));
        let store = Arc::new(MockBackend::default());
        let mut options = options(tmp.path(), 2);
        // a.tif is 50 bytes, b.tif 55, c.tif 60.
        options.transfer.file_limit = 52;
        options.transfer.segment_size = 16;

        let summary = Orchestrator::new(jobs, store.clone(), options).run(CancellationToken::new()).await.unwrap();
        assert_eq!(summary.completed, 3);
        let names = store.names().await;
        assert!(names.contains(&"a.tif".to_string()));
        assert!(names.contains(&"b.tif-0003".to_string()));
        assert!(names.contains(&"c.tif.manifest.json".to_string()));
        assert!(!names.contains(&"b.tif".to_string()));
        assert_eq!(std::fs::read_dir(tmp.path().join("staging")).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_run_leaves_jobs_pending() {
        let tmp = tempfile::tempdir().unwrap();
        let jobs = Arc::new(MemoryJobStore::with_jobs(&table(), fixture(tmp.path())));
        let store = Arc::new(MockBackend::default());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let summary = Orchestrator::new(jobs.clone(), store.clone(), options(tmp.path(), 2)).run(cancel).await.unwrap();
        assert_eq!(summary.completed, 0);
        assert_eq!(store.put_count(), 0);
        assert_eq!(jobs.count_pending(&table()).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_unknown_table() {
        let tmp = tempfile::tempdir().unwrap();
        let orchestrator =
            Orchestrator::new(Arc::new(MemoryJobStore::default()), Arc::new(MockBackend::default()), options(tmp.path(), 1));
        let err = orchestrator.run(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::UnknownTable(_)));
    }

    #[tokio::test]
    async fn test_empty_table() {
        let tmp = tempfile::tempdir().unwrap();
        let jobs = Arc::new(MemoryJobStore::default());
        jobs.create_table(&table()).await.unwrap();
        let store = Arc::new(MockBackend::default());
        let err = Orchestrator::new(jobs, store.clone(), options(tmp.path(), 1))
            .run(CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(&*err, ErrorKind::EmptyTable(_)));
        assert_eq!(store.container_count(), 0);
    }
}

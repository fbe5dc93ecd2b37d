//! Per-job processing and the worker lease loop.

use crate::checksum::Verifier;
use crate::error::{ErrorKind, Result};
use crate::manifest::{self, Manifest};
use crate::naming::{index_width, manifest_name, readme_name, remote_name, segment_name};
use crate::report::Artifacts;
use crate::segment;
use crate::state::SharedState;
use crate::transfer::{Executor, TransferOutcome};
use exn::ResultExt;
use std::path::Path;
use std::sync::Arc;
use stow_config::{ManifestMode, TransferConfig};
use stow_jobs::{Job, StoreHandle, TableName};
use tokio_util::sync::CancellationToken;

/// What happened to one job.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum JobOutcome {
    Uploaded,
    /// The remote copy already matched.
    Skipped,
    Failed(String),
}

/// Per-job steps shared by every worker: name, verify, transfer.
pub(crate) struct Pipeline {
    pub verifier: Verifier,
    pub executor: Executor,
    pub cutoff: Option<String>,
    pub transfer: TransferConfig,
    pub table: TableName,
}

impl Pipeline {
    #[tracing::instrument(level = "debug", skip_all, fields(id = job.id, path = %job.path.display()))]
    pub async fn process(&self, job: &Job) -> JobOutcome {
        let remote = match remote_name(&job.path, self.cutoff.as_deref()) {
            Ok(remote) => remote,
            Err(e) => return JobOutcome::Failed(e.to_string()),
        };
        let size = match tokio::fs::metadata(&job.path).await {
            Ok(meta) if meta.is_file() => meta.len(),
            Ok(_) => return JobOutcome::Failed("not a regular file".to_string()),
            Err(e) => return JobOutcome::Failed(format!("cannot read local file: {e}")),
        };
        if size > self.transfer.file_limit {
            self.segmented(job, &remote).await
        } else {
            self.direct(&job.path, &remote).await
        }
    }

    async fn direct(&self, local: &Path, remote: &str) -> JobOutcome {
        if self.verifier.is_uploaded(local, remote).await {
            return JobOutcome::Skipped;
        }
        self.verifier.remove_segmented(remote).await;
        match self.executor.upload(local, remote).await {
            TransferOutcome::Transferred { .. } => JobOutcome::Uploaded,
            TransferOutcome::Failed { reason, .. } => JobOutcome::Failed(reason),
        }
    }

    async fn segmented(&self, job: &Job, remote: &str) -> JobOutcome {
        let segment_size = self.transfer.segment_size;
        let mode = self.transfer.manifest;
        if self.verifier.is_uploaded_segmented(&job.path, remote, segment_size, mode).await {
            return JobOutcome::Skipped;
        }
        self.verifier.remove_whole(remote).await;
        // One staging directory per job, so concurrent workers never collide.
        let staging = self.transfer.temp_dir.join(format!("{}-{}", self.table, job.id));
        let outcome = self.upload_segments(&job.path, remote, &staging).await;
        segment::purge(&staging).await;
        outcome
    }

    async fn upload_segments(&self, local: &Path, remote: &str, staging: &Path) -> JobOutcome {
        let segments = match segment::split(local, staging, self.transfer.segment_size).await {
            Ok(segments) => segments,
            Err(e) => return JobOutcome::Failed(format!("{e:?}")),
        };
        let width = index_width(segments.len());
        let mut manifest = Manifest::default();
        for segment in &segments {
            let name = segment_name(remote, segment.index, width);
            match self.executor.upload(&segment.path, &name).await {
                TransferOutcome::Transferred { etag, size, .. } => manifest.push(name, etag, size),
                TransferOutcome::Failed { reason, .. } => {
                    return JobOutcome::Failed(format!("segment {name}: {reason}"));
                },
            }
        }
        tracing::debug!(remote, segments = segments.len(), "segments uploaded");

        // The last object written is what marks the upload complete.
        let names: Vec<String> = manifest.entries.iter().map(|e| e.path.clone()).collect();
        let readme = manifest::readme(remote, &names).into_bytes();
        if let TransferOutcome::Failed { reason, .. } = self.executor.upload_bytes(readme, &readme_name(remote)).await {
            return JobOutcome::Failed(format!("readme: {reason}"));
        }
        if self.transfer.manifest == ManifestMode::Static {
            let json = match manifest.to_json() {
                Ok(json) => json,
                Err(e) => return JobOutcome::Failed(format!("{e:?}")),
            };
            if let TransferOutcome::Failed { reason, .. } =
                self.executor.upload_bytes(json, &manifest_name(remote)).await
            {
                return JobOutcome::Failed(format!("manifest: {reason}"));
            }
        }
        JobOutcome::Uploaded
    }
}

/// One member of the pool: leases id ranges until none are left.
pub(crate) struct Worker {
    pub id: usize,
    pub jobs: StoreHandle,
    pub table: TableName,
    pub state: SharedState,
    pub pipeline: Arc<Pipeline>,
    pub artifacts: Arc<Artifacts>,
}

impl Worker {
    /// Only job store failures end a worker early with an error; a job that
    /// fails is recorded and left pending.
    #[tracing::instrument(level = "debug", skip_all, fields(worker = self.id))]
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        'leases: while !cancel.is_cancelled() {
            let Some(lease) = self.state.next_lease() else {
                break;
            };
            let jobs =
                self.jobs.fetch_range(&self.table, lease.low, lease.high).await.or_raise(|| ErrorKind::JobStore)?;
            tracing::debug!(low = lease.low, high = lease.high, pending = jobs.len(), "leased range");
            for job in jobs {
                if cancel.is_cancelled() {
                    break 'leases;
                }
                match self.pipeline.process(&job).await {
                    outcome @ (JobOutcome::Uploaded | JobOutcome::Skipped) => {
                        self.jobs.mark_done(&self.table, job.id).await.or_raise(|| ErrorKind::JobStore)?;
                        self.state.record_completed(outcome == JobOutcome::Skipped);
                    },
                    JobOutcome::Failed(reason) => {
                        tracing::warn!(id = job.id, path = %job.path.display(), %reason, "upload failed");
                        self.state.record_failed();
                        if let Err(e) = self.artifacts.record_failure(&job.path).await {
                            tracing::error!(error = ?e, "cannot record failed upload");
                        }
                    },
                }
            }
        }
        Ok(())
    }
}

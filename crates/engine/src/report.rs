//! Per-run artifacts in the log directory.
//!
//! - `{table}.upload.error.log`: one `Failed: <path>` line per job that ran
//!   out of attempts, under a header naming the run. Appended to, so the
//!   history of earlier runs is kept.
//! - `{table}.upload.out`: the latest progress line, overwritten in place.
//! - `{table}.upload.report.log`: final counts, written once at the end.

use crate::error::{ErrorKind, Result};
use crate::run::RunSummary;
use exn::ResultExt;
use std::path::{Path, PathBuf};
use stow_jobs::TableName;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

pub struct Artifacts {
    error_log_path: PathBuf,
    status_path: PathBuf,
    report_path: PathBuf,
    error_log: Mutex<File>,
}

impl Artifacts {
    /// Open the error log (creating `log_dir` if needed) and stamp it with a
    /// header for this run.
    #[tracing::instrument(level = "debug", skip(log_dir), fields(log_dir = %log_dir.display()))]
    pub async fn create(log_dir: &Path, table: &TableName) -> Result<Self> {
        fs::create_dir_all(log_dir).await.or_raise(|| ErrorKind::Artifact(log_dir.to_path_buf()))?;
        let error_log_path = log_dir.join(format!("{table}.upload.error.log"));
        let failed = || ErrorKind::Artifact(error_log_path.clone());
        let mut file = OpenOptions::new().create(true).append(true).open(&error_log_path).await.or_raise(failed)?;
        let started = OffsetDateTime::now_utc().format(&Rfc3339).or_raise(failed)?;
        file.write_all(format!("From execution {started}:\n").as_bytes()).await.or_raise(failed)?;
        file.flush().await.or_raise(failed)?;
        Ok(Self {
            status_path: log_dir.join(format!("{table}.upload.out")),
            report_path: log_dir.join(format!("{table}.upload.report.log")),
            error_log: Mutex::new(file),
            error_log_path,
        })
    }

    pub fn error_log_path(&self) -> &Path {
        &self.error_log_path
    }

    pub fn status_path(&self) -> &Path {
        &self.status_path
    }

    pub fn report_path(&self) -> &Path {
        &self.report_path
    }

    /// Append a permanently failed job.
    pub async fn record_failure(&self, path: &Path) -> Result<()> {
        let failed = || ErrorKind::Artifact(self.error_log_path.clone());
        let line = format!("Failed: {}\n", path.display());
        let mut file = self.error_log.lock().await;
        file.write_all(line.as_bytes()).await.or_raise(failed)?;
        file.flush().await.or_raise(failed)
    }

    /// Replace the status file with the current progress line.
    pub async fn write_status(&self, percent: f64, speed: f64) -> Result<()> {
        fs::write(&self.status_path, status_line(percent, speed))
            .await
            .or_raise(|| ErrorKind::Artifact(self.status_path.clone()))
    }

    pub async fn write_report(&self, summary: &RunSummary) -> Result<()> {
        let report = format!(
            "Total uploaded: {}\nTotal skipped (already uploaded): {}\nTotal failed uploaded: {}\nFailed uploads stored in {}\n",
            summary.completed,
            summary.skipped,
            summary.failed,
            self.error_log_path.display(),
        );
        fs::write(&self.report_path, report).await.or_raise(|| ErrorKind::Artifact(self.report_path.clone()))
    }
}

pub fn status_line(percent: f64, speed: f64) -> String {
    format!("{percent:.8}% Uploaded at {speed:.2} uploads/second.\n")
}

/// Share of all jobs that are done, counting those finished by earlier runs.
pub fn percent_done(baseline: u64, completed: u64, total: u64) -> f64 {
    if total == 0 {
        return 100.0;
    }
    (baseline + completed) as f64 / total as f64 * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn table() -> TableName {
        TableName::new("scans").unwrap()
    }

    #[rstest]
    #[case(0, 0, 4, 0.0)]
    #[case(1, 1, 4, 50.0)]
    #[case(0, 4, 4, 100.0)]
    #[case(0, 0, 0, 100.0)]
    fn test_percent_done(#[case] baseline: u64, #[case] completed: u64, #[case] total: u64, #[case] expected: f64) {
        assert!((percent_done(baseline, completed, total) - expected).abs() < f64::EPSILON);
    }

    #[test]
    fn test_status_line() {
        assert_eq!(status_line(12.5, 3.14159), "12.50000000% Uploaded at 3.14 uploads/second.\n");
    }

    #[tokio::test]
    async fn test_error_log() {
        let tmp = tempfile::tempdir().unwrap();
        let log_dir = tmp.path().join("logs");
        let artifacts = Artifacts::create(&log_dir, &table()).await.unwrap();
        artifacts.record_failure(Path::new("/data/a.tif")).await.unwrap();
        artifacts.record_failure(Path::new("/data/b.tif")).await.unwrap();

        let text = std::fs::read_to_string(log_dir.join("scans.upload.error.log")).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("From execution "));
        assert!(lines[0].ends_with(':'));
        assert_eq!(&lines[1..], ["Failed: /data/a.tif", "Failed: /data/b.tif"]);
    }

    #[tokio::test]
    async fn test_error_log_keeps_history() {
        let tmp = tempfile::tempdir().unwrap();
        let first = Artifacts::create(tmp.path(), &table()).await.unwrap();
        first.record_failure(Path::new("/a")).await.unwrap();
        drop(first);
        Artifacts::create(tmp.path(), &table()).await.unwrap();
        let text = std::fs::read_to_string(tmp.path().join("scans.upload.error.log")).unwrap();
        assert_eq!(text.matches("From execution").count(), 2);
        assert_eq!(text.matches("Failed: /a").count(), 1);
    }

    #[tokio::test]
    async fn test_status_overwritten() {
        let tmp = tempfile::tempdir().unwrap();
        let artifacts = Artifacts::create(tmp.path(), &table()).await.unwrap();
        artifacts.write_status(10.0, 1.0).await.unwrap();
        artifacts.write_status(20.0, 2.0).await.unwrap();
        let text = std::fs::read_to_string(artifacts.status_path()).unwrap();
        assert_eq!(text, status_line(20.0, 2.0));
    }

    #[tokio::test]
    async fn test_report() {
        let tmp = tempfile::tempdir().unwrap();
        let artifacts = Artifacts::create(tmp.path(), &table()).await.unwrap();
        let summary = RunSummary { completed: 7, skipped: 2, failed: 1, error_log: None };
        artifacts.write_report(&summary).await.unwrap();
        let text = std::fs::read_to_string(tmp.path().join("scans.upload.report.log")).unwrap();
        assert!(text.contains("Total uploaded: 7\n"));
        assert!(text.contains("Total failed uploaded: 1\n"));
        assert!(text.contains("scans.upload.error.log"));
    }
}

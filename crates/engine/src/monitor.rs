//! Periodic progress sampling for the status file.

use crate::report::{Artifacts, percent_done};
use crate::state::SharedState;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Samples throughput and keeps the status file current. Read-only with
/// respect to jobs.
pub(crate) struct Monitor {
    pub state: SharedState,
    pub artifacts: Arc<Artifacts>,
    pub interval: Duration,
    /// Jobs already done before this run started.
    pub baseline: u64,
    pub total: u64,
}

impl Monitor {
    pub async fn run(self, cancel: CancellationToken) {
        let mut previous = self.state.completed();
        let mut sampled_at = Instant::now();
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(self.interval) => {},
            }
            let current = self.state.completed();
            let now = Instant::now();
            let speed = speed(previous, current, now - sampled_at);
            self.state.set_speed(speed);
            previous = current;
            sampled_at = now;

            let percent = percent_done(self.baseline, current, self.total);
            if let Err(e) = self.artifacts.write_status(percent, speed).await {
                tracing::warn!(error = ?e, "cannot update status file");
            }
            tracing::info!(completed = current, percent = format_args!("{percent:.2}"), speed, "progress");
            if self.state.is_exhausted() {
                break;
            }
        }
    }
}

/// Completions per second between two samples.
pub(crate) fn speed(previous: u64, current: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        return 0.0;
    }
    current.saturating_sub(previous) as f64 / secs
}

//! Uploading one object with bounded retries.

use std::path::Path;
use std::time::Duration;
use stow_config::{BackoffKind, TransferConfig};
use stow_storage::error::Result as StorageResult;
use stow_storage::{BackendHandle, ObjectMeta};

/// Wait between attempts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backoff {
    Fixed(Duration),
    /// `base`, `2 * base`, `4 * base`, ... never more than `max`.
    Exponential { base: Duration, max: Duration },
}

impl Backoff {
    /// Delay before retry number `attempt` (the first retry is attempt 1).
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Self::Fixed(delay) => delay,
            Self::Exponential { base, max } => {
                let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
                base.saturating_mul(factor).min(max)
            },
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl From<&TransferConfig> for RetryPolicy {
    fn from(config: &TransferConfig) -> Self {
        let backoff = match config.backoff {
            BackoffKind::Fixed => Backoff::Fixed(config.delay()),
            BackoffKind::Exponential => Backoff::Exponential { base: config.delay(), max: config.max_delay() },
        };
        Self { max_attempts: config.max_attempts.max(1), backoff }
    }
}

/// How an upload ended. Failures are values, not errors: the caller records
/// them and moves on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransferOutcome {
    Transferred { etag: String, size: u64, attempts: u32 },
    Failed { attempts: u32, reason: String },
}

impl TransferOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Transferred { .. })
    }
}

/// Puts objects, reconnecting and backing off between failed attempts.
#[derive(Clone)]
pub struct Executor {
    store: BackendHandle,
    policy: RetryPolicy,
}

impl Executor {
    pub fn new(store: BackendHandle, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    /// Upload the file at `local` as `remote`.
    ///
    /// A local file that can't be opened fails at once with zero attempts;
    /// no amount of retrying fixes it.
    #[tracing::instrument(level = "debug", skip(self, local), fields(local = %local.display()))]
    pub async fn upload(&self, local: &Path, remote: &str) -> TransferOutcome {
        if let Err(e) = tokio::fs::File::open(local).await {
            return TransferOutcome::Failed { attempts: 0, reason: format!("cannot open local file: {e}") };
        }
        self.with_retries(remote, || self.store.put_file(remote, local)).await
    }

    /// Upload an in-memory buffer (readmes and manifests).
    #[tracing::instrument(level = "debug", skip(self, data), fields(len = data.len()))]
    pub async fn upload_bytes(&self, data: Vec<u8>, remote: &str) -> TransferOutcome {
        self.with_retries(remote, || self.store.put_bytes(remote, data.clone())).await
    }

    async fn with_retries<F, Fut>(&self, remote: &str, put: F) -> TransferOutcome
    where
        F: Fn() -> Fut,
        Fut: Future<Output = StorageResult<ObjectMeta>>,
    {
        let mut attempt = 0;
        let mut last_error = String::new();
        while attempt < self.policy.max_attempts {
            attempt += 1;
            match put().await {
                Ok(meta) => {
                    return TransferOutcome::Transferred { etag: meta.etag, size: meta.size, attempts: attempt };
                },
                Err(e) => {
                    last_error = e.to_string();
                    if !e.is_retryable() {
                        tracing::debug!(remote, error = ?e, "upload failed permanently");
                        break;
                    }
                    if attempt == self.policy.max_attempts {
                        break;
                    }
                    let delay = self.policy.backoff.delay(attempt);
                    tracing::debug!(remote, attempt, ?delay, error = %last_error, "upload failed, retrying");
                    if let Err(e) = self.store.reconnect().await {
                        tracing::warn!(error = ?e, "reconnect failed");
                    }
                    tokio::time::sleep(delay).await;
                },
            }
        }
        TransferOutcome::Failed { attempts: attempt, reason: last_error }
    }
}

//! Filling a job table from a directory tree.

use crate::error::{ErrorKind, Result};
use async_stream::stream;
use exn::ResultExt;
use futures::{Stream, StreamExt};
use std::path::{Path, PathBuf};
use std::pin::pin;
use stow_jobs::{JobStore, TableName};
use tokio::fs;

/// Rows are inserted in transactions of this many paths.
pub const INSERT_BATCH: usize = 1000;

/// Every regular file under `root`, depth first, sorted by name within each
/// directory.
///
/// Symlinks and special files are skipped, as are paths that are not valid
/// UTF-8 (job tables store paths as text). Failing to read `root` itself is
/// an error; an unreadable directory further down is logged and skipped so
/// one bad mount point doesn't sink a multi-million file walk.
pub fn walk(root: impl Into<PathBuf>) -> impl Stream<Item = Result<PathBuf>> {
    let root = root.into();
    let mut stack = vec![root.clone()];

    stream! {
        'dirs: while let Some(current) = stack.pop() {
            let mut entries = match fs::read_dir(&current).await {
                Ok(entries) => entries,
                Err(e) if current == root => {
                    yield Err(exn::Exn::from(e).raise(ErrorKind::Prepare(current)));
                    return;
                },
                Err(e) => {
                    tracing::warn!(dir = %current.display(), error = %e, "skipping unreadable directory");
                    continue 'dirs;
                },
            };

            let mut files = Vec::new();
            let mut dirs = Vec::new();
            'entries: loop {
                let entry = match entries.next_entry().await {
                    Ok(Some(entry)) => entry,
                    Ok(None) => break 'entries,
                    Err(e) => {
                        tracing::warn!(dir = %current.display(), error = %e, "skipping rest of unreadable directory");
                        break 'entries;
                    },
                };
                let path = entry.path();
                if path.to_str().is_none() {
                    tracing::warn!(path = %path.display(), "skipping path that is not valid UTF-8");
                    continue 'entries;
                }
                // `file_type` does not follow symlinks.
                match entry.file_type().await {
                    Ok(kind) if kind.is_file() => files.push(path),
                    Ok(kind) if kind.is_dir() => dirs.push(path),
                    Ok(_) => tracing::debug!(path = %path.display(), "skipping non-regular file"),
                    Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping unreadable entry"),
                }
            }

            files.sort();
            for file in files {
                yield Ok(file);
            }
            // Reversed so the stack pops them in name order.
            dirs.sort_by(|a, b| b.cmp(a));
            stack.extend(dirs);
        }
    }
}

/// Create `table` and insert a pending job for every file under `root`.
///
/// Fails without touching anything if `root` is not a directory, or with
/// [`JobStore`](ErrorKind::JobStore) if the table already exists.
#[tracing::instrument(skip(jobs, root), fields(root = %root.display()))]
pub async fn prepare(jobs: &dyn JobStore, table: &TableName, root: &Path) -> Result<u64> {
    let not_a_dir = || ErrorKind::Prepare(root.to_path_buf());
    if !fs::metadata(root).await.or_raise(not_a_dir)?.is_dir() {
        exn::bail!(not_a_dir());
    }
    jobs.create_table(table).await.or_raise(|| ErrorKind::JobStore)?;

    let mut paths = pin!(walk(root));
    let mut batch = Vec::with_capacity(INSERT_BATCH);
    let mut inserted = 0;
    while let Some(path) = paths.next().await {
        batch.push(path?);
        if batch.len() == INSERT_BATCH {
            inserted += jobs.insert_paths(table, &batch).await.or_raise(|| ErrorKind::JobStore)?;
            tracing::debug!(inserted, "inserted batch");
            batch.clear();
        }
    }
    if !batch.is_empty() {
        inserted += jobs.insert_paths(table, &batch).await.or_raise(|| ErrorKind::JobStore)?;
    }
    tracing::info!(inserted, "job table prepared");
    Ok(inserted)
}

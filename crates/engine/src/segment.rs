//! Splitting large files into fixed-size segment files.

use crate::error::{ErrorKind, Result};
use crate::naming::{index_width, segment_name};
use exn::{OptionExt, ResultExt};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// One byte range of a segmented file, staged as its own temp file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Segment {
    /// Zero-based position; segment order is byte order.
    pub index: usize,
    pub offset: u64,
    pub length: u64,
    pub path: PathBuf,
}

/// Number of segments a file of `size` bytes splits into.
pub fn segment_count(size: u64, segment_size: u64) -> usize {
    if segment_size == 0 {
        return 0;
    }
    usize::try_from(size.div_ceil(segment_size)).unwrap_or(usize::MAX)
}

/// Split `source` into `segment_size`-byte files inside `dir`.
///
/// `dir` is created if needed. Segment files are named
/// `{file name}-{index}`, zero-padded so that name order is index order. Only
/// the last segment may be shorter than `segment_size`.
#[tracing::instrument(level = "debug", skip(dir), fields(dir = %dir.display()))]
pub async fn split(source: &Path, dir: &Path, segment_size: u64) -> Result<Vec<Segment>> {
    let failed = || ErrorKind::Segment(source.to_path_buf());
    if segment_size == 0 {
        exn::bail!(failed());
    }
    let file_name = source.file_name().and_then(|n| n.to_str()).ok_or_raise(failed)?;
    fs::create_dir_all(dir).await.or_raise(failed)?;

    let mut reader = fs::File::open(source).await.or_raise(failed)?;
    let size = reader.metadata().await.or_raise(failed)?.len();
    let count = segment_count(size, segment_size);
    let width = index_width(count);

    let mut segments = Vec::with_capacity(count);
    let mut offset = 0u64;
    for index in 0..count {
        let length = segment_size.min(size - offset);
        let path = dir.join(segment_name(file_name, index, width));
        let mut writer = fs::File::create(&path).await.or_raise(failed)?;
        let copied = tokio::io::copy(&mut (&mut reader).take(length), &mut writer).await.or_raise(failed)?;
        if copied != length {
            // The file shrank underneath us.
            exn::bail!(failed());
        }
        writer.flush().await.or_raise(failed)?;
        segments.push(Segment { index, offset, length, path });
        offset += length;
    }
    tracing::debug!(count, "split into segments");
    Ok(segments)
}

/// Remove a staging directory and everything in it.
///
/// Never fails: a leftover temp directory is logged, not fatal.
pub async fn purge(dir: &Path) {
    match fs::remove_dir_all(dir).await {
        Ok(()) => {},
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
        Err(e) => tracing::warn!(dir = %dir.display(), error = %e, "could not remove segment staging directory"),
    }
}

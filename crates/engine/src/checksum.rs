//! Deciding whether a local file is already stored remotely.
//!
//! Every check answers "is the remote copy byte-for-byte this file?". A stale
//! remote copy is deleted on the way out so the upload that follows replaces
//! it cleanly. Probe failures are never errors here: when in doubt the answer
//! is "not uploaded", and the upload itself will retry or fail loudly.

use crate::manifest::Manifest;
use crate::naming::{index_width, manifest_name, readme_name, segment_name};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use stow_config::ManifestMode;
use stow_storage::BackendHandle;
use stow_storage::digest::{md5_chunks, md5_file};
use stow_storage::error::ErrorKind as StorageErrorKind;

/// Compares local digests with remote entity tags.
#[derive(Clone)]
pub struct Verifier {
    store: BackendHandle,
}

impl Verifier {
    pub fn new(store: BackendHandle) -> Self {
        Self { store }
    }

    /// `true` if `remote` exists and its ETag equals the MD5 of `local`.
    ///
    /// A mismatching remote object is deleted before returning `false`.
    #[tracing::instrument(level = "debug", skip(self, local), fields(local = %local.display()))]
    pub async fn is_uploaded(&self, local: &Path, remote: &str) -> bool {
        let meta = match self.store.head(remote).await {
            Ok(Some(meta)) => meta,
            Ok(None) => return false,
            Err(e) => {
                tracing::debug!(error = ?e, "probe failed, assuming not uploaded");
                return false;
            },
        };
        let Some(local_md5) = local_md5(local.to_path_buf()).await else {
            return false;
        };
        if meta.etag == local_md5 {
            return true;
        }
        tracing::info!(remote, remote_etag = %meta.etag, %local_md5, "checksum mismatch, replacing remote object");
        self.delete_quietly(remote).await;
        false
    }

    /// Same question for a file stored as segments.
    ///
    /// In [`ManifestMode::Static`] the manifest object is the record of a
    /// finished upload: each listed segment's ETag is compared with the MD5 of
    /// the matching local byte range. In [`ManifestMode::Prefix`] there is no
    /// manifest, so every expected segment is probed, and the readme (written
    /// last) marks completion.
    ///
    /// On mismatch, stale manifest and segment objects are deleted
    /// (best-effort) before returning `false`.
    #[tracing::instrument(level = "debug", skip(self, local), fields(local = %local.display()))]
    pub async fn is_uploaded_segmented(&self, local: &Path, remote: &str, segment_size: u64, mode: ManifestMode) -> bool {
        let Some(chunks) = local_chunks(local.to_path_buf(), segment_size).await else {
            return false;
        };
        let width = index_width(chunks.len());
        let expected: Vec<(String, u64, String)> = chunks
            .into_iter()
            .enumerate()
            .map(|(index, (size, etag))| (segment_name(remote, index, width), size, etag))
            .collect();
        match mode {
            ManifestMode::Static => self.check_manifest(remote, &expected).await,
            ManifestMode::Prefix => self.check_prefix(remote, &expected).await,
        }
    }

    async fn check_manifest(&self, remote: &str, expected: &[(String, u64, String)]) -> bool {
        let manifest_name = manifest_name(remote);
        let manifest = match self.store.get(&manifest_name).await {
            Ok(data) => Manifest::from_json(&data).ok(),
            Err(e) if matches!(&*e, StorageErrorKind::NotFound(_)) => return false,
            Err(e) => {
                tracing::debug!(error = ?e, "manifest probe failed, assuming not uploaded");
                return false;
            },
        };
        let manifest = manifest.unwrap_or_default();
        let matches = manifest.entries.len() == expected.len()
            && manifest
                .entries
                .iter()
                .zip(expected)
                .all(|(entry, (name, size, etag))| &entry.path == name && entry.size_bytes == *size && &entry.etag == etag);
        if matches {
            return true;
        }
        tracing::info!(remote, "segmented upload out of date, replacing");
        let keep: HashSet<(&str, &str)> = expected.iter().map(|(name, _, etag)| (name.as_str(), etag.as_str())).collect();
        for entry in &manifest.entries {
            if !keep.contains(&(entry.path.as_str(), entry.etag.as_str())) {
                self.delete_quietly(&entry.path).await;
            }
        }
        self.delete_quietly(&manifest_name).await;
        false
    }

    async fn check_prefix(&self, remote: &str, expected: &[(String, u64, String)]) -> bool {
        let mut complete = true;
        for (name, _, etag) in expected {
            match self.store.head(name).await {
                Ok(Some(meta)) if &meta.etag == etag => {},
                Ok(Some(_)) => {
                    tracing::info!(remote, segment = %name, "segment checksum mismatch, replacing");
                    self.delete_quietly(name).await;
                    complete = false;
                },
                Ok(None) => complete = false,
                Err(e) => {
                    tracing::debug!(error = ?e, segment = %name, "segment probe failed");
                    complete = false;
                },
            }
        }
        // Without a manifest the prefix is the file, so nothing may follow the
        // last expected segment.
        let trailing = self.prune_segments(remote, expected.len(), index_width(expected.len())).await;
        if trailing > 0 {
            tracing::info!(remote, trailing, "removed segments beyond the end of the file");
            complete = false;
        }
        complete && matches!(self.store.head(&readme_name(remote)).await, Ok(Some(_)))
    }

    /// Deletes a whole object stored at `remote`, left over from before the
    /// file grew past the segmenting limit.
    pub async fn remove_whole(&self, remote: &str) {
        if let Ok(Some(_)) = self.store.head(remote).await {
            tracing::info!(remote, "replacing whole object with segments");
            self.delete_quietly(remote).await;
        }
    }

    /// Deletes what a segmented upload of `remote` left behind: the manifest
    /// and every segment it lists, the readme, and any `{remote}-NNNN` run
    /// starting at index zero.
    pub async fn remove_segmented(&self, remote: &str) {
        let manifest_name = manifest_name(remote);
        if let Ok(data) = self.store.get(&manifest_name).await {
            tracing::info!(remote, "replacing segmented upload with a whole object");
            if let Ok(manifest) = Manifest::from_json(&data) {
                for entry in &manifest.entries {
                    self.delete_quietly(&entry.path).await;
                }
            }
            self.delete_quietly(&manifest_name).await;
        }
        let readme = readme_name(remote);
        if let Ok(Some(_)) = self.store.head(&readme).await {
            self.delete_quietly(&readme).await;
        }
        self.prune_segments(remote, 0, index_width(0)).await;
    }

    /// Deletes `{remote}-NNNN` objects from index `from` upward, stopping at
    /// the first one that is absent. Returns how many were found.
    async fn prune_segments(&self, remote: &str, from: usize, width: usize) -> usize {
        let mut found = 0;
        for index in from.. {
            let name = segment_name(remote, index, width);
            match self.store.head(&name).await {
                Ok(Some(_)) => {
                    self.delete_quietly(&name).await;
                    found += 1;
                },
                Ok(None) => break,
                Err(e) => {
                    tracing::debug!(error = ?e, segment = %name, "segment probe failed");
                    break;
                },
            }
        }
        found
    }

    async fn delete_quietly(&self, name: &str) {
        if let Err(e) = self.store.delete(name).await {
            tracing::warn!(name, error = ?e, "could not delete stale object");
        }
    }
}

/// MD5 of a local file, or `None` if it can't be read.
async fn local_md5(path: PathBuf) -> Option<String> {
    match tokio::task::spawn_blocking(move || md5_file(&path)).await {
        Ok(Ok(digest)) => Some(digest),
        Ok(Err(e)) => {
            tracing::debug!(error = %e, "cannot digest local file");
            None
        },
        Err(e) => {
            tracing::warn!(error = %e, "digest task failed");
            None
        },
    }
}

async fn local_chunks(path: PathBuf, segment_size: u64) -> Option<Vec<(u64, String)>> {
    match tokio::task::spawn_blocking(move || md5_chunks(&path, segment_size)).await {
        Ok(Ok(chunks)) => Some(chunks),
        Ok(Err(e)) => {
            tracing::debug!(error = %e, "cannot digest local file");
            None
        },
        Err(e) => {
            tracing::warn!(error = %e, "digest task failed");
            None
        },
    }
}

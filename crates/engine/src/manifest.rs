//! Manifests describing how a segmented object is put back together.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use serde::{Deserialize, Serialize};

/// One segment as recorded in a manifest.
///
/// Field names follow the static large object manifests of Swift, so a
/// manifest uploaded here can be reused with `multipart-manifest=put`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Segment object name.
    pub path: String,
    pub etag: String,
    pub size_bytes: u64,
}

/// Ordered list of segments; concatenating them in order yields the original.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    pub entries: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn push(&mut self, path: impl Into<String>, etag: impl Into<String>, size_bytes: u64) {
        self.entries.push(ManifestEntry { path: path.into(), etag: etag.into(), size_bytes });
    }

    pub fn total_size(&self) -> u64 {
        self.entries.iter().map(|e| e.size_bytes).sum()
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self).or_raise(|| ErrorKind::Manifest("cannot serialize".to_string()))
    }

    pub fn from_json(data: &[u8]) -> Result<Self> {
        serde_json::from_slice(data).or_raise(|| ErrorKind::Manifest("cannot parse".to_string()))
    }
}

/// Human-readable reassembly instructions uploaded beside the segments.
pub fn readme(remote: &str, segments: &[String]) -> String {
    let base = |name: &str| name.rsplit('/').next().unwrap_or(name).to_string();
    let parts: Vec<String> = segments.iter().map(|s| base(s.as_str())).collect();
    format!(
        "{remote} was too large to store as a single object and was uploaded in {count} segments.\n\
         Download every segment into one directory, then reassemble with:\n\n\
         cat {parts} > {file}\n",
        count = segments.len(),
        parts = parts.join(" "),
        file = base(remote),
    )
}

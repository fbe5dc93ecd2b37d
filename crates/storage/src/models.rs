//! Storage models.

/// Object metadata returned by storage backends.
///
/// Returned by HEAD-style probes and by successful writes, so callers can
/// compare entity tags against local digests without a second round-trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    /// Object name, relative to the container root
    pub name: String,
    /// Object size in bytes
    pub size: u64,
    /// Entity tag as reported by the store, normalized by
    /// [`normalize_etag`](crate::digest::normalize_etag).
    pub etag: String,
}
impl ObjectMeta {
    pub fn new(name: impl Into<String>, size: u64, etag: impl AsRef<str>) -> Self {
        Self {
            name: name.into(),
            size,
            etag: crate::digest::normalize_etag(etag.as_ref()),
        }
    }
}

//! Object names derived from local paths.

use crate::error::{ErrorKind, Result};
use exn::{OptionExt, ResultExt};
use std::path::Path;
use stow_storage::validate_name;

/// Segment indices are zero-padded to at least this many digits.
const MIN_INDEX_WIDTH: usize = 4;

/// Object name for a local file.
///
/// With a `cutoff`, everything up to and including its *last* occurrence is
/// dropped (a path not containing it is kept whole). Leading `./` and `/` are
/// then removed so the directory structure is kept under the container.
///
/// ```
/// use std::path::Path;
/// use stow_engine::naming::remote_name;
///
/// let path = Path::new("/mnt/drive7/archive/2016/scan.tif");
/// assert_eq!(remote_name(path, Some("drive7/")).unwrap(), "archive/2016/scan.tif");
/// assert_eq!(remote_name(path, None).unwrap(), "mnt/drive7/archive/2016/scan.tif");
/// ```
pub fn remote_name(path: &Path, cutoff: Option<&str>) -> Result<String> {
    let full = path.to_str().ok_or_raise(|| ErrorKind::Naming(path.to_path_buf()))?;
    let mut name = match cutoff.filter(|c| !c.is_empty()) {
        Some(cutoff) => full.rsplit(cutoff).next().unwrap_or(full),
        None => full,
    };
    loop {
        if let Some(rest) = name.strip_prefix("./") {
            name = rest;
        } else if let Some(rest) = name.strip_prefix('/') {
            name = rest;
        } else {
            break;
        }
    }
    validate_name(name).or_raise(|| ErrorKind::Naming(path.to_path_buf()))
}

/// Digits needed so that lexicographic order of `count` indices equals
/// numeric order.
pub fn index_width(count: usize) -> usize {
    let largest = count.saturating_sub(1);
    largest.checked_ilog10().map_or(1, |digits| digits as usize + 1).max(MIN_INDEX_WIDTH)
}

/// `{base}-{index}` with the index zero-padded to `width`.
pub fn segment_name(base: &str, index: usize, width: usize) -> String {
    format!("{base}-{index:0width$}")
}

pub fn manifest_name(remote: &str) -> String {
    format!("{remote}.manifest.json")
}

pub fn readme_name(remote: &str) -> String {
    format!("{remote}.README.txt")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("/data/a/b.tif", None, "data/a/b.tif")]
    #[case("./a/b.tif", None, "a/b.tif")]
    #[case(".//a/b.tif", None, "a/b.tif")]
    #[case("/mnt/disk1/a/b.tif", Some("disk1"), "a/b.tif")]
    #[case("/mnt/disk1/a/disk1/b.tif", Some("disk1"), "b.tif")]
    #[case("/mnt/disk1/a/b.tif", Some("nowhere"), "mnt/disk1/a/b.tif")]
    #[case("/mnt/disk1/a/b.tif", Some(""), "mnt/disk1/a/b.tif")]
    #[case("/mnt/./disk1/a/b.tif", Some("/mnt/."), "disk1/a/b.tif")]
    fn test_remote_name(#[case] path: &str, #[case] cutoff: Option<&str>, #[case] expected: &str) {
        assert_eq!(remote_name(Path::new(path), cutoff).unwrap(), expected);
    }

    #[rstest]
    #[case("/", None)]
    #[case("./", None)]
    #[case("/data/a.tif", Some("a.tif"))]
    #[case("/data/../../etc/passwd", None)]
    fn test_remote_name_rejected(#[case] path: &str, #[case] cutoff: Option<&str>) {
        let err = remote_name(Path::new(path), cutoff).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Naming(_)));
    }

    #[rstest]
    #[case(1, 4)]
    #[case(10, 4)]
    #[case(10_000, 4)]
    #[case(10_001, 5)]
    #[case(123_456, 6)]
    fn test_index_width(#[case] count: usize, #[case] expected: usize) {
        assert_eq!(index_width(count), expected);
    }

    #[test]
    fn test_segment_names_sort_in_index_order() {
        let width = index_width(12_000);
        let mut names: Vec<String> = (0..12_000).map(|i| segment_name("big.iso", i, width)).collect();
        let in_order = names.clone();
        names.sort();
        assert_eq!(names, in_order);
        assert_eq!(in_order[7], "big.iso-00007");
    }

    #[test]
    fn test_sidecar_names() {
        assert_eq!(manifest_name("a/big.iso"), "a/big.iso.manifest.json");
        assert_eq!(readme_name("a/big.iso"), "a/big.iso.README.txt");
    }
}

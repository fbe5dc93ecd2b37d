//! Object name validation.
//!
//! Object stores are flat, but the names we give them look like paths. This
//! module makes sure those names can't escape the container (no `..`
//! traversal) and are spelled consistently.

use std::path::{Component, Path};

use crate::error::{ErrorKind, Result};

/// Validates an object name for security and correctness, returning it in
/// normalized form (`/`-separated, no leading slash, no `.` components).
///
/// > **Note:** Non-UTF8 names are rejected: every backend keys objects by
/// >           string.
///
/// # Examples
///
/// ```
/// use stow_storage::validate_name;
/// // Valid names
/// assert!(validate_name("archive/2016/scan.tif").is_ok());
/// assert!(validate_name("a/../file.tif").is_ok()); // (never leaves container root)
/// // Invalid names
/// assert!(validate_name("../etc/passwd").is_err());
/// assert!(validate_name("a/../../b").is_err());
/// assert!(validate_name("a\0b").is_err());
/// // Names get resolved
/// assert_eq!(validate_name("/wrong/../correct//./scan.tif/").unwrap(), "correct/scan.tif");
/// ```
pub fn validate(name: impl AsRef<Path>) -> Result<String> {
    let name = name.as_ref();
    let invalid = || ErrorKind::InvalidName(name.to_string_lossy().into_owned());
    let mut components = Vec::new();
    for component in name.components() {
        match component {
            Component::Normal(s) => {
                // Null bytes pass through Path::components() on Unix but cause
                // truncation in C-based syscalls, so reject them explicitly.
                if s.as_encoded_bytes().contains(&0) {
                    exn::bail!(invalid());
                }
                let Some(s) = s.to_str() else {
                    exn::bail!(invalid());
                };
                components.push(s)
            },
            Component::CurDir | Component::RootDir => {},
            Component::Prefix(_) => exn::bail!(invalid()),
            Component::ParentDir => {
                if components.pop().is_none() {
                    exn::bail!(invalid());
                }
            },
        }
    }
    match components.is_empty() {
        true => exn::bail!(invalid()),
        false => Ok(components.join("/")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names() {
        assert_eq!(validate("archive/scan.tif").unwrap(), "archive/scan.tif");
        assert_eq!(validate("a/b/c/file.tif").unwrap(), "a/b/c/file.tif");
        assert_eq!(validate("simple.tif").unwrap(), "simple.tif");
    }

    #[test]
    fn test_name_normalization() {
        assert_eq!(validate("a//b//c").unwrap(), "a/b/c");
        assert_eq!(validate("a/./b/./c").unwrap(), "a/b/c");
        assert_eq!(validate("/leading/slash").unwrap(), "leading/slash");
        assert_eq!(validate("./dot/slash").unwrap(), "dot/slash");
    }

    #[test]
    fn test_traversal_attempts() {
        assert!(validate("../etc/passwd").is_err());
        assert!(validate("a/../../b").is_err());
        assert!(validate("..").is_err());
        assert!(validate("../..").is_err());
    }

    #[test]
    fn test_reverse_attempts() {
        assert_eq!(validate("a/b/..").unwrap(), "a");
    }

    #[test]
    fn test_invalid_characters() {
        assert!(validate("a\0b").is_err());
        assert!(validate("\0").is_err());
    }

    #[test]
    fn test_empty_names() {
        assert!(validate("").is_err());
        assert!(validate(".").is_err());
        assert!(validate("./").is_err());
        assert!(validate("//").is_err());
    }

    #[test]
    fn test_invalid_name_error_kind() {
        let err = validate("../escape").unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidName(name) if name == "../escape"));
    }
}

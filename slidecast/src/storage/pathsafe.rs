//! Path resolution guarded against directory traversal.
//!
//! Every externally supplied identifier that participates in a filesystem
//! path must pass [`is_valid_identifier`] before [`resolve`] is called, and
//! [`resolve`] itself re-checks the real (symlink-resolved) path against the
//! base directory.

use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::{Error, Result};

/// Check that an externally supplied identifier is a canonical hyphenated
/// UUID (`8-4-4-4-12` hex groups). Braced, URN, and compact forms are
/// rejected even though they parse as UUIDs.
pub fn is_valid_identifier(s: &str) -> bool {
    let bytes = s.as_bytes();
    if bytes.len() != 36 {
        return false;
    }
    if bytes[8] != b'-' || bytes[13] != b'-' || bytes[18] != b'-' || bytes[23] != b'-' {
        return false;
    }
    Uuid::try_parse(s).is_ok()
}

/// Resolve `segments` under `base_dir`, failing with a path violation if the
/// resolved path escapes the base directory.
///
/// The comparison runs on filesystem real paths, not string prefixes, so
/// both `..` traversal and symlink escapes are caught. The final segment may
/// name a file that does not exist yet; everything above it must exist.
pub fn resolve<I, S>(base_dir: &Path, segments: I) -> Result<PathBuf>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let base_real = base_dir
        .canonicalize()
        .map_err(|e| Error::Io(std::io::Error::new(e.kind(), format!("{}: {}", base_dir.display(), e))))?;

    let mut joined = base_real.clone();
    for segment in segments {
        joined.push(segment.as_ref());
    }

    let real = if joined.exists() {
        joined.canonicalize()?
    } else {
        // Not-yet-created target: resolve the parent and re-append the name.
        let parent = joined
            .parent()
            .ok_or_else(|| Error::path_violation(&joined))?;
        let file_name = joined
            .file_name()
            .ok_or_else(|| Error::path_violation(&joined))?;
        let parent_real = parent
            .canonicalize()
            .map_err(|_| Error::path_violation(&joined))?;
        parent_real.join(file_name)
    };

    if !real.starts_with(&base_real) {
        return Err(Error::path_violation(real));
    }

    Ok(real)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_identifier() {
        assert!(is_valid_identifier("c7b0e0a0-9d6b-4c46-8e7a-1f2d3c4b5a69"));
        assert!(is_valid_identifier(&Uuid::new_v4().to_string()));
    }

    #[test]
    fn test_invalid_identifiers() {
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier("not-a-uuid"));
        assert!(!is_valid_identifier("../../../etc/passwd"));
        // compact and braced forms parse as UUIDs but are not canonical
        assert!(!is_valid_identifier("c7b0e0a09d6b4c468e7a1f2d3c4b5a69"));
        assert!(!is_valid_identifier("{c7b0e0a0-9d6b-4c46-8e7a-1f2d3c4b5a69}"));
    }

    #[test]
    fn test_resolve_inside_base() {
        let dir = tempfile::tempdir().unwrap();
        let id = Uuid::new_v4().to_string();
        let resolved = resolve(dir.path(), [id.as_str()]).unwrap();
        assert!(resolved.starts_with(dir.path().canonicalize().unwrap()));
        assert!(resolved.ends_with(&id));
    }

    #[test]
    fn test_resolve_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve(dir.path(), ["..", "..", "etc", "passwd"]).unwrap_err();
        assert!(matches!(err, Error::PathViolation { .. }));
    }

    #[test]
    fn test_resolve_rejects_absolute_segment() {
        let dir = tempfile::tempdir().unwrap();
        // An absolute segment replaces the joined path entirely.
        let result = resolve(dir.path(), ["/etc/passwd"]);
        assert!(matches!(result, Err(Error::PathViolation { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_rejects_symlink_escape() {
        let outside = tempfile::tempdir().unwrap();
        let base = tempfile::tempdir().unwrap();
        let link = base.path().join("link");
        std::os::unix::fs::symlink(outside.path(), &link).unwrap();

        let err = resolve(base.path(), ["link", "file.bin"]).unwrap_err();
        assert!(matches!(err, Error::PathViolation { .. }));
    }

    #[test]
    fn test_resolve_allows_missing_leaf() {
        let dir = tempfile::tempdir().unwrap();
        let resolved = resolve(dir.path(), ["new-file.mp4"]).unwrap();
        assert!(resolved.starts_with(dir.path().canonicalize().unwrap()));
    }
}

// src/paths.rs

//! Path sanitization for untrusted archive entries
//!
//! Archive entries come from untrusted sources and may be engineered
//! to write outside the extraction root ("breakout paths"). Every
//! entry path is normalized through this module before anything is
//! written to disk.

use crate::error::{Error, Result};
use std::path::{Component, Path, PathBuf};

/// Sanitize a relative path from an untrusted source
///
/// Rejects `..` components and Windows prefixes, strips leading
/// slashes and `.` components, and rejects paths that are empty after
/// normalization.
///
/// # Security
///
/// This is the security-critical breakout check. Malicious archives
/// attempt entries like:
/// - `../../../etc/passwd`
/// - `/etc/passwd`
/// - `foo/../../bar`
///
/// # Examples
///
/// ```
/// use feedforge::paths::sanitize_entry_path;
/// use std::path::PathBuf;
///
/// assert_eq!(
///     sanitize_entry_path("bin/app").unwrap(),
///     PathBuf::from("bin/app")
/// );
/// assert_eq!(
///     sanitize_entry_path("/bin/app").unwrap(),
///     PathBuf::from("bin/app")
/// );
/// assert!(sanitize_entry_path("../etc/passwd").is_err());
/// ```
pub fn sanitize_entry_path(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    let path_str = path.to_string_lossy();

    // Strip leading slashes to make relative
    let relative = path_str.trim_start_matches('/');

    let mut normalized = PathBuf::new();

    for component in Path::new(relative).components() {
        match component {
            Component::Normal(c) => {
                normalized.push(c);
            }
            Component::CurDir => {
                // "." - skip it
            }
            Component::ParentDir => {
                return Err(Error::BreakoutPath(path_str.to_string()));
            }
            Component::Prefix(_) | Component::RootDir => {
                // Windows prefixes and root markers are stripped
            }
        }
    }

    if normalized.as_os_str().is_empty() {
        return Err(Error::InvalidPath(
            "empty path after normalization".to_string(),
        ));
    }

    Ok(normalized)
}

/// Whether a user-supplied subpath would escape its root
///
/// Used for extract-subpath selection, where "." and "" legitimately
/// mean "the whole tree" and must not be rejected.
pub fn is_breakout_path(path: &str) -> bool {
    if path.is_empty() || path == "." {
        return false;
    }
    sanitize_entry_path(path).is_err()
}

/// Safely join an extraction root with an untrusted entry path
///
/// Sanitizes the entry path first, then verifies the joined result
/// still starts with the root.
pub fn safe_join(root: impl AsRef<Path>, path: impl AsRef<Path>) -> Result<PathBuf> {
    let root = root.as_ref();
    let sanitized = sanitize_entry_path(path.as_ref())?;
    let joined = root.join(&sanitized);

    if !joined.starts_with(root) {
        return Err(Error::BreakoutPath(format!(
            "{} escapes {}",
            joined.display(),
            root.display()
        )));
    }

    Ok(joined)
}

/// Validate a symlink target relative to the entry that carries it
///
/// A link target may be relative to the entry's parent directory; the
/// resolved location must stay inside the extraction root. Absolute
/// targets are always rejected.
pub fn validate_link_target(entry_rel: &Path, target: &Path) -> Result<()> {
    if target.is_absolute() {
        return Err(Error::BreakoutPath(format!(
            "{} -> {}",
            entry_rel.display(),
            target.display()
        )));
    }

    // Resolve the target against the entry's parent, counting depth
    let mut depth: i32 = entry_rel.components().count() as i32 - 1;
    for component in target.components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::ParentDir => {
                depth -= 1;
                if depth < 0 {
                    return Err(Error::BreakoutPath(format!(
                        "{} -> {}",
                        entry_rel.display(),
                        target.display()
                    )));
                }
            }
            Component::CurDir => {}
            Component::Prefix(_) | Component::RootDir => {
                return Err(Error::BreakoutPath(format!(
                    "{} -> {}",
                    entry_rel.display(),
                    target.display()
                )));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_normal() {
        assert_eq!(
            sanitize_entry_path("bin/app").unwrap(),
            PathBuf::from("bin/app")
        );
        assert_eq!(
            sanitize_entry_path("lib/libfoo.so").unwrap(),
            PathBuf::from("lib/libfoo.so")
        );
    }

    #[test]
    fn test_sanitize_leading_slash() {
        assert_eq!(
            sanitize_entry_path("/bin/app").unwrap(),
            PathBuf::from("bin/app")
        );
        assert_eq!(
            sanitize_entry_path("///bin/app").unwrap(),
            PathBuf::from("bin/app")
        );
    }

    #[test]
    fn test_sanitize_dot_components() {
        assert_eq!(
            sanitize_entry_path("./bin/app").unwrap(),
            PathBuf::from("bin/app")
        );
        assert_eq!(
            sanitize_entry_path("bin/./app").unwrap(),
            PathBuf::from("bin/app")
        );
    }

    #[test]
    fn test_sanitize_traversal_rejected() {
        assert!(matches!(
            sanitize_entry_path(".."),
            Err(Error::BreakoutPath(_))
        ));
        assert!(matches!(
            sanitize_entry_path("../etc/passwd"),
            Err(Error::BreakoutPath(_))
        ));
        assert!(matches!(
            sanitize_entry_path("bin/../../../etc/passwd"),
            Err(Error::BreakoutPath(_))
        ));
        assert!(matches!(
            sanitize_entry_path("/bin/../etc/passwd"),
            Err(Error::BreakoutPath(_))
        ));
    }

    #[test]
    fn test_sanitize_empty_rejected() {
        assert!(matches!(sanitize_entry_path(""), Err(Error::InvalidPath(_))));
        assert!(matches!(
            sanitize_entry_path("/"),
            Err(Error::InvalidPath(_))
        ));
        assert!(matches!(
            sanitize_entry_path("./"),
            Err(Error::InvalidPath(_))
        ));
    }

    #[test]
    fn test_is_breakout_path() {
        assert!(!is_breakout_path(""));
        assert!(!is_breakout_path("."));
        assert!(!is_breakout_path("subdir/inner"));
        assert!(is_breakout_path(".."));
        assert!(is_breakout_path("../sibling"));
        assert!(is_breakout_path("a/../../b"));
    }

    #[test]
    fn test_safe_join() {
        let root = PathBuf::from("/tmp/extract");
        assert_eq!(
            safe_join(&root, "bin/app").unwrap(),
            PathBuf::from("/tmp/extract/bin/app")
        );
        assert!(safe_join(&root, "../etc/passwd").is_err());
    }

    #[test]
    fn test_link_target_inside_root() {
        assert!(validate_link_target(Path::new("bin/app"), Path::new("app-1.0")).is_ok());
        assert!(validate_link_target(Path::new("bin/app"), Path::new("../lib/libx.so")).is_ok());
    }

    #[test]
    fn test_link_target_escape_rejected() {
        assert!(matches!(
            validate_link_target(Path::new("app"), Path::new("../../etc/passwd")),
            Err(Error::BreakoutPath(_))
        ));
        assert!(matches!(
            validate_link_target(Path::new("bin/app"), Path::new("/etc/passwd")),
            Err(Error::BreakoutPath(_))
        ));
    }
}

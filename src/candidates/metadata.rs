// src/candidates/metadata.rs

//! Best-effort candidate metadata
//!
//! Name and version come from the file stem (`myapp-1.2.3` style);
//! icons come from sidecar `.ico`/`.png` resources next to the
//! executable. Metadata failures downgrade to "absent" — except that
//! only genuine decoder failures are caught as such, so programming
//! errors are not masked as "no icon available".

use super::Candidate;
use regex::Regex;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;

/// Icon mime type for Windows icons
pub const MIME_ICO: &str = "image/vnd.microsoft.icon";
/// Icon mime type for PNG images
pub const MIME_PNG: &str = "image/png";

/// Errors during metadata extraction
#[derive(Error, Debug)]
pub enum MetadataError {
    /// The icon resource exists but its bytes are not a decodable icon
    #[error("icon decode failed: {0}")]
    IconDecode(String),

    /// I/O trouble reading the resource; not a decode failure and
    /// must not be swallowed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A resolvable icon resource for a candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IconResource {
    /// Absolute path of the icon file
    pub path: PathBuf,
    pub mime_type: &'static str,
}

fn version_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)[-_v](\d+(?:\.\d+)+)$").expect("version pattern is valid")
    })
}

/// Fill in name and version inferred from the candidate's file name
///
/// `myapp-1.2.3` yields name `myapp`, version `1.2.3`. Names without
/// a version part are kept whole. A purely numeric "extension" is
/// part of the version, not an extension.
pub fn infer_name_version(candidate: &mut Candidate) {
    let file_name = match candidate.relative_path.file_name().and_then(|s| s.to_str()) {
        Some(name) if !name.is_empty() => name,
        _ => return,
    };

    let stem = match file_name.rsplit_once('.') {
        Some((stem, extension))
            if !stem.is_empty() && !extension.chars().all(|c| c.is_ascii_digit()) =>
        {
            stem
        }
        _ => file_name,
    };

    if let Some(captures) = version_pattern().captures(stem) {
        let matched = captures.get(0).expect("whole match exists");
        candidate.version = captures.get(1).map(|m| m.as_str().to_string());
        let name = stem[..matched.start()].trim_end_matches(['-', '_']);
        candidate.name = if name.is_empty() {
            Some(stem.to_string())
        } else {
            Some(name.to_string())
        };
    } else {
        candidate.name = Some(stem.to_string());
    }
}

/// Probe for a sidecar icon next to an executable
///
/// Looks for `<stem>.ico` then `<stem>.png`. A present resource with
/// the wrong magic is an `IconDecode` error (the caller downgrades it
/// to "no icon"); a missing resource is simply `None`.
pub fn probe_icon(executable: &Path) -> Result<Option<IconResource>, MetadataError> {
    let stem = match executable.file_stem() {
        Some(stem) => stem,
        None => return Ok(None),
    };
    let parent = executable.parent().unwrap_or_else(|| Path::new(""));

    for (extension, mime_type, magic) in [
        ("ico", MIME_ICO, &[0x00u8, 0x00, 0x01, 0x00][..]),
        ("png", MIME_PNG, &[0x89u8, b'P', b'N', b'G'][..]),
    ] {
        let sidecar = parent.join(format!("{}.{}", stem.to_string_lossy(), extension));
        if !sidecar.exists() {
            continue;
        }

        let mut header = [0u8; 4];
        let n = File::open(&sidecar)?.read(&mut header)?;
        if n < 4 || header[..] != *magic {
            return Err(MetadataError::IconDecode(format!(
                "{} does not start with a valid {} header",
                sidecar.display(),
                extension
            )));
        }

        return Ok(Some(IconResource {
            path: sidecar,
            mime_type,
        }));
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidates::{BinaryFormat, ExecutableKind};
    use std::fs;

    fn candidate(rel: &str) -> Candidate {
        Candidate {
            relative_path: PathBuf::from(rel),
            kind: ExecutableKind::Native(BinaryFormat::Elf),
            name: None,
            version: None,
            summary: None,
            icon: None,
        }
    }

    #[test]
    fn test_infer_name_and_version() {
        let mut c = candidate("bin/myapp-1.2.3");
        infer_name_version(&mut c);
        assert_eq!(c.name.as_deref(), Some("myapp"));
        assert_eq!(c.version.as_deref(), Some("1.2.3"));
    }

    #[test]
    fn test_infer_version_with_v_prefix() {
        let mut c = candidate("tool_v2.10");
        infer_name_version(&mut c);
        assert_eq!(c.name.as_deref(), Some("tool"));
        assert_eq!(c.version.as_deref(), Some("2.10"));
    }

    #[test]
    fn test_plain_stem_keeps_name_only() {
        let mut c = candidate("frobnicator.exe");
        infer_name_version(&mut c);
        assert_eq!(c.name.as_deref(), Some("frobnicator"));
        assert_eq!(c.version, None);
    }

    #[test]
    fn test_single_number_is_not_a_version() {
        let mut c = candidate("app-2");
        infer_name_version(&mut c);
        assert_eq!(c.name.as_deref(), Some("app-2"));
        assert_eq!(c.version, None);
    }

    #[test]
    fn test_probe_missing_icon() {
        let dir = tempfile::TempDir::new().unwrap();
        let exe = dir.path().join("app.exe");
        fs::write(&exe, b"MZ").unwrap();

        assert_eq!(probe_icon(&exe).unwrap(), None);
    }

    #[test]
    fn test_probe_valid_ico() {
        let dir = tempfile::TempDir::new().unwrap();
        let exe = dir.path().join("app.exe");
        fs::write(&exe, b"MZ").unwrap();
        fs::write(dir.path().join("app.ico"), [0x00, 0x00, 0x01, 0x00, 0x01, 0x00]).unwrap();

        let icon = probe_icon(&exe).unwrap().unwrap();
        assert_eq!(icon.mime_type, MIME_ICO);
        assert_eq!(icon.path.file_name().unwrap(), "app.ico");
    }

    #[test]
    fn test_probe_corrupt_icon_is_decode_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let exe = dir.path().join("app.exe");
        fs::write(&exe, b"MZ").unwrap();
        fs::write(dir.path().join("app.ico"), b"garbage bytes").unwrap();

        let err = probe_icon(&exe).unwrap_err();
        assert!(matches!(err, MetadataError::IconDecode(_)));
    }
}

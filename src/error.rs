// src/error.rs

//! Crate-wide error type and result alias
//!
//! Every pipeline stage reports one of these classified errors; the
//! crate never retries on its own. `Cancelled` is always recoverable
//! at a session boundary — the caller may retry the same stage from a
//! clean pre-stage state.

use std::path::Path;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Network-level failure (DNS, connection, stream read)
    #[error("transport failure: {0}")]
    Transport(String),

    /// Non-success HTTP response
    #[error("server returned HTTP {status} for {url}")]
    HttpStatus { status: u16, url: String },

    /// Filesystem permission failure; a single unreadable file fails
    /// the whole enumeration, since a partial snapshot would corrupt
    /// the diff
    #[error("access denied: {0}")]
    Access(String),

    /// Archive entry path resolves outside the extraction root
    #[error("archive entry escapes extraction root: {0}")]
    BreakoutPath(String),

    /// Path is malformed (empty, separator-only) without being a
    /// traversal attempt
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// File is not a recognized archive container or declared format
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Session operation invoked in the wrong state
    #[error("invalid session state: expected {expected}, found {found}")]
    InvalidSessionState {
        expected: &'static str,
        found: &'static str,
    },

    /// Snapshot diff produced no added or modified paths
    #[error("nothing captured: no files were added or modified under {0}")]
    EmptyDiff(String),

    /// Candidate detection found no runnable entry points
    #[error("no entry points found in implementation directory")]
    NoEntryPoints,

    /// Implementation directory contains zero files
    #[error("implementation directory is empty, nothing to ship")]
    EmptyDigest,

    /// Feed assembly is missing a mandatory ingredient
    #[error("feed is incomplete: {0}")]
    IncompleteFeed(String),

    /// Secret key reference could not be resolved
    #[error("secret key not found: {0}")]
    KeyNotFound(String),

    /// Signing backend reported a failure
    #[error("signing failed: {0}")]
    SigningBackend(String),

    /// Installer process failed or timed out
    #[error("installer failed: {0}")]
    Installer(String),

    /// Cooperative cancellation was requested by the caller
    #[error("operation cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(String),
}

impl Error {
    /// Classify an I/O error raised while touching `path`.
    ///
    /// Permission problems become `Access` so callers can distinguish
    /// "fix your privileges" from transient I/O trouble.
    pub fn from_io(path: &Path, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::PermissionDenied {
            Error::Access(format!("{}: {}", path.display(), err))
        } else {
            Error::Io(err)
        }
    }

    /// Whether the caller may retry the failed stage from a clean state
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Cancelled | Error::EmptyDiff(_) | Error::NoEntryPoints | Error::EmptyDigest
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_denied_maps_to_access() {
        let err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let classified = Error::from_io(Path::new("/opt/app"), err);
        assert!(matches!(classified, Error::Access(_)));
    }

    #[test]
    fn test_other_io_stays_io() {
        let err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let classified = Error::from_io(Path::new("/opt/app"), err);
        assert!(matches!(classified, Error::Io(_)));
    }

    #[test]
    fn test_recoverable_classification() {
        assert!(Error::Cancelled.is_recoverable());
        assert!(Error::EmptyDiff("/tmp".to_string()).is_recoverable());
        assert!(!Error::BreakoutPath("../etc".to_string()).is_recoverable());
    }
}

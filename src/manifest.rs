// src/manifest.rs

//! Content-addressable manifest digests
//!
//! An implementation directory is serialized into a canonical text
//! manifest — one line per node, sorted, depth-first — and the digest
//! is a hash over that text. Identical directory content always
//! yields the identical digest: no mtimes, no owners, no dependence
//! on filesystem traversal order.
//!
//! Line format:
//! - `D /relative/dir` — directory (omitted when it has no file
//!   descendants, so a tree with zero files serializes to the empty
//!   manifest)
//! - `F <fingerprint> <size> <name>` — regular file
//! - `X <fingerprint> <size> <name>` — executable file
//! - `S <fingerprint> <size> <name>` — symlink (fingerprint of the
//!   target string)
//!
//! The current digest uses SHA-256; a SHA-1 variant is computed in
//! the same traversal for legacy consumers.

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::hash::{hash_bytes, Hash, HashAlgorithm, Hasher};
use crate::progress::ProgressTracker;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Content-addressable identifier of an implementation directory
///
/// Carries the current digest plus the legacy variant, both computed
/// over the same canonical manifest serialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestDigest {
    /// Current digest (SHA-256 over the canonical manifest)
    pub sha256: String,
    /// Legacy digest (SHA-1 over the canonical manifest)
    pub sha1: String,
}

impl ManifestDigest {
    /// The well-defined digest of a directory containing zero files
    ///
    /// Callers must treat this as "nothing to ship" and reject it
    /// before building a feed.
    pub fn empty() -> Self {
        Self {
            sha256: hash_bytes(HashAlgorithm::Sha256, b"").value,
            sha1: hash_bytes(HashAlgorithm::Sha1, b"").value,
        }
    }

    /// Whether this is the empty-sentinel digest
    pub fn is_empty_sentinel(&self) -> bool {
        *self == Self::empty()
    }

    /// Prefixed form of the current digest
    pub fn to_prefixed_string(&self) -> String {
        Hash {
            algorithm: HashAlgorithm::Sha256,
            value: self.sha256.clone(),
        }
        .to_prefixed_string()
    }
}

impl std::fmt::Display for ManifestDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_prefixed_string())
    }
}

/// Compute the manifest digest of an implementation directory
pub fn compute_digest(
    implementation_dir: &Path,
    cancel: &CancelToken,
    progress: &dyn ProgressTracker,
) -> Result<ManifestDigest> {
    let mut manifest_sha256 = String::new();
    let mut manifest_sha1 = String::new();

    serialize_dir(
        implementation_dir,
        Path::new(""),
        &mut manifest_sha256,
        &mut manifest_sha1,
        cancel,
        progress,
    )?;

    let digest = ManifestDigest {
        sha256: hash_bytes(HashAlgorithm::Sha256, manifest_sha256.as_bytes()).value,
        sha1: hash_bytes(HashAlgorithm::Sha1, manifest_sha1.as_bytes()).value,
    };
    debug!("Digest of {}: {}", implementation_dir.display(), digest);
    Ok(digest)
}

/// Serialize one directory level, sorted, recursing depth-first
///
/// Returns whether any line was written below this level, so empty
/// directory chains collapse away entirely.
fn serialize_dir(
    abs: &Path,
    rel: &Path,
    out_sha256: &mut String,
    out_sha1: &mut String,
    cancel: &CancelToken,
    progress: &dyn ProgressTracker,
) -> Result<bool> {
    let mut entries: Vec<fs::DirEntry> = fs::read_dir(abs)
        .map_err(|e| Error::from_io(abs, e))?
        .collect::<std::io::Result<_>>()
        .map_err(|e| Error::from_io(abs, e))?;
    entries.sort_by_key(|entry| entry.file_name());

    let mut wrote = false;
    for entry in entries {
        cancel.check()?;

        let name = entry.file_name();
        let name = name.to_string_lossy();
        let path = entry.path();
        let file_type = entry.file_type().map_err(|e| Error::from_io(&path, e))?;

        if file_type.is_symlink() {
            let target = fs::read_link(&path).map_err(|e| Error::from_io(&path, e))?;
            let target = target.to_string_lossy();
            let size = target.len() as u64;
            append_line(
                out_sha256,
                'S',
                &hash_bytes(HashAlgorithm::Sha256, target.as_bytes()),
                size,
                &name,
            );
            append_line(
                out_sha1,
                'S',
                &hash_bytes(HashAlgorithm::Sha1, target.as_bytes()),
                size,
                &name,
            );
            wrote = true;
        } else if file_type.is_file() {
            let (sha256, sha1, size) = fingerprint_file(&path)?;
            let marker = if is_executable(&entry, &path)? { 'X' } else { 'F' };
            append_line(out_sha256, marker, &sha256, size, &name);
            append_line(out_sha1, marker, &sha1, size, &name);
            progress.increment(1);
            wrote = true;
        } else if file_type.is_dir() {
            let child_rel = rel.join(entry.file_name());
            let mut child_sha256 = String::new();
            let mut child_sha1 = String::new();

            let any = serialize_dir(
                &path,
                &child_rel,
                &mut child_sha256,
                &mut child_sha1,
                cancel,
                progress,
            )?;

            if any {
                let slash_path = rel_to_slash(&child_rel);
                out_sha256.push_str(&format!("D /{}\n", slash_path));
                out_sha256.push_str(&child_sha256);
                out_sha1.push_str(&format!("D /{}\n", slash_path));
                out_sha1.push_str(&child_sha1);
                wrote = true;
            }
        }
    }

    Ok(wrote)
}

fn append_line(out: &mut String, marker: char, fingerprint: &Hash, size: u64, name: &str) {
    out.push_str(&format!("{} {} {} {}\n", marker, fingerprint, size, name));
}

/// Stream a file through both hashers at once
fn fingerprint_file(path: &Path) -> Result<(Hash, Hash, u64)> {
    let mut file = File::open(path).map_err(|e| Error::from_io(path, e))?;
    let mut sha256 = Hasher::new(HashAlgorithm::Sha256);
    let mut sha1 = Hasher::new(HashAlgorithm::Sha1);
    let mut size: u64 = 0;
    let mut buffer = [0u8; 8192];

    loop {
        let n = file.read(&mut buffer).map_err(|e| Error::from_io(path, e))?;
        if n == 0 {
            break;
        }
        sha256.update(&buffer[..n]);
        sha1.update(&buffer[..n]);
        size += n as u64;
    }

    Ok((sha256.finalize(), sha1.finalize(), size))
}

#[cfg(unix)]
fn is_executable(entry: &fs::DirEntry, path: &Path) -> Result<bool> {
    use std::os::unix::fs::PermissionsExt;
    let metadata = entry.metadata().map_err(|e| Error::from_io(path, e))?;
    Ok(metadata.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(_entry: &fs::DirEntry, _path: &Path) -> Result<bool> {
    Ok(false)
}

fn rel_to_slash(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

// src/snapshot.rs

//! Filesystem snapshots and diffing
//!
//! A snapshot is a deterministic enumeration of a subtree: relative
//! path, size, executable bit, and a lazily computed content
//! fingerprint per file. Diffing two snapshots yields the paths the
//! installer added or modified.
//!
//! Fingerprints are only computed when a diff actually needs content
//! comparison (equal sizes), so large unchanged files are never
//! hashed. The *before* snapshot of a capture must be pinned
//! ([`Snapshot::pin_fingerprints`]) while disk still matches it —
//! hashing it lazily at diff time would read post-install bytes and
//! miss same-size modifications.

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::hash::{hash_bytes, hash_reader, HashAlgorithm};
use crate::progress::ProgressTracker;
use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::debug;
use walkdir::WalkDir;

/// What a snapshot entry points at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryKind {
    File,
    Symlink,
}

/// One enumerated file or symlink
#[derive(Debug, Clone)]
pub struct SnapshotEntry {
    pub size: u64,
    pub executable: bool,
    kind: EntryKind,
    fingerprint: OnceLock<String>,
}

/// Ordered enumeration of a subtree at an instant
///
/// Entries are keyed by relative path in a `BTreeMap`, so iteration
/// is lexicographic regardless of the traversal order the underlying
/// filesystem API produced.
#[derive(Debug, Clone)]
pub struct Snapshot {
    root: PathBuf,
    entries: BTreeMap<PathBuf, SnapshotEntry>,
}

/// Paths present only in "after", or in both with differing content
#[derive(Debug, Clone, Default)]
pub struct SnapshotDiff {
    pub added: Vec<PathBuf>,
    pub modified: Vec<PathBuf>,
}

impl SnapshotDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty()
    }

    pub fn len(&self) -> usize {
        self.added.len() + self.modified.len()
    }

    /// All affected paths, added first, each group sorted
    pub fn paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.added.iter().chain(self.modified.iter())
    }
}

fn classify_walk_error(err: walkdir::Error) -> Error {
    let path = err
        .path()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "<unknown>".to_string());
    match err.io_error() {
        Some(io) if io.kind() == std::io::ErrorKind::PermissionDenied => {
            Error::Access(format!("{}: {}", path, io))
        }
        _ => Error::Access(format!("enumeration failed at {}: {}", path, err)),
    }
}

impl Snapshot {
    /// Enumerate `root`, recording every file and symlink below it
    ///
    /// Any unreadable entry fails the whole snapshot with `Access`; a
    /// partial snapshot would corrupt the diff's correctness
    /// guarantee.
    pub fn capture(root: &Path, cancel: &CancelToken) -> Result<Self> {
        let mut entries = BTreeMap::new();

        for dir_entry in WalkDir::new(root).sort_by_file_name().follow_links(false) {
            cancel.check()?;

            let dir_entry = dir_entry.map_err(classify_walk_error)?;
            let file_type = dir_entry.file_type();
            if file_type.is_dir() {
                continue;
            }

            let rel = dir_entry
                .path()
                .strip_prefix(root)
                .map_err(|e| Error::Parse(format!("{}: {}", dir_entry.path().display(), e)))?
                .to_path_buf();

            let entry = if file_type.is_symlink() {
                let target = std::fs::read_link(dir_entry.path())
                    .map_err(|e| Error::from_io(dir_entry.path(), e))?;
                SnapshotEntry {
                    size: target.as_os_str().len() as u64,
                    executable: false,
                    kind: EntryKind::Symlink,
                    fingerprint: OnceLock::new(),
                }
            } else {
                let metadata = dir_entry
                    .metadata()
                    .map_err(classify_walk_error)?;

                #[cfg(unix)]
                let executable = {
                    use std::os::unix::fs::PermissionsExt;
                    metadata.permissions().mode() & 0o111 != 0
                };
                #[cfg(not(unix))]
                let executable = false;

                SnapshotEntry {
                    size: metadata.len(),
                    executable,
                    kind: EntryKind::File,
                    fingerprint: OnceLock::new(),
                }
            };

            entries.insert(rel, entry);
        }

        debug!("Snapshot of {}: {} entries", root.display(), entries.len());
        Ok(Self {
            root: root.to_path_buf(),
            entries,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Relative paths in lexicographic order
    pub fn paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.entries.keys()
    }

    pub fn get(&self, rel: &Path) -> Option<&SnapshotEntry> {
        self.entries.get(rel)
    }

    /// Force every fingerprint now, while disk still matches this
    /// snapshot
    pub fn pin_fingerprints(
        &self,
        cancel: &CancelToken,
        progress: &dyn ProgressTracker,
    ) -> Result<()> {
        progress.set_length(self.entries.len() as u64);
        for (rel, entry) in &self.entries {
            cancel.check()?;
            self.fingerprint_of(rel, entry)?;
            progress.increment(1);
        }
        Ok(())
    }

    /// Narrow this snapshot to the subtree under `prefix`, re-basing
    /// entry paths relative to it
    ///
    /// Already-computed fingerprints carry over, so a pinned snapshot
    /// stays pinned through the subview.
    pub fn subview(&self, prefix: &Path) -> Snapshot {
        let mut entries = BTreeMap::new();
        for (rel, entry) in &self.entries {
            if let Ok(stripped) = rel.strip_prefix(prefix) {
                entries.insert(stripped.to_path_buf(), entry.clone());
            }
        }
        Snapshot {
            root: self.root.join(prefix),
            entries,
        }
    }

    fn fingerprint_of(&self, rel: &Path, entry: &SnapshotEntry) -> Result<String> {
        if let Some(value) = entry.fingerprint.get() {
            return Ok(value.clone());
        }

        let abs = self.root.join(rel);
        let value = match entry.kind {
            EntryKind::File => {
                let mut file = File::open(&abs).map_err(|e| Error::from_io(&abs, e))?;
                hash_reader(HashAlgorithm::Sha256, &mut file)
                    .map_err(|e| Error::from_io(&abs, e))?
                    .value
            }
            EntryKind::Symlink => {
                let target = std::fs::read_link(&abs).map_err(|e| Error::from_io(&abs, e))?;
                hash_bytes(
                    HashAlgorithm::Sha256,
                    target.to_string_lossy().as_bytes(),
                )
                .value
            }
        };

        Ok(entry.fingerprint.get_or_init(|| value).clone())
    }

    /// Compare two snapshots
    ///
    /// A path is *added* if absent in `before`, *modified* if present
    /// in both with a different size, executable bit, or — only when
    /// sizes match — content fingerprint. Size-only comparison is not
    /// enough: same-size content changes are real installer effects.
    pub fn diff(before: &Snapshot, after: &Snapshot, cancel: &CancelToken) -> Result<SnapshotDiff> {
        let mut diff = SnapshotDiff::default();

        for (rel, after_entry) in &after.entries {
            cancel.check()?;

            match before.entries.get(rel) {
                None => diff.added.push(rel.clone()),
                Some(before_entry) => {
                    let changed = if before_entry.size != after_entry.size
                        || before_entry.executable != after_entry.executable
                    {
                        true
                    } else {
                        // Sizes match: full content comparison required
                        let before_fp = before.fingerprint_of(rel, before_entry)?;
                        let after_fp = after.fingerprint_of(rel, after_entry)?;
                        before_fp != after_fp
                    };

                    if changed {
                        diff.modified.push(rel.clone());
                    }
                }
            }
        }

        debug!(
            "Diff of {} vs {}: {} added, {} modified",
            before.root.display(),
            after.root.display(),
            diff.added.len(),
            diff.modified.len()
        );
        Ok(diff)
    }
}

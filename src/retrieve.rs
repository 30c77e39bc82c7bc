// src/retrieve.rs

//! Retrieval methods and staging
//!
//! A retrieval method describes how users will obtain the software; a
//! `Stager` materializes it into a session-owned temporary directory,
//! either by download or from a local copy. The temporary directory
//! is deleted on every failure path (it only survives by being handed
//! to the feed builder).

use crate::archive::{self, extract_archive};
use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::fetch::Transport;
use crate::progress::ProgressTracker;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};
use url::Url;

/// How users will obtain the published software
///
/// Immutable once chosen for a session; drives which downstream
/// pipeline path runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetrievalMethod {
    /// A single file downloaded as-is
    SingleFile { href: Url },
    /// An archive unpacked after download
    Archive {
        href: Url,
        /// Declared mime type; sniffed from name/bytes when absent
        mime_type: Option<String>,
        /// Subtree of the unpacked archive that is the implementation
        /// root ("." or empty selects the whole archive)
        extract: Option<String>,
    },
    /// An installer executable whose effects get captured
    Installer { href: Url },
}

impl RetrievalMethod {
    /// Download location
    pub fn href(&self) -> &Url {
        match self {
            Self::SingleFile { href } => href,
            Self::Archive { href, .. } => href,
            Self::Installer { href } => href,
        }
    }

    /// Method name as serialized into feed documents
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::SingleFile { .. } => "single-file",
            Self::Archive { .. } => "archive",
            Self::Installer { .. } => "installer",
        }
    }
}

/// Classification of a staged file, decided from magic bytes
///
/// Mirrors the staging decision the interactive flow asks the user
/// about: an EXE can be an installer or the application itself, so it
/// stays ambiguous here and the caller decides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagedFileKind {
    /// A supported archive container with its mime type
    Archive(&'static str),
    /// A Windows Installer package
    WindowsInstaller,
    /// A portable executable: either an installer or a single-file app
    PortableExecutable,
    /// Anything else: treated as a single file
    Plain,
}

/// Classify a staged file by magic bytes
pub fn classify_staged_file(path: &Path) -> Result<StagedFileKind> {
    if let Some(mime) = archive::sniff_mime_type(path)? {
        if mime == archive::MIME_MSI {
            return Ok(StagedFileKind::WindowsInstaller);
        }
        return Ok(StagedFileKind::Archive(mime));
    }

    let mut file = fs::File::open(path).map_err(|e| Error::from_io(path, e))?;
    let mut magic = [0u8; 2];
    use std::io::Read;
    let n = file.read(&mut magic).map_err(|e| Error::from_io(path, e))?;
    if n == 2 && &magic == b"MZ" {
        return Ok(StagedFileKind::PortableExecutable);
    }

    Ok(StagedFileKind::Plain)
}

/// Result of staging a retrieval method
///
/// Owns the temporary directory; dropping it (e.g. when an error
/// unwinds past it) deletes everything staged so far.
#[derive(Debug)]
pub struct Staged {
    dir: TempDir,
    primary: PathBuf,
}

impl Staged {
    /// Root of the staged temporary directory
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// The staged artifact: the file itself for single files and
    /// installers, the unpacked root for archives
    pub fn primary(&self) -> &Path {
        &self.primary
    }

    /// Hand ownership of the temporary directory to the caller
    pub fn into_parts(self) -> (TempDir, PathBuf) {
        (self.dir, self.primary)
    }
}

/// Materializes retrieval methods into temporary directories
pub struct Stager<'a> {
    transport: &'a dyn Transport,
}

impl<'a> Stager<'a> {
    pub fn new(transport: &'a dyn Transport) -> Self {
        Self { transport }
    }

    /// Stage a retrieval method
    ///
    /// With `local_override`, the local file is copied instead of
    /// downloading `href`; its content must still satisfy the
    /// declared method (archives are re-sniffed from magic bytes, not
    /// trusted from the name).
    pub fn stage(
        &self,
        method: &RetrievalMethod,
        local_override: Option<&Path>,
        cancel: &CancelToken,
        progress: &dyn ProgressTracker,
    ) -> Result<Staged> {
        cancel.check()?;

        match method {
            RetrievalMethod::SingleFile { href } => {
                let dir = TempDir::new()?;
                let target = dir.path().join(file_name_from_url(href));
                self.obtain(href, local_override, &target, cancel, progress)?;
                info!("Staged single file at {}", target.display());
                Ok(Staged {
                    primary: target,
                    dir,
                })
            }
            RetrievalMethod::Installer { href } => {
                let dir = TempDir::new()?;
                let target = dir.path().join(file_name_from_url(href));
                self.obtain(href, local_override, &target, cancel, progress)?;
                info!("Staged installer at {}", target.display());
                Ok(Staged {
                    primary: target,
                    dir,
                })
            }
            RetrievalMethod::Archive {
                href, mime_type, ..
            } => {
                // Download to scratch space that is dropped after
                // extraction; only the unpacked tree survives
                let scratch = TempDir::new()?;
                let archive_file = scratch.path().join(file_name_from_url(href));
                self.obtain(href, local_override, &archive_file, cancel, progress)?;

                let mime = resolve_archive_mime(
                    mime_type.as_deref(),
                    &file_name_from_url(href),
                    &archive_file,
                    local_override.is_some(),
                )?;

                let dir = TempDir::new()?;
                let unpacked = dir.path().join("unpacked");
                extract_archive(&archive_file, &unpacked, mime, cancel, progress)?;
                info!("Staged archive contents at {}", unpacked.display());
                Ok(Staged {
                    primary: unpacked,
                    dir,
                })
            }
        }
    }

    fn obtain(
        &self,
        href: &Url,
        local_override: Option<&Path>,
        target: &Path,
        cancel: &CancelToken,
        progress: &dyn ProgressTracker,
    ) -> Result<()> {
        match local_override {
            Some(local) => {
                debug!("Using local copy {} for {}", local.display(), href);
                cancel.check()?;
                fs::copy(local, target).map_err(|e| Error::from_io(local, e))?;
                Ok(())
            }
            None => self.transport.fetch(href, target, cancel, progress),
        }
    }
}

/// Resolve the mime type an archive will be extracted as
///
/// Declared type wins when present; otherwise the file name decides;
/// local copies are additionally verified against their magic bytes
/// so a mislabeled file fails here instead of mid-extraction.
fn resolve_archive_mime(
    declared: Option<&str>,
    file_name: &str,
    archive_file: &Path,
    sniff_content: bool,
) -> Result<&'static str> {
    let from_name = archive::guess_mime_type(file_name);
    let resolved = match declared {
        Some(m) => archive::SUPPORTED_MIME_TYPES
            .iter()
            .find(|candidate| **candidate == m)
            .copied()
            .ok_or_else(|| Error::UnsupportedFormat(m.to_string()))?,
        None => from_name.ok_or_else(|| {
            Error::UnsupportedFormat(format!("cannot guess archive type of {}", file_name))
        })?,
    };

    if sniff_content {
        if let Some(sniffed) = archive::sniff_mime_type(archive_file)? {
            if sniffed != resolved {
                return Err(Error::UnsupportedFormat(format!(
                    "{} declared as {} but content is {}",
                    file_name, resolved, sniffed
                )));
            }
        }
    }

    Ok(resolved)
}

fn file_name_from_url(url: &Url) -> String {
    url.path_segments()
        .and_then(|segments| segments.last())
        .filter(|segment| !segment.is_empty())
        .unwrap_or("download")
        .to_string()
}

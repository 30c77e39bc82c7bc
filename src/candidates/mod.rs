// src/candidates/mod.rs

//! Entry-point detection
//!
//! Walks an implementation directory for runnable entry points and
//! classifies them into a closed set of executable kinds. Unrecognized
//! files are skipped; metadata extraction is best-effort and never
//! aborts detection.

mod classify;
mod metadata;

pub use classify::{classify_file, BinaryFormat};
pub use metadata::{IconResource, MetadataError, MIME_ICO, MIME_PNG};

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Closed set of recognized executable kinds
///
/// Capability queries (`needs_interpreter`, `has_icon`) replace
/// open-ended dispatch over heterogeneous entry-point objects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutableKind {
    /// Natively runnable binary (ELF, PE, Mach-O)
    Native(BinaryFormat),
    /// PE binary carrying a CLR runtime header
    DotNetAssembly,
    /// Script with an interpreter shebang
    InterpretedScript { interpreter: String },
    /// Runnable zip bundle (jar)
    JavaArchive,
    /// Windows batch file
    WindowsBatch,
    /// Installer package format (recognized but not runnable here)
    InstallerPackage { mime_type: &'static str },
}

impl ExecutableKind {
    /// Interpreter needed to run this candidate, if any
    pub fn needs_interpreter(&self) -> Option<&str> {
        match self {
            Self::InterpretedScript { interpreter } => Some(interpreter),
            Self::JavaArchive => Some("java"),
            _ => None,
        }
    }

    /// Whether this kind can carry an extractable icon resource
    pub fn has_icon(&self) -> bool {
        matches!(self, Self::Native(BinaryFormat::Pe) | Self::DotNetAssembly)
    }

    /// Kind name as serialized into feed documents
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Native(BinaryFormat::Elf) => "native-elf",
            Self::Native(BinaryFormat::Pe) => "native-pe",
            Self::Native(BinaryFormat::MachO) => "native-macho",
            Self::DotNetAssembly => "dotnet-assembly",
            Self::InterpretedScript { .. } => "script",
            Self::JavaArchive => "java-archive",
            Self::WindowsBatch => "windows-batch",
            Self::InstallerPackage { .. } => "installer-package",
        }
    }
}

impl fmt::Display for ExecutableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One detected runnable entry point
#[derive(Debug, Clone)]
pub struct Candidate {
    /// Path relative to the implementation directory
    pub relative_path: PathBuf,
    pub kind: ExecutableKind,
    pub name: Option<String>,
    pub version: Option<String>,
    pub summary: Option<String>,
    pub icon: Option<IconResource>,
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.relative_path.display(), self.kind)
    }
}

fn classify_walk_error(err: walkdir::Error) -> Error {
    let path = err
        .path()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "<unknown>".to_string());
    Error::Access(format!("enumeration failed at {}: {}", path, err))
}

/// Scan an implementation directory for runnable entry points
///
/// Returns candidates in lexicographic path order; may be empty —
/// callers treat an empty result as a hard stop for the pipeline.
pub fn detect(implementation_dir: &Path, cancel: &CancelToken) -> Result<Vec<Candidate>> {
    let mut candidates = Vec::new();

    for dir_entry in WalkDir::new(implementation_dir)
        .sort_by_file_name()
        .follow_links(false)
    {
        cancel.check()?;

        let dir_entry = dir_entry.map_err(classify_walk_error)?;
        if !dir_entry.file_type().is_file() {
            continue;
        }

        let abs = dir_entry.path();
        let Some(kind) = classify_file(abs)? else {
            continue;
        };

        let rel = abs
            .strip_prefix(implementation_dir)
            .map_err(|e| Error::Parse(format!("{}: {}", abs.display(), e)))?
            .to_path_buf();

        let mut candidate = Candidate {
            relative_path: rel,
            kind,
            name: None,
            version: None,
            summary: None,
            icon: None,
        };
        metadata::infer_name_version(&mut candidate);

        // Icon decode failures downgrade to "no icon"; anything else
        // is a genuine error and must not be masked
        match metadata::probe_icon(abs) {
            Ok(icon) => candidate.icon = icon,
            Err(MetadataError::IconDecode(msg)) => {
                warn!("Icon for {} unusable: {}", candidate.relative_path.display(), msg);
            }
            Err(MetadataError::Io(e)) => return Err(Error::from_io(abs, e)),
        }

        debug!("Detected candidate {}", candidate);
        candidates.push(candidate);
    }

    Ok(candidates)
}

// src/archive/mod.rs

//! Archive handling: mime detection, extraction, creation
//!
//! The codecs themselves (tar family, zip) live in submodules behind
//! the `ArchiveCodec` trait; this module owns what the pipeline
//! actually guarantees: mime-type detection from extension and magic
//! bytes, breakout-path validation of every entry, and the
//! all-or-nothing staging rename that keeps a cancelled or failed
//! extraction from leaving partial output behind.

mod tar;
mod zip;

pub use self::tar::{TarCodec, TarCompression};
pub use self::zip::ZipCodec;

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::progress::ProgressTracker;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Zip archives (also used by installer EXEs with embedded zip payloads)
pub const MIME_ZIP: &str = "application/zip";
/// Plain tarballs
pub const MIME_TAR: &str = "application/x-tar";
/// Gzip-compressed tarballs
pub const MIME_TAR_GZIP: &str = "application/x-compressed-tar";
/// XZ-compressed tarballs
pub const MIME_TAR_XZ: &str = "application/x-xz-compressed-tar";
/// Windows Installer packages (recognized, not extractable here)
pub const MIME_MSI: &str = "application/x-msi";

/// Mime types the shipped codecs can extract and create
pub const SUPPORTED_MIME_TYPES: &[&str] = &[MIME_ZIP, MIME_TAR, MIME_TAR_GZIP, MIME_TAR_XZ];

/// Guess an archive mime type from a file name
///
/// Returns `None` for names with no recognized archive extension
/// (the caller then treats the file as a single file or installer).
pub fn guess_mime_type(file_name: &str) -> Option<&'static str> {
    let lower = file_name.to_lowercase();
    if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
        Some(MIME_TAR_GZIP)
    } else if lower.ends_with(".tar.xz") || lower.ends_with(".txz") {
        Some(MIME_TAR_XZ)
    } else if lower.ends_with(".tar") {
        Some(MIME_TAR)
    } else if lower.ends_with(".zip") || lower.ends_with(".jar") {
        Some(MIME_ZIP)
    } else if lower.ends_with(".msi") {
        Some(MIME_MSI)
    } else {
        None
    }
}

/// Sniff an archive mime type from magic bytes
///
/// Extensions lie; local overrides and installer binaries are always
/// re-sniffed from content.
pub fn sniff_mime_type(path: &Path) -> Result<Option<&'static str>> {
    let mut file = fs::File::open(path).map_err(|e| Error::from_io(path, e))?;
    let mut magic = [0u8; 8];
    let n = file.read(&mut magic).map_err(|e| Error::from_io(path, e))?;

    if n >= 4 && magic[0..4] == [0x50, 0x4B, 0x03, 0x04] {
        return Ok(Some(MIME_ZIP));
    }
    if n >= 2 && magic[0..2] == [0x1F, 0x8B] {
        return Ok(Some(MIME_TAR_GZIP));
    }
    if n >= 6 && magic[0..6] == [0xFD, 0x37, 0x7A, 0x58, 0x5A, 0x00] {
        return Ok(Some(MIME_TAR_XZ));
    }
    if n >= 8 && magic == [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1] {
        return Ok(Some(MIME_MSI));
    }

    // Plain tar has no leading magic; "ustar" sits at offset 257
    use std::io::Seek;
    let mut ustar = [0u8; 5];
    if file.seek(std::io::SeekFrom::Start(257)).is_ok()
        && file.read(&mut ustar).map_err(|e| Error::from_io(path, e))? == 5
        && &ustar == b"ustar"
    {
        return Ok(Some(MIME_TAR));
    }

    Ok(None)
}

/// Archive codec seam
///
/// Codec implementations are responsible for format correctness only.
/// Entry-path validation is done with [`crate::paths`] helpers inside
/// each codec's write loop so that no invalid entry is ever written,
/// and the staging rename in [`extract_archive`] guarantees
/// all-or-nothing output.
pub trait ArchiveCodec {
    /// Unpack `archive` into `dest`, returning the relative paths of
    /// all file and symlink entries written
    fn extract(
        &self,
        archive: &Path,
        dest: &Path,
        cancel: &CancelToken,
        progress: &dyn ProgressTracker,
    ) -> Result<Vec<PathBuf>>;

    /// Package `files` (paths relative to `source_dir`) into a new
    /// archive at `output`
    fn create(
        &self,
        source_dir: &Path,
        files: &[PathBuf],
        output: &Path,
        cancel: &CancelToken,
    ) -> Result<()>;
}

/// Resolve the codec for a mime type
pub fn codec_for(mime_type: &str) -> Result<Box<dyn ArchiveCodec>> {
    match mime_type {
        MIME_ZIP => Ok(Box::new(ZipCodec)),
        MIME_TAR => Ok(Box::new(TarCodec::new(TarCompression::None))),
        MIME_TAR_GZIP => Ok(Box::new(TarCodec::new(TarCompression::Gzip))),
        MIME_TAR_XZ => Ok(Box::new(TarCodec::new(TarCompression::Xz))),
        other => Err(Error::UnsupportedFormat(other.to_string())),
    }
}

/// Extract an archive into a fresh directory, all-or-nothing
///
/// Entries are unpacked into a hidden staging directory next to
/// `dest`, which is renamed into place only after every entry
/// extracted and validated cleanly. A failure or cancellation midway
/// drops the staging directory, leaving no trace; a subsequent call
/// with the same inputs starts clean.
pub fn extract_archive(
    archive: &Path,
    dest: &Path,
    mime_type: &str,
    cancel: &CancelToken,
    progress: &dyn ProgressTracker,
) -> Result<Vec<PathBuf>> {
    if dest.exists() {
        return Err(Error::InvalidPath(format!(
            "extraction target already exists: {}",
            dest.display()
        )));
    }
    let parent = dest.parent().ok_or_else(|| {
        Error::InvalidPath(format!("extraction target has no parent: {}", dest.display()))
    })?;

    let codec = codec_for(mime_type)?;
    let staging = tempfile::Builder::new()
        .prefix(".extract-")
        .tempdir_in(parent)
        .map_err(|e| Error::from_io(parent, e))?;

    debug!(
        "Extracting {} ({}) via {}",
        archive.display(),
        mime_type,
        staging.path().display()
    );

    let entries = codec.extract(archive, staging.path(), cancel, progress)?;

    // Commit: staging becomes the destination
    let staged = staging.into_path();
    if let Err(e) = fs::rename(&staged, dest) {
        let _ = fs::remove_dir_all(&staged);
        return Err(Error::from_io(dest, e));
    }

    progress.finish_with_message("extraction complete");
    Ok(entries)
}

/// Create an archive from selected files under a source directory
pub fn create_archive(
    source_dir: &Path,
    files: &[PathBuf],
    output: &Path,
    mime_type: &str,
    cancel: &CancelToken,
) -> Result<()> {
    let codec = codec_for(mime_type)?;
    debug!(
        "Packaging {} files from {} into {}",
        files.len(),
        source_dir.display(),
        output.display()
    );

    match codec.create(source_dir, files, output, cancel) {
        Ok(()) => Ok(()),
        Err(e) => {
            // No partial archive may survive a failed creation
            let _ = fs::remove_file(output);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::SilentProgress;
    use std::io::Write;

    #[test]
    fn test_guess_mime_type() {
        assert_eq!(guess_mime_type("app-1.0.tar.gz"), Some(MIME_TAR_GZIP));
        assert_eq!(guess_mime_type("app.TGZ"), Some(MIME_TAR_GZIP));
        assert_eq!(guess_mime_type("app.tar.xz"), Some(MIME_TAR_XZ));
        assert_eq!(guess_mime_type("app.tar"), Some(MIME_TAR));
        assert_eq!(guess_mime_type("app.zip"), Some(MIME_ZIP));
        assert_eq!(guess_mime_type("app.jar"), Some(MIME_ZIP));
        assert_eq!(guess_mime_type("setup.msi"), Some(MIME_MSI));
        assert_eq!(guess_mime_type("setup.exe"), None);
        assert_eq!(guess_mime_type("README"), None);
    }

    #[test]
    fn test_sniff_zip_magic() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("payload.bin");
        let mut f = fs::File::create(&path).unwrap();
        f.write_all(&[0x50, 0x4B, 0x03, 0x04, 0, 0, 0, 0]).unwrap();

        assert_eq!(sniff_mime_type(&path).unwrap(), Some(MIME_ZIP));
    }

    #[test]
    fn test_sniff_unrecognized() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("plain.txt");
        fs::write(&path, b"just text").unwrap();

        assert_eq!(sniff_mime_type(&path).unwrap(), None);
    }

    #[test]
    fn test_codec_for_unsupported() {
        assert!(matches!(
            codec_for(MIME_MSI),
            Err(Error::UnsupportedFormat(_))
        ));
        assert!(matches!(
            codec_for("application/x-7z-compressed"),
            Err(Error::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_extract_refuses_existing_dest() {
        let dir = tempfile::TempDir::new().unwrap();
        let archive = dir.path().join("a.tar");
        fs::write(&archive, b"").unwrap();
        let dest = dir.path().join("out");
        fs::create_dir(&dest).unwrap();

        let err = extract_archive(
            &archive,
            &dest,
            MIME_TAR,
            &CancelToken::new(),
            &SilentProgress::new(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidPath(_)));
    }
}

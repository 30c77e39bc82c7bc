// src/archive/tar.rs

//! Tar codec (plain, gzip, xz)

use crate::archive::ArchiveCodec;
use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::paths::{safe_join, sanitize_entry_path, validate_link_target};
use crate::progress::ProgressTracker;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tar::EntryType;
use tracing::warn;
use xz2::read::XzDecoder;
use xz2::write::XzEncoder;

/// Compression wrapping around the tar stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TarCompression {
    None,
    Gzip,
    Xz,
}

/// Codec for the tar family
pub struct TarCodec {
    compression: TarCompression,
}

impl TarCodec {
    pub fn new(compression: TarCompression) -> Self {
        Self { compression }
    }

    fn open_reader(&self, archive: &Path) -> Result<Box<dyn Read>> {
        let file = File::open(archive).map_err(|e| Error::from_io(archive, e))?;
        Ok(match self.compression {
            TarCompression::None => Box::new(file),
            TarCompression::Gzip => Box::new(GzDecoder::new(file)),
            TarCompression::Xz => Box::new(XzDecoder::new(file)),
        })
    }
}

/// Map a tar stream error; corrupted input is a format problem, not
/// an I/O problem
fn classify_stream_error(archive: &Path, err: io::Error) -> Error {
    match err.kind() {
        io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof => {
            Error::UnsupportedFormat(format!("{}: not a valid tar archive", archive.display()))
        }
        _ => Error::from_io(archive, err),
    }
}

impl ArchiveCodec for TarCodec {
    fn extract(
        &self,
        archive: &Path,
        dest: &Path,
        cancel: &CancelToken,
        progress: &dyn ProgressTracker,
    ) -> Result<Vec<PathBuf>> {
        let reader = self.open_reader(archive)?;
        let mut tar = tar::Archive::new(reader);
        let mut extracted = Vec::new();

        for entry in tar.entries().map_err(|e| classify_stream_error(archive, e))? {
            cancel.check()?;

            let mut entry = entry.map_err(|e| classify_stream_error(archive, e))?;
            let raw_path = entry
                .path()
                .map_err(|e| classify_stream_error(archive, e))?
                .into_owned();

            match entry.header().entry_type() {
                EntryType::Directory => {
                    let target = safe_join(dest, &raw_path)?;
                    fs::create_dir_all(&target).map_err(|e| Error::from_io(&target, e))?;
                }
                EntryType::Regular => {
                    let rel = sanitize_entry_path(&raw_path)?;
                    let target = dest.join(&rel);
                    if let Some(parent) = target.parent() {
                        fs::create_dir_all(parent).map_err(|e| Error::from_io(parent, e))?;
                    }

                    let mut out =
                        File::create(&target).map_err(|e| Error::from_io(&target, e))?;
                    io::copy(&mut entry, &mut out)
                        .map_err(|e| classify_stream_error(archive, e))?;

                    #[cfg(unix)]
                    {
                        use std::os::unix::fs::PermissionsExt;
                        let mode = entry
                            .header()
                            .mode()
                            .map_err(|e| classify_stream_error(archive, e))?;
                        if mode & 0o111 != 0 {
                            fs::set_permissions(&target, fs::Permissions::from_mode(0o755))
                                .map_err(|e| Error::from_io(&target, e))?;
                        }
                    }

                    extracted.push(rel);
                    progress.increment(1);
                }
                EntryType::Symlink => {
                    let rel = sanitize_entry_path(&raw_path)?;
                    let link_target = entry
                        .link_name()
                        .map_err(|e| classify_stream_error(archive, e))?
                        .ok_or_else(|| {
                            Error::Parse(format!("symlink entry {} has no target", rel.display()))
                        })?
                        .into_owned();
                    validate_link_target(&rel, &link_target)?;

                    let target = dest.join(&rel);
                    if let Some(parent) = target.parent() {
                        fs::create_dir_all(parent).map_err(|e| Error::from_io(parent, e))?;
                    }

                    #[cfg(unix)]
                    {
                        std::os::unix::fs::symlink(&link_target, &target)
                            .map_err(|e| Error::from_io(&target, e))?;
                        extracted.push(rel);
                        progress.increment(1);
                    }
                    #[cfg(not(unix))]
                    warn!(
                        "Skipping symlink entry {} (unsupported on this platform)",
                        rel.display()
                    );
                }
                other => {
                    warn!(
                        "Skipping unsupported tar entry type {:?} for {}",
                        other,
                        raw_path.display()
                    );
                }
            }
        }

        Ok(extracted)
    }

    fn create(
        &self,
        source_dir: &Path,
        files: &[PathBuf],
        output: &Path,
        cancel: &CancelToken,
    ) -> Result<()> {
        let file = File::create(output).map_err(|e| Error::from_io(output, e))?;

        match self.compression {
            TarCompression::None => {
                let mut builder = tar::Builder::new(file);
                append_files(&mut builder, source_dir, files, cancel)?;
                let mut inner = builder.into_inner().map_err(Error::Io)?;
                inner.flush().map_err(Error::Io)?;
            }
            TarCompression::Gzip => {
                let encoder = GzEncoder::new(file, Compression::default());
                let mut builder = tar::Builder::new(encoder);
                append_files(&mut builder, source_dir, files, cancel)?;
                let encoder = builder.into_inner().map_err(Error::Io)?;
                encoder.finish().map_err(Error::Io)?;
            }
            TarCompression::Xz => {
                let encoder = XzEncoder::new(file, 6);
                let mut builder = tar::Builder::new(encoder);
                append_files(&mut builder, source_dir, files, cancel)?;
                let encoder = builder.into_inner().map_err(Error::Io)?;
                encoder.finish().map_err(Error::Io)?;
            }
        }

        Ok(())
    }
}

fn append_files<W: Write>(
    builder: &mut tar::Builder<W>,
    source_dir: &Path,
    files: &[PathBuf],
    cancel: &CancelToken,
) -> Result<()> {
    for rel in files {
        cancel.check()?;
        let src = source_dir.join(rel);
        builder
            .append_path_with_name(&src, rel)
            .map_err(|e| Error::from_io(&src, e))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{extract_archive, MIME_TAR_GZIP};
    use crate::progress::SilentProgress;

    fn build_tarball(dir: &Path, entries: &[(&str, &[u8])]) -> PathBuf {
        let src = dir.join("src");
        fs::create_dir_all(&src).unwrap();
        let mut rels = Vec::new();
        for (name, content) in entries {
            let path = src.join(name);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(&path, content).unwrap();
            rels.push(PathBuf::from(name));
        }

        let output = dir.join("bundle.tar.gz");
        TarCodec::new(TarCompression::Gzip)
            .create(&src, &rels, &output, &CancelToken::new())
            .unwrap();
        output
    }

    #[test]
    fn test_roundtrip_preserves_content() {
        let dir = tempfile::TempDir::new().unwrap();
        let archive = build_tarball(
            dir.path(),
            &[("bin/app", b"binary".as_slice()), ("doc/README", b"hello")],
        );

        let dest = dir.path().join("out");
        let entries = extract_archive(
            &archive,
            &dest,
            MIME_TAR_GZIP,
            &CancelToken::new(),
            &SilentProgress::new(),
        )
        .unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(fs::read(dest.join("bin/app")).unwrap(), b"binary");
        assert_eq!(fs::read(dest.join("doc/README")).unwrap(), b"hello");
    }

    #[test]
    fn test_breakout_entry_rejected_without_writes() {
        let dir = tempfile::TempDir::new().unwrap();

        // Hand-build a tarball whose entry path climbs out of the root
        let output = dir.path().join("evil.tar");
        {
            let file = File::create(&output).unwrap();
            let mut builder = tar::Builder::new(file);
            let payload = b"owned";
            let mut header = tar::Header::new_gnu();
            header.set_size(payload.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, "../escape.txt", payload.as_slice())
                .unwrap();
            builder.finish().unwrap();
        }

        let dest = dir.path().join("out");
        let err = extract_archive(
            &output,
            &dest,
            crate::archive::MIME_TAR,
            &CancelToken::new(),
            &SilentProgress::new(),
        )
        .unwrap_err();

        assert!(matches!(err, Error::BreakoutPath(_)));
        assert!(!dest.exists());
        assert!(!dir.path().join("escape.txt").exists());
        assert!(!dir.path().parent().unwrap().join("escape.txt").exists());
    }

    #[test]
    fn test_cancelled_extraction_leaves_nothing_and_retry_succeeds() {
        let dir = tempfile::TempDir::new().unwrap();
        let archive = build_tarball(dir.path(), &[("a.txt", b"a".as_slice())]);
        let dest = dir.path().join("out");

        let cancel = CancelToken::new();
        cancel.cancel();
        let err = extract_archive(
            &archive,
            &dest,
            MIME_TAR_GZIP,
            &cancel,
            &SilentProgress::new(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert!(!dest.exists());

        // Same inputs, fresh token: extraction now succeeds cleanly
        extract_archive(
            &archive,
            &dest,
            MIME_TAR_GZIP,
            &CancelToken::new(),
            &SilentProgress::new(),
        )
        .unwrap();
        assert!(dest.join("a.txt").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_executable_bit_preserved() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let src = dir.path().join("src");
        fs::create_dir_all(&src).unwrap();
        let exe = src.join("run.sh");
        fs::write(&exe, b"#!/bin/sh\n").unwrap();
        fs::set_permissions(&exe, fs::Permissions::from_mode(0o755)).unwrap();

        let output = dir.path().join("bundle.tar");
        TarCodec::new(TarCompression::None)
            .create(
                &src,
                &[PathBuf::from("run.sh")],
                &output,
                &CancelToken::new(),
            )
            .unwrap();

        let dest = dir.path().join("out");
        extract_archive(
            &output,
            &dest,
            crate::archive::MIME_TAR,
            &CancelToken::new(),
            &SilentProgress::new(),
        )
        .unwrap();

        let mode = fs::metadata(dest.join("run.sh")).unwrap().permissions().mode();
        assert_ne!(mode & 0o111, 0);
    }
}

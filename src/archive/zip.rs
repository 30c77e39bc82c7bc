// src/archive/zip.rs

//! Zip codec

use crate::archive::ArchiveCodec;
use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::paths::{safe_join, sanitize_entry_path};
use crate::progress::ProgressTracker;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

/// Codec for zip archives
pub struct ZipCodec;

fn classify_zip_error(archive: &Path, err: ZipError) -> Error {
    match err {
        ZipError::Io(e) => Error::from_io(archive, e),
        ZipError::InvalidArchive(_) | ZipError::UnsupportedArchive(_) => Error::UnsupportedFormat(
            format!("{}: not a valid zip archive", archive.display()),
        ),
        other => Error::Parse(format!("{}: {}", archive.display(), other)),
    }
}

impl ArchiveCodec for ZipCodec {
    fn extract(
        &self,
        archive: &Path,
        dest: &Path,
        cancel: &CancelToken,
        progress: &dyn ProgressTracker,
    ) -> Result<Vec<PathBuf>> {
        let file = File::open(archive).map_err(|e| Error::from_io(archive, e))?;
        let mut zip = ZipArchive::new(file).map_err(|e| classify_zip_error(archive, e))?;

        progress.set_length(zip.len() as u64);
        let mut extracted = Vec::new();

        for index in 0..zip.len() {
            cancel.check()?;

            let mut entry = zip
                .by_index(index)
                .map_err(|e| classify_zip_error(archive, e))?;
            let raw_name = entry.name().to_string();

            if entry.is_dir() {
                let target = safe_join(dest, &raw_name)?;
                fs::create_dir_all(&target).map_err(|e| Error::from_io(&target, e))?;
                progress.increment(1);
                continue;
            }

            let rel = sanitize_entry_path(&raw_name)?;
            let target = dest.join(&rel);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(|e| Error::from_io(parent, e))?;
            }

            let mut out = File::create(&target).map_err(|e| Error::from_io(&target, e))?;
            io::copy(&mut entry, &mut out).map_err(|e| Error::from_io(&target, e))?;

            #[cfg(unix)]
            if let Some(mode) = entry.unix_mode() {
                use std::os::unix::fs::PermissionsExt;
                if mode & 0o111 != 0 {
                    fs::set_permissions(&target, fs::Permissions::from_mode(0o755))
                        .map_err(|e| Error::from_io(&target, e))?;
                }
            }

            extracted.push(rel);
            progress.increment(1);
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
        let mut writer = ZipWriter::new(file);

        for rel in files {
            cancel.check()?;

            let src = source_dir.join(rel);
            let mut options = SimpleFileOptions::default();

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let mode = fs::metadata(&src)
                    .map_err(|e| Error::from_io(&src, e))?
                    .permissions()
                    .mode();
                options = options.unix_permissions(mode);
            }

            writer
                .start_file(rel.to_string_lossy().into_owned(), options)
                .map_err(|e| classify_zip_error(output, e))?;

            let mut input = File::open(&src).map_err(|e| Error::from_io(&src, e))?;
            let mut buffer = [0u8; 8192];
            loop {
                let n = input.read(&mut buffer).map_err(|e| Error::from_io(&src, e))?;
                if n == 0 {
                    break;
                }
                writer
                    .write_all(&buffer[..n])
                    .map_err(|e| Error::from_io(output, e))?;
            }
        }

        writer
            .finish()
            .map_err(|e| classify_zip_error(output, e))?;
        Ok(())
    }
}

// src/candidates/classify.rs

//! Executable classification by binary signature and extension
//!
//! Classification reads magic bytes first and only falls back to
//! extensions where the format has no usable signature (batch files).
//! Files goblin cannot parse are skipped, not errored — archives full
//! of data files are normal.

use super::ExecutableKind;
use crate::archive::MIME_MSI;
use crate::error::{Error, Result};
use goblin::Object;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use tracing::debug;

/// Native binary container format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryFormat {
    Elf,
    Pe,
    MachO,
}

const MSI_MAGIC: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
const ZIP_MAGIC: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];

/// Classify a file into an executable kind, or `None` to skip it
pub fn classify_file(path: &Path) -> Result<Option<ExecutableKind>> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase());

    // Batch files carry no signature
    if matches!(extension.as_deref(), Some("bat") | Some("cmd")) {
        return Ok(Some(ExecutableKind::WindowsBatch));
    }

    let mut file = File::open(path).map_err(|e| Error::from_io(path, e))?;
    let mut magic = [0u8; 8];
    let n = file.read(&mut magic).map_err(|e| Error::from_io(path, e))?;
    if n < 2 {
        return Ok(None);
    }

    if magic.starts_with(b"#!") {
        return Ok(shebang_interpreter(path)?.map(|interpreter| {
            ExecutableKind::InterpretedScript { interpreter }
        }));
    }

    if n >= 4 && magic[0..4] == ZIP_MAGIC {
        // Zip container: runnable only when it's a jar
        if extension.as_deref() == Some("jar") {
            return Ok(Some(ExecutableKind::JavaArchive));
        }
        return Ok(None);
    }

    if n >= 8 && magic == MSI_MAGIC {
        return Ok(Some(ExecutableKind::InstallerPackage {
            mime_type: MIME_MSI,
        }));
    }

    if looks_like_binary(&magic[..n]) {
        return classify_binary(path);
    }

    Ok(None)
}

fn looks_like_binary(magic: &[u8]) -> bool {
    if magic.len() < 4 {
        return false;
    }
    magic.starts_with(b"MZ")
        || magic.starts_with(&[0x7F, b'E', b'L', b'F'])
        // Mach-O thin (32/64, both endians) and fat magics
        || matches!(
            [magic[0], magic[1], magic[2], magic[3]],
            [0xFE, 0xED, 0xFA, 0xCE]
                | [0xFE, 0xED, 0xFA, 0xCF]
                | [0xCE, 0xFA, 0xED, 0xFE]
                | [0xCF, 0xFA, 0xED, 0xFE]
                | [0xCA, 0xFE, 0xBA, 0xBE]
        )
}

fn classify_binary(path: &Path) -> Result<Option<ExecutableKind>> {
    let bytes = fs::read(path).map_err(|e| Error::from_io(path, e))?;

    match Object::parse(&bytes) {
        Ok(Object::Elf(_)) => Ok(Some(ExecutableKind::Native(BinaryFormat::Elf))),
        Ok(Object::PE(pe)) => {
            let is_clr = pe
                .header
                .optional_header
                .map(|oh| oh.data_directories.get_clr_runtime_header().is_some())
                .unwrap_or(false);
            if is_clr {
                Ok(Some(ExecutableKind::DotNetAssembly))
            } else {
                Ok(Some(ExecutableKind::Native(BinaryFormat::Pe)))
            }
        }
        Ok(Object::Mach(_)) => Ok(Some(ExecutableKind::Native(BinaryFormat::MachO))),
        Ok(_) => Ok(None),
        Err(e) => {
            // Magic promised a binary but parsing failed; skip it
            debug!("Unparseable binary {}: {}", path.display(), e);
            Ok(None)
        }
    }
}

/// Read the interpreter from a shebang line
///
/// `#!/usr/bin/env python3` resolves to `python3`; otherwise the
/// basename of the interpreter path.
fn shebang_interpreter(path: &Path) -> Result<Option<String>> {
    let file = File::open(path).map_err(|e| Error::from_io(path, e))?;
    let mut line = String::new();
    BufReader::new(file)
        .take(256)
        .read_line(&mut line)
        .map_err(|e| Error::from_io(path, e))?;

    let rest = line.trim_start_matches("#!").trim();
    let mut tokens = rest.split_whitespace();
    let first = match tokens.next() {
        Some(t) => t,
        None => return Ok(None),
    };

    let interpreter = if first.ends_with("/env") || first == "env" {
        match tokens.next() {
            Some(t) => t,
            None => return Ok(None),
        }
    } else {
        first.rsplit('/').next().unwrap_or(first)
    };

    Ok(Some(interpreter.to_string()))
}

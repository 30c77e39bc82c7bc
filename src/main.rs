// src/main.rs

use anyhow::{bail, Context, Result};
use clap::Parser;
use feedforge::archive;
use feedforge::candidates;
use feedforge::cancel::CancelToken;
use feedforge::cli::{BarProgress, Cli, Commands};
use feedforge::feed::Ed25519Signer;
use feedforge::fetch::HttpTransport;
use feedforge::hash::HashAlgorithm;
use feedforge::manifest;
use feedforge::retrieve::{RetrievalMethod, Stager};
use std::path::{Path, PathBuf};
use tracing::info;
use url::Url;

fn main() -> Result<()> {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let cancel = CancelToken::new();

    match cli.command {
        Commands::Digest { dir, algorithm } => {
            let progress = BarProgress::new();
            let digest = manifest::compute_digest(Path::new(&dir), &cancel, &progress)
                .with_context(|| format!("failed to digest {}", dir))?;

            if digest.is_empty_sentinel() {
                bail!("{} contains no files, nothing to ship", dir);
            }

            match algorithm.as_deref() {
                None => {
                    println!("sha256:{}", digest.sha256);
                    println!("sha1:{}", digest.sha1);
                }
                Some(name) => {
                    let algorithm: HashAlgorithm =
                        name.parse().with_context(|| format!("bad algorithm {}", name))?;
                    match algorithm {
                        HashAlgorithm::Sha256 => println!("sha256:{}", digest.sha256),
                        HashAlgorithm::Sha1 => println!("sha1:{}", digest.sha1),
                    }
                }
            }
        }

        Commands::Detect { dir } => {
            let found = candidates::detect(Path::new(&dir), &cancel)
                .with_context(|| format!("failed to scan {}", dir))?;

            if found.is_empty() {
                bail!("no entry points found in {}", dir);
            }
            for candidate in &found {
                let version = candidate
                    .version
                    .as_deref()
                    .map(|v| format!(" version {}", v))
                    .unwrap_or_default();
                println!("{}{}", candidate, version);
            }
        }

        Commands::Extract {
            archive: archive_path,
            dest,
            mime_type,
        } => {
            let archive_path = PathBuf::from(archive_path);
            let mime = match mime_type {
                Some(m) => archive::SUPPORTED_MIME_TYPES
                    .iter()
                    .find(|candidate| **candidate == m)
                    .copied()
                    .with_context(|| format!("unsupported mime type {}", m))?,
                None => {
                    let name = archive_path
                        .file_name()
                        .and_then(|n| n.to_str())
                        .unwrap_or("");
                    match archive::guess_mime_type(name) {
                        Some(m) => m,
                        None => archive::sniff_mime_type(&archive_path)?
                            .with_context(|| format!("cannot detect archive type of {}", name))?,
                    }
                }
            };

            let progress = BarProgress::new();
            let entries =
                archive::extract_archive(&archive_path, Path::new(&dest), mime, &cancel, &progress)
                    .with_context(|| format!("failed to extract {}", archive_path.display()))?;
            info!("Extracted {} entries to {}", entries.len(), dest);
        }

        Commands::Stage { url, local, out } => {
            let href = Url::parse(&url).with_context(|| format!("bad URL {}", url))?;
            let file_name = href
                .path_segments()
                .and_then(|segments| segments.last())
                .unwrap_or("download")
                .to_string();

            let method = match archive::guess_mime_type(&file_name) {
                Some(mime) if mime != archive::MIME_MSI => RetrievalMethod::Archive {
                    href,
                    mime_type: Some(mime.to_string()),
                    extract: None,
                },
                _ => RetrievalMethod::SingleFile { href },
            };

            let transport = HttpTransport::new()?;
            let stager = Stager::new(&transport);
            let progress = BarProgress::new();
            let staged = stager.stage(
                &method,
                local.as_deref().map(Path::new),
                &cancel,
                &progress,
            )?;

            let out_path = PathBuf::from(&out);
            let (dir, primary) = staged.into_parts();
            let kept = dir.into_path();
            std::fs::rename(&kept, &out_path).with_context(|| {
                format!("failed to move staged tree to {}", out_path.display())
            })?;
            let rel = primary.strip_prefix(&kept).unwrap_or(&primary);
            info!(
                "Staged {} at {}",
                method.kind_name(),
                out_path.join(rel).display()
            );
        }

        Commands::Keygen {
            private,
            public,
            key_id,
        } => {
            let mut signer = Ed25519Signer::generate();
            if let Some(id) = key_id {
                signer = signer.with_key_id(&id);
            }
            signer.save_to_files(Path::new(&private), Path::new(&public))?;
            println!("public key: {}", signer.public_key_base64());
            info!("Key pair written to {} and {}", private, public);
        }
    }

    Ok(())
}

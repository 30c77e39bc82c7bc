// src/feed/mod.rs

//! Feed assembly
//!
//! The `FeedBuilder` owns everything a session accumulates — the
//! temporary directory, the designated implementation directory, the
//! retrieval method, digest, candidates, icons, URI — and composes
//! the final feed document. Candidate detection and digest generation
//! are idempotent for an unchanged implementation directory and
//! recomputed whenever it changes; stale results are never reused.

pub mod commands;
pub mod signing;

pub use commands::{generate_commands, Command, COMMAND_RUN};
pub use signing::{Ed25519Signer, FeedSignature, Signer};

use crate::candidates::{self, Candidate};
use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::manifest::{self, ManifestDigest};
use crate::paths;
use crate::progress::ProgressTracker;
use crate::retrieve::{RetrievalMethod, Staged};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};
use url::Url;

/// A published icon reference on the feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Icon {
    pub href: String,
    pub mime_type: String,
}

/// Retrieval section of the feed document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalDoc {
    pub method: String,
    pub href: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extract: Option<String>,
}

/// Digest section of the feed document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigestDoc {
    pub sha256: String,
    /// Legacy digest variant
    pub sha1: String,
}

/// The assembled feed document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feed {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    pub retrieval: RetrievalDoc,
    pub digest: DigestDoc,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub icons: Vec<Icon>,
    pub commands: Vec<Command>,
}

impl Feed {
    /// Serialize to the structured-text feed document
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Parse(e.to_string()))
    }
}

/// A feed document plus its detached signature
#[derive(Debug, Clone)]
pub struct SignedFeed {
    pub document: String,
    pub signature: FeedSignature,
}

impl SignedFeed {
    /// Write the document to `path` and the signature next to it
    /// (`<path>.sig`); returns the signature path
    pub fn save(&self, path: &Path) -> Result<PathBuf> {
        std::fs::write(path, &self.document).map_err(|e| Error::from_io(path, e))?;

        let mut sig_name = path.as_os_str().to_os_string();
        sig_name.push(".sig");
        let sig_path = PathBuf::from(sig_name);
        let sig_toml =
            toml::to_string_pretty(&self.signature).map_err(|e| Error::Parse(e.to_string()))?;
        std::fs::write(&sig_path, sig_toml).map_err(|e| Error::from_io(&sig_path, e))?;

        info!("Saved signed feed to {}", path.display());
        Ok(sig_path)
    }
}

/// Top-level orchestrator assembling a feed out of pipeline results
///
/// Owns the session's temporary directory; dropping the builder
/// deletes it along with everything staged, unless the implementation
/// directory was explicitly promoted via
/// [`FeedBuilder::keep_temporary_dir`].
#[derive(Default)]
pub struct FeedBuilder {
    temp_dir: Option<TempDir>,
    staged_root: Option<PathBuf>,
    implementation_dir: Option<PathBuf>,
    retrieval_method: Option<RetrievalMethod>,
    digest: Option<ManifestDigest>,
    candidates: Vec<Candidate>,
    main_candidate: Option<usize>,
    commands: Vec<Command>,
    icons: Vec<Icon>,
    uri: Option<Url>,
    /// Bumped whenever the implementation directory changes; cached
    /// candidates and digests are tagged with it
    generation: u64,
    digest_generation: Option<u64>,
    candidates_generation: Option<u64>,
}

impl FeedBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of a staged retrieval, recording its method
    ///
    /// Returns the staged primary path (the single file, the
    /// installer binary, or the unpacked archive root). Single files
    /// designate their directory as the implementation directory
    /// immediately; archives designate the unpacked root (narrowable
    /// via [`FeedBuilder::set_extract`]); installer staging leaves it
    /// unset until capture decides.
    pub fn adopt_staged(&mut self, staged: Staged, method: RetrievalMethod) -> PathBuf {
        let (dir, primary) = staged.into_parts();

        self.implementation_dir = match method {
            RetrievalMethod::SingleFile { .. } => Some(dir.path().to_path_buf()),
            RetrievalMethod::Archive { .. } => Some(primary.clone()),
            RetrievalMethod::Installer { .. } => None,
        };
        self.staged_root = Some(primary.clone());
        self.retrieval_method = Some(method);
        self.temp_dir = Some(dir);
        self.bump_generation();
        primary
    }

    /// Root of the session-owned temporary directory
    pub fn temp_dir_path(&self) -> Result<&Path> {
        self.temp_dir
            .as_ref()
            .map(TempDir::path)
            .ok_or_else(|| Error::IncompleteFeed("nothing staged yet".to_string()))
    }

    /// Narrow the implementation directory to a subtree of the
    /// unpacked archive ("." or "" selects the whole archive)
    pub fn set_extract(&mut self, subpath: &str) -> Result<()> {
        if paths::is_breakout_path(subpath) {
            return Err(Error::BreakoutPath(subpath.to_string()));
        }

        let staged_root = self.staged_root.clone().ok_or_else(|| {
            Error::IncompleteFeed("no unpacked archive to select a subtree of".to_string())
        })?;

        let target = if subpath.is_empty() || subpath == "." {
            staged_root
        } else {
            staged_root.join(subpath)
        };
        if !target.is_dir() {
            return Err(Error::InvalidPath(format!(
                "extract subpath is not a directory: {}",
                target.display()
            )));
        }

        if let Some(RetrievalMethod::Archive { extract, .. }) = self.retrieval_method.as_mut() {
            *extract = Some(subpath.to_string());
        }
        self.implementation_dir = Some(target);
        self.bump_generation();
        Ok(())
    }

    /// Designate an implementation directory directly
    ///
    /// Must be contained in the session's temporary directory; that
    /// invariant is what lets disposal reclaim everything.
    pub fn set_implementation_dir(&mut self, dir: PathBuf) -> Result<()> {
        let root = self.temp_dir_path()?;
        if !dir.starts_with(root) {
            return Err(Error::InvalidPath(format!(
                "{} is outside the session temporary directory",
                dir.display()
            )));
        }
        self.implementation_dir = Some(dir);
        self.bump_generation();
        Ok(())
    }

    pub fn implementation_dir(&self) -> Option<&Path> {
        self.implementation_dir.as_deref()
    }

    pub fn retrieval_method(&self) -> Option<&RetrievalMethod> {
        self.retrieval_method.as_ref()
    }

    /// Replace the retrieval method (used when captured files are
    /// re-packaged into a hosted archive)
    pub fn set_retrieval_method(&mut self, method: RetrievalMethod) {
        self.retrieval_method = Some(method);
    }

    fn bump_generation(&mut self) {
        self.generation += 1;
        debug!("Implementation directory changed (generation {})", self.generation);
    }

    fn require_implementation_dir(&self) -> Result<PathBuf> {
        self.implementation_dir.clone().ok_or_else(|| {
            Error::IncompleteFeed("implementation directory not designated".to_string())
        })
    }

    /// Detect entry-point candidates in the implementation directory
    ///
    /// Idempotent while the implementation directory is unchanged;
    /// recomputed from scratch after every change. Exactly one
    /// detected candidate becomes the main candidate automatically.
    pub fn detect_candidates(&mut self, cancel: &CancelToken) -> Result<&[Candidate]> {
        let dir = self.require_implementation_dir()?;

        if self.candidates_generation != Some(self.generation) {
            self.candidates = candidates::detect(&dir, cancel)?;
            self.candidates_generation = Some(self.generation);
            self.main_candidate = if self.candidates.len() == 1 {
                Some(0)
            } else {
                None
            };
            self.commands.clear();
            info!(
                "Detected {} candidate(s) in {}",
                self.candidates.len(),
                dir.display()
            );
        }

        Ok(&self.candidates)
    }

    /// Compute the manifest digest of the implementation directory
    ///
    /// Idempotent while the implementation directory is unchanged.
    /// The empty sentinel is surfaced as `EmptyDigest` — nothing to
    /// ship — and the caller may change input and retry.
    pub fn generate_digest(
        &mut self,
        cancel: &CancelToken,
        progress: &dyn ProgressTracker,
    ) -> Result<&ManifestDigest> {
        let dir = self.require_implementation_dir()?;

        if self.digest_generation != Some(self.generation) {
            let digest = manifest::compute_digest(&dir, cancel, progress)?;
            self.digest = Some(digest);
            self.digest_generation = Some(self.generation);
        }

        match self.digest.as_ref() {
            Some(digest) if digest.is_empty_sentinel() => Err(Error::EmptyDigest),
            Some(digest) => Ok(digest),
            None => Err(Error::IncompleteFeed("digest not generated".to_string())),
        }
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn main_candidate(&self) -> Option<&Candidate> {
        self.main_candidate.and_then(|i| self.candidates.get(i))
    }

    /// Select the main candidate by index into [`FeedBuilder::candidates`]
    pub fn set_main_candidate(&mut self, index: usize) -> Result<()> {
        if index >= self.candidates.len() {
            return Err(Error::Parse(format!(
                "candidate index {} out of range ({} candidates)",
                index,
                self.candidates.len()
            )));
        }
        self.main_candidate = Some(index);
        self.commands.clear();
        Ok(())
    }

    /// Generate run commands for the main candidate
    pub fn generate_commands(&mut self) -> Result<&[Command]> {
        if self.candidates.is_empty() {
            return Err(Error::NoEntryPoints);
        }
        let main = self
            .main_candidate()
            .ok_or_else(|| Error::IncompleteFeed("main candidate not selected".to_string()))?;

        self.commands = commands::generate_commands(main);
        Ok(&self.commands)
    }

    pub fn add_icon(&mut self, icon: Icon) {
        self.icons.push(icon);
    }

    pub fn set_uri(&mut self, uri: Url) {
        self.uri = Some(uri);
    }

    /// Assemble the feed document from accumulated state
    ///
    /// Fails with `IncompleteFeed` when the digest is missing or the
    /// empty sentinel, no main candidate is selected, no retrieval
    /// method was chosen, or the main candidate has no name and no
    /// run command.
    pub fn assemble(&self) -> Result<Feed> {
        let digest = self
            .digest
            .as_ref()
            .ok_or_else(|| Error::IncompleteFeed("manifest digest not generated".to_string()))?;
        if digest.is_empty_sentinel() {
            return Err(Error::IncompleteFeed(
                "manifest digest is the empty sentinel".to_string(),
            ));
        }

        let main = self
            .main_candidate()
            .ok_or_else(|| Error::IncompleteFeed("main candidate not selected".to_string()))?;

        let method = self
            .retrieval_method
            .as_ref()
            .ok_or_else(|| Error::IncompleteFeed("retrieval method not chosen".to_string()))?;

        let name = main
            .name
            .clone()
            .ok_or_else(|| Error::IncompleteFeed("feed has no name".to_string()))?;

        let commands = if self.commands.is_empty() {
            commands::generate_commands(main)
        } else {
            self.commands.clone()
        };
        if commands.is_empty() {
            return Err(Error::IncompleteFeed(
                "main candidate yields no run command".to_string(),
            ));
        }

        let retrieval = match method {
            RetrievalMethod::SingleFile { href } => RetrievalDoc {
                method: method.kind_name().to_string(),
                href: href.to_string(),
                mime_type: None,
                extract: None,
            },
            RetrievalMethod::Archive {
                href,
                mime_type,
                extract,
            } => RetrievalDoc {
                method: method.kind_name().to_string(),
                href: href.to_string(),
                mime_type: mime_type.clone(),
                extract: extract.clone(),
            },
            RetrievalMethod::Installer { href } => RetrievalDoc {
                method: method.kind_name().to_string(),
                href: href.to_string(),
                mime_type: None,
                extract: None,
            },
        };

        Ok(Feed {
            name,
            version: main.version.clone(),
            summary: main.summary.clone(),
            uri: self.uri.as_ref().map(Url::to_string),
            retrieval,
            digest: DigestDoc {
                sha256: digest.sha256.clone(),
                sha1: digest.sha1.clone(),
            },
            icons: self.icons.clone(),
            commands,
        })
    }

    /// Terminal operation: assemble the feed and delegate to the
    /// signing collaborator
    pub fn build(&self, signer: &dyn Signer) -> Result<SignedFeed> {
        let feed = self.assemble()?;
        let document = feed.to_toml()?;
        let signature = signer.sign(document.as_bytes())?;
        Ok(SignedFeed {
            document,
            signature,
        })
    }

    /// Promote the temporary directory to a kept artifact
    ///
    /// Disposal normally deletes it on every exit path; after this
    /// call the caller owns the returned directory.
    pub fn keep_temporary_dir(mut self) -> Option<PathBuf> {
        self.temp_dir.take().map(TempDir::into_path)
    }
}

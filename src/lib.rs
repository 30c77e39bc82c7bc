// src/lib.rs

//! Feedforge
//!
//! Builds signed, content-addressed software distribution feeds by
//! observing what an installer does to a filesystem, isolating the
//! files it deposited, and packaging them with a manifest digest.
//!
//! # Architecture
//!
//! - Capture-first: before/after snapshot diffing recovers installer
//!   effects without sandboxing the installer
//! - Breakout-safe: every archive entry path is validated before
//!   anything is written
//! - Content-addressed: manifest digests depend on names, content and
//!   executable bits only, never on filesystem metadata
//! - Narrow seams: transport, archive codecs, signing and process
//!   execution sit behind traits with shipped defaults

pub mod archive;
pub mod cancel;
pub mod candidates;
pub mod capture;
pub mod cli;
mod error;
pub mod feed;
pub mod fetch;
pub mod hash;
pub mod manifest;
pub mod paths;
pub mod progress;
pub mod retrieve;
pub mod run;
pub mod snapshot;

pub use cancel::CancelToken;
pub use candidates::{Candidate, ExecutableKind};
pub use capture::{CaptureSession, SessionState};
pub use error::{Error, Result};
pub use feed::{Ed25519Signer, Feed, FeedBuilder, SignedFeed, Signer};
pub use hash::{Hash, HashAlgorithm, Hasher};
pub use manifest::{compute_digest, ManifestDigest};
pub use retrieve::{RetrievalMethod, Stager};
pub use snapshot::{Snapshot, SnapshotDiff};

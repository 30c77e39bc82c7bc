// src/cli.rs
//! CLI definitions for the feedforge tool
//!
//! This module contains the command-line interface definitions using
//! clap plus the indicatif-backed progress tracker the binary hands
//! to library calls. Command implementations live in `main.rs`.

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use crate::progress::ProgressTracker;

#[derive(Parser)]
#[command(name = "feedforge")]
#[command(author = "Feedforge Project")]
#[command(version)]
#[command(about = "Build signed software distribution feeds from installer captures", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compute the manifest digest of an implementation directory
    Digest {
        /// Directory to digest
        dir: String,

        /// Algorithm to print (sha256 or sha1); both when omitted
        #[arg(short, long)]
        algorithm: Option<String>,
    },

    /// Detect runnable entry points in an implementation directory
    Detect {
        /// Directory to scan
        dir: String,
    },

    /// Extract an archive with breakout-path validation
    Extract {
        /// Archive file to unpack
        archive: String,

        /// Destination directory (must not exist)
        dest: String,

        /// Mime type override; sniffed from name and magic bytes when
        /// omitted
        #[arg(short, long)]
        mime_type: Option<String>,
    },

    /// Stage a retrieval method into a kept directory
    Stage {
        /// Download URL
        url: String,

        /// Use a local copy instead of downloading
        #[arg(short, long)]
        local: Option<String>,

        /// Directory to keep the staged result in
        #[arg(short, long)]
        out: String,
    },

    /// Generate an ed25519 feed signing key pair
    Keygen {
        /// Private key output path
        #[arg(long, default_value = "feed.key")]
        private: String,

        /// Public key output path
        #[arg(long, default_value = "feed.pub")]
        public: String,

        /// Human-readable key identifier
        #[arg(long)]
        key_id: Option<String>,
    },
}

/// Progress tracker backed by an indicatif bar
pub struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    pub fn new() -> Self {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{msg} [{bar:40}] {pos}/{len}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        Self { bar }
    }
}

impl Default for BarProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressTracker for BarProgress {
    fn set_message(&self, message: &str) {
        self.bar.set_message(message.to_string());
    }

    fn increment(&self, amount: u64) {
        self.bar.inc(amount);
    }

    fn set_length(&self, length: u64) {
        self.bar.set_length(length);
    }

    fn position(&self) -> u64 {
        self.bar.position()
    }

    fn length(&self) -> u64 {
        self.bar.length().unwrap_or(0)
    }

    fn finish_with_message(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }
}

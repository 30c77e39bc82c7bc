// src/progress.rs

//! Progress reporting for long-running pipeline stages
//!
//! The `ProgressTracker` trait is the narrow surface stages report
//! through. Implementations:
//! - `SilentProgress`: no-op for tests and scripted callers
//! - `LogProgress`: logs progress to tracing at intervals
//!
//! Hosts with richer UIs (progress bars, wizards) implement the trait
//! themselves; the CLI binary wraps indicatif this way.

use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// Core trait for progress tracking
///
/// Implementations must be thread-safe so a host can observe progress
/// from its control thread while a stage runs on a worker.
pub trait ProgressTracker: Send + Sync {
    /// Set the current status message
    fn set_message(&self, message: &str);

    /// Increment progress by the given amount
    fn increment(&self, amount: u64);

    /// Set the total (length) of the progress
    fn set_length(&self, length: u64);

    /// Get current position
    fn position(&self) -> u64;

    /// Get total length
    fn length(&self) -> u64;

    /// Finish progress with a message
    fn finish_with_message(&self, message: &str);
}

/// Silent progress tracker (no-op)
#[derive(Debug, Default)]
pub struct SilentProgress {
    position: AtomicU64,
    length: AtomicU64,
}

impl SilentProgress {
    /// Create a new silent progress tracker
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressTracker for SilentProgress {
    fn set_message(&self, _message: &str) {}

    fn increment(&self, amount: u64) {
        self.position.fetch_add(amount, Ordering::Relaxed);
    }

    fn set_length(&self, length: u64) {
        self.length.store(length, Ordering::Relaxed);
    }

    fn position(&self) -> u64 {
        self.position.load(Ordering::Relaxed)
    }

    fn length(&self) -> u64 {
        self.length.load(Ordering::Relaxed)
    }

    fn finish_with_message(&self, _message: &str) {}
}

/// Logging progress tracker
///
/// Logs updates to tracing at info level, roughly ten times over the
/// tracked length to avoid log spam.
#[derive(Debug)]
pub struct LogProgress {
    name: String,
    position: AtomicU64,
    length: AtomicU64,
}

impl LogProgress {
    /// Create a new logging progress tracker
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            position: AtomicU64::new(0),
            length: AtomicU64::new(0),
        }
    }
}

impl ProgressTracker for LogProgress {
    fn set_message(&self, message: &str) {
        info!("{}: {}", self.name, message);
    }

    fn increment(&self, amount: u64) {
        let old_pos = self.position.fetch_add(amount, Ordering::Relaxed);
        let new_pos = old_pos + amount;
        let length = self.length.load(Ordering::Relaxed);

        if length > 0 {
            let interval = std::cmp::max(1, length / 10);
            if new_pos / interval > old_pos / interval {
                let percent = (new_pos * 100) / length;
                info!("{}: {}% ({}/{})", self.name, percent, new_pos, length);
            }
        }
    }

    fn set_length(&self, length: u64) {
        self.length.store(length, Ordering::Relaxed);
    }

    fn position(&self) -> u64 {
        self.position.load(Ordering::Relaxed)
    }

    fn length(&self) -> u64 {
        self.length.load(Ordering::Relaxed)
    }

    fn finish_with_message(&self, message: &str) {
        info!("{}: {}", self.name, message);
    }
}

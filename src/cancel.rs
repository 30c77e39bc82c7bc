// src/cancel.rs

//! Cooperative cancellation for long-running pipeline stages
//!
//! Every stage that enumerates, hashes, downloads, or extracts checks
//! its token at natural breakpoints (per file, per chunk). The host
//! hands out clones of one token; flipping it makes the active stage
//! return `Error::Cancelled` and unwind with a consistent filesystem.

use crate::error::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared cancellation flag
///
/// Cloning is cheap; all clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a fresh, un-cancelled token
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; all running stages observe it at their
    /// next checkpoint
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Checkpoint: return `Error::Cancelled` if cancellation was
    /// requested
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

// src/run.rs

//! Installer process execution seam
//!
//! The capture session blocks on the installer's exit but does not
//! manage sandboxing, console attachment, or elevation — that is the
//! host's business. The shipped `ProcessRunner` spawns the installer
//! directly, with an optional timeout.

use crate::error::{Error, Result};
use std::path::Path;
use std::process::Command;
use std::time::Duration;
use tracing::info;
use wait_timeout::ChildExt;

/// Process-execution seam
pub trait InstallerRunner {
    /// Run the installer and block until it exits
    ///
    /// A non-zero exit is an `Installer` error; the session stays
    /// re-runnable.
    fn run(&self, executable: &Path) -> Result<()>;
}

/// Direct process spawner
pub struct ProcessRunner {
    timeout: Option<Duration>,
}

impl ProcessRunner {
    /// Runner that waits for the installer indefinitely
    pub fn new() -> Self {
        Self { timeout: None }
    }

    /// Runner that kills the installer after `timeout`
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl InstallerRunner for ProcessRunner {
    fn run(&self, executable: &Path) -> Result<()> {
        info!("Running installer {}", executable.display());

        let mut child = Command::new(executable)
            .spawn()
            .map_err(|e| Error::from_io(executable, e))?;

        let status = match self.timeout {
            Some(timeout) => match child.wait_timeout(timeout).map_err(Error::Io)? {
                Some(status) => status,
                None => {
                    child.kill().map_err(Error::Io)?;
                    child.wait().map_err(Error::Io)?;
                    return Err(Error::Installer(format!(
                        "{} timed out after {:?}",
                        executable.display(),
                        timeout
                    )));
                }
            },
            None => child.wait().map_err(Error::Io)?,
        };

        if status.success() {
            Ok(())
        } else {
            Err(Error::Installer(format!(
                "{} exited with {}",
                executable.display(),
                status
            )))
        }
    }
}

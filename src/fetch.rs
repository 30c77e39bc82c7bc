// src/fetch.rs

//! HTTP transport for retrieval staging
//!
//! The `Transport` trait is the narrow seam the retrieval stager
//! downloads through. The shipped `HttpTransport` streams over
//! blocking reqwest; failures are classified and surfaced, never
//! retried here — retry policy belongs to the caller.

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::progress::ProgressTracker;
use reqwest::blocking::Client;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Default timeout for HTTP requests (30 seconds)
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Buffer size for streaming downloads (8 KB)
const STREAM_BUFFER_SIZE: usize = 8192;

/// Download transport seam
///
/// Fetches a URI to a local file. On any failure (including
/// cancellation) no partial file may remain at `dest`.
pub trait Transport {
    fn fetch(
        &self,
        url: &Url,
        dest: &Path,
        cancel: &CancelToken,
        progress: &dyn ProgressTracker,
    ) -> Result<()>;
}

/// Blocking HTTP transport over reqwest
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Create a new transport with the default timeout
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::Transport(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    fn fetch_inner(
        &self,
        url: &Url,
        dest: &Path,
        cancel: &CancelToken,
        progress: &dyn ProgressTracker,
    ) -> Result<()> {
        debug!("Fetching {} -> {}", url, dest.display());

        let mut response = self
            .client
            .get(url.as_str())
            .send()
            .map_err(|e| Error::Transport(format!("{}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let total_size = response.content_length().unwrap_or(0);
        if total_size > 0 {
            progress.set_length(total_size);
        }
        progress.set_message(url.as_str());

        let mut file = File::create(dest).map_err(|e| Error::from_io(dest, e))?;
        let mut buffer = [0u8; STREAM_BUFFER_SIZE];

        loop {
            cancel.check()?;

            let n = response
                .read(&mut buffer)
                .map_err(|e| Error::Transport(format!("read from {}: {}", url, e)))?;
            if n == 0 {
                break;
            }

            file.write_all(&buffer[..n])
                .map_err(|e| Error::from_io(dest, e))?;
            progress.increment(n as u64);
        }

        Ok(())
    }
}

impl Transport for HttpTransport {
    fn fetch(
        &self,
        url: &Url,
        dest: &Path,
        cancel: &CancelToken,
        progress: &dyn ProgressTracker,
    ) -> Result<()> {
        match self.fetch_inner(url, dest, cancel, progress) {
            Ok(()) => Ok(()),
            Err(e) => {
                // No partial file may survive a failed or cancelled fetch
                let _ = std::fs::remove_file(dest);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::SilentProgress;

    #[test]
    fn test_refused_connection_classified_as_transport() {
        let transport = HttpTransport::new().unwrap();
        let dir = tempfile::TempDir::new().unwrap();
        let dest = dir.path().join("payload");

        // Reserved port on localhost, nothing listening
        let url = Url::parse("http://127.0.0.1:1/file").unwrap();
        let err = transport
            .fetch(&url, &dest, &CancelToken::new(), &SilentProgress::new())
            .unwrap_err();

        assert!(matches!(err, Error::Transport(_)));
        assert!(!dest.exists());
    }

    #[test]
    fn test_pre_cancelled_fetch_leaves_nothing() {
        let transport = HttpTransport::new().unwrap();
        let dir = tempfile::TempDir::new().unwrap();
        let dest = dir.path().join("payload");

        let cancel = CancelToken::new();
        cancel.cancel();

        let url = Url::parse("http://127.0.0.1:1/file").unwrap();
        let err = transport
            .fetch(&url, &dest, &cancel, &SilentProgress::new())
            .unwrap_err();

        // Either the connection fails first or the cancel checkpoint
        // fires; both must leave no partial file behind
        assert!(matches!(err, Error::Transport(_) | Error::Cancelled));
        assert!(!dest.exists());
    }
}

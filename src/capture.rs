// src/capture.rs

//! Installer capture sessions
//!
//! A capture session observes what an installer does to a filesystem:
//! snapshot a probe root, let the operator run the installer, diff,
//! then either extract the installer binary as an archive or collect
//! the diffed files into a fresh archive. Every operation validates
//! the session state at entry — callers cannot drive the pipeline out
//! of order, they get `InvalidSessionState` instead.
//!
//! The session owns only capture state (snapshots, diff, paths); the
//! temporary directory belongs to the `FeedBuilder` and survives a
//! session rollback.

use crate::archive::{self, extract_archive};
use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::feed::FeedBuilder;
use crate::progress::ProgressTracker;
use crate::retrieve::{RetrievalMethod, Stager};
use crate::run::InstallerRunner;
use crate::snapshot::{Snapshot, SnapshotDiff};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use url::Url;

/// Lifecycle of a capture session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    InstallerStaged,
    Snapshotted,
    Diffed,
    ArchiveExtracted,
    FilesCollected,
    Finished,
}

impl SessionState {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::InstallerStaged => "installer-staged",
            Self::Snapshotted => "snapshotted",
            Self::Diffed => "diffed",
            Self::ArchiveExtracted => "archive-extracted",
            Self::FilesCollected => "files-collected",
            Self::Finished => "finished",
        }
    }
}

/// State machine orchestrating one installer capture
pub struct CaptureSession {
    state: SessionState,
    installer_path: Option<PathBuf>,
    probe_root: Option<PathBuf>,
    before: Option<Snapshot>,
    installation_dir: Option<PathBuf>,
    diff: Option<SnapshotDiff>,
}

impl Default for CaptureSession {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureSession {
    pub fn new() -> Self {
        Self {
            state: SessionState::Created,
            installer_path: None,
            probe_root: None,
            before: None,
            installation_dir: None,
            diff: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn expect_state(&self, allowed: &[SessionState], expected: &'static str) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(Error::InvalidSessionState {
                expected,
                found: self.state.name(),
            })
        }
    }

    /// Stage the installer binary into the builder's temporary
    /// directory (Created → InstallerStaged)
    pub fn stage_installer(
        &mut self,
        builder: &mut FeedBuilder,
        stager: &Stager<'_>,
        href: Url,
        local_override: Option<&Path>,
        cancel: &CancelToken,
        progress: &dyn ProgressTracker,
    ) -> Result<()> {
        self.expect_state(&[SessionState::Created], "created")?;

        let method = RetrievalMethod::Installer { href };
        let staged = stager.stage(&method, local_override, cancel, progress)?;
        let installer = builder.adopt_staged(staged, method);

        info!("Installer staged at {}", installer.display());
        self.installer_path = Some(installer);
        self.state = SessionState::InstallerStaged;
        Ok(())
    }

    /// Take and pin the before snapshot of the probe root
    /// (InstallerStaged → Snapshotted)
    ///
    /// The concrete installation directory is designated later; it
    /// must live under the probe root.
    pub fn snapshot_before(
        &mut self,
        probe_root: &Path,
        cancel: &CancelToken,
        progress: &dyn ProgressTracker,
    ) -> Result<()> {
        self.expect_state(&[SessionState::InstallerStaged], "installer-staged")?;

        let snapshot = Snapshot::capture(probe_root, cancel)?;
        // Pin now: the installer is about to overwrite this state, and
        // same-size modifications are only detectable against pinned
        // fingerprints
        snapshot.pin_fingerprints(cancel, progress)?;

        debug!(
            "Before snapshot of {}: {} entries",
            probe_root.display(),
            snapshot.len()
        );
        self.probe_root = Some(probe_root.to_path_buf());
        self.before = Some(snapshot);
        self.state = SessionState::Snapshotted;
        Ok(())
    }

    /// Designate the directory the installer put the software in
    pub fn set_installation_dir(&mut self, dir: PathBuf) -> Result<()> {
        self.expect_state(&[SessionState::Snapshotted], "snapshotted")?;

        let probe_root = self.probe_root.as_deref().ok_or(Error::InvalidSessionState {
            expected: "before snapshot taken",
            found: "no probe root",
        })?;
        if !dir.starts_with(probe_root) {
            return Err(Error::InvalidPath(format!(
                "{} is outside the probe root {}",
                dir.display(),
                probe_root.display()
            )));
        }

        self.installation_dir = Some(dir);
        Ok(())
    }

    pub fn installation_dir(&self) -> Option<&Path> {
        self.installation_dir.as_deref()
    }

    /// Run the installer and block until it exits (stays Snapshotted)
    ///
    /// A failed run surfaces as `Installer` but leaves the session
    /// re-runnable.
    pub fn run_installer(&mut self, runner: &dyn InstallerRunner) -> Result<()> {
        self.expect_state(&[SessionState::Snapshotted], "snapshotted")?;

        let installer = self.installer_path.as_deref().ok_or(Error::InvalidSessionState {
            expected: "installer staged",
            found: "no installer path",
        })?;
        runner.run(installer)
    }

    /// Diff the installation directory against the before snapshot
    /// (Snapshotted → Diffed)
    ///
    /// An empty diff means nothing was installed; that is an error
    /// (`EmptyDiff`), not a silent success, and the session stays
    /// `Snapshotted` so the operator can re-run or re-designate.
    pub fn diff(&mut self, cancel: &CancelToken) -> Result<SnapshotDiff> {
        self.expect_state(&[SessionState::Snapshotted], "snapshotted")?;

        let before = self.before.as_ref().ok_or(Error::InvalidSessionState {
            expected: "before snapshot taken",
            found: "no before snapshot",
        })?;
        let installation_dir = self.installation_dir.clone().ok_or(Error::InvalidSessionState {
            expected: "installation directory designated",
            found: "no installation directory",
        })?;
        let probe_root = self.probe_root.as_deref().ok_or(Error::InvalidSessionState {
            expected: "before snapshot taken",
            found: "no probe root",
        })?;

        // Installer never created the target: nothing was installed
        if !installation_dir.exists() {
            return Err(Error::EmptyDiff(installation_dir.display().to_string()));
        }

        let prefix = installation_dir
            .strip_prefix(probe_root)
            .map_err(|e| Error::Parse(format!("{}: {}", installation_dir.display(), e)))?;
        let before_view = before.subview(prefix);
        let after = Snapshot::capture(&installation_dir, cancel)?;

        let diff = Snapshot::diff(&before_view, &after, cancel)?;
        if diff.is_empty() {
            return Err(Error::EmptyDiff(installation_dir.display().to_string()));
        }

        info!(
            "Captured {} path(s) under {}",
            diff.len(),
            installation_dir.display()
        );
        self.diff = Some(diff.clone());
        self.state = SessionState::Diffed;
        Ok(diff)
    }

    pub fn snapshot_diff(&self) -> Option<&SnapshotDiff> {
        self.diff.as_ref()
    }

    /// Treat the installer binary itself as an archive container
    /// ({InstallerStaged, Snapshotted, Diffed} → ArchiveExtracted)
    ///
    /// Some installer formats are extractable containers; when the
    /// sniffed format is not one, this fails with
    /// `UnsupportedFormat` and the caller falls back to diff-based
    /// collection. The session state is unchanged on failure.
    pub fn extract_installer_as_archive(
        &mut self,
        builder: &mut FeedBuilder,
        cancel: &CancelToken,
        progress: &dyn ProgressTracker,
    ) -> Result<()> {
        self.expect_state(
            &[
                SessionState::InstallerStaged,
                SessionState::Snapshotted,
                SessionState::Diffed,
            ],
            "installer-staged, snapshotted or diffed",
        )?;

        let installer = self.installer_path.clone().ok_or(Error::InvalidSessionState {
            expected: "installer staged",
            found: "no installer path",
        })?;

        let mime = archive::sniff_mime_type(&installer)?.ok_or_else(|| {
            Error::UnsupportedFormat(format!(
                "{} is not a recognized archive container",
                installer.display()
            ))
        })?;

        let dest = builder.temp_dir_path()?.join("unpacked-installer");
        extract_archive(&installer, &dest, mime, cancel, progress)?;
        builder.set_implementation_dir(dest)?;

        info!("Installer unpacked as {} archive", mime);
        self.state = SessionState::ArchiveExtracted;
        Ok(())
    }

    /// Package the diffed files into a new archive (Diffed →
    /// FilesCollected)
    ///
    /// Copies the captured files into the builder's temporary
    /// directory, designates that copy as the implementation
    /// directory, writes the archive to `archive_path`, and records
    /// `upload_url` as the hosting location of the resulting archive
    /// retrieval method.
    pub fn collect_files(
        &mut self,
        builder: &mut FeedBuilder,
        archive_path: &Path,
        upload_url: Url,
        cancel: &CancelToken,
        progress: &dyn ProgressTracker,
    ) -> Result<()> {
        self.expect_state(&[SessionState::Diffed], "diffed")?;

        let diff = self.diff.clone().ok_or(Error::InvalidSessionState {
            expected: "diff computed",
            found: "no diff",
        })?;
        let installation_dir = self.installation_dir.clone().ok_or(Error::InvalidSessionState {
            expected: "installation directory designated",
            found: "no installation directory",
        })?;

        let archive_name = archive_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("");
        let mime = archive::guess_mime_type(archive_name).ok_or_else(|| {
            Error::UnsupportedFormat(format!(
                "cannot infer archive type from {}",
                archive_path.display()
            ))
        })?;

        // Copy the captured files into session-owned space
        let capture_root = builder.temp_dir_path()?.join("capture");
        let mut collected = Vec::new();
        for rel in diff.paths() {
            cancel.check()?;

            let src = installation_dir.join(rel);
            let dst = capture_root.join(rel);
            if let Some(parent) = dst.parent() {
                fs::create_dir_all(parent).map_err(|e| Error::from_io(parent, e))?;
            }
            fs::copy(&src, &dst).map_err(|e| Error::from_io(&src, e))?;
            collected.push(rel.clone());
            progress.increment(1);
        }

        archive::create_archive(&capture_root, &collected, archive_path, mime, cancel)?;
        builder.set_implementation_dir(capture_root)?;
        builder.set_retrieval_method(RetrievalMethod::Archive {
            href: upload_url,
            mime_type: Some(mime.to_string()),
            extract: None,
        });

        info!(
            "Collected {} file(s) into {}",
            collected.len(),
            archive_path.display()
        );
        self.state = SessionState::FilesCollected;
        Ok(())
    }

    /// Finish the capture ({ArchiveExtracted, FilesCollected} →
    /// Finished)
    ///
    /// Ensures candidates were detected over the final implementation
    /// directory (none is `NoEntryPoints`) and triggers command
    /// generation. Terminal: the session accepts no further calls.
    pub fn finish(&mut self, builder: &mut FeedBuilder, cancel: &CancelToken) -> Result<()> {
        self.expect_state(
            &[SessionState::ArchiveExtracted, SessionState::FilesCollected],
            "archive-extracted or files-collected",
        )?;

        if builder.detect_candidates(cancel)?.is_empty() {
            return Err(Error::NoEntryPoints);
        }
        builder.generate_commands()?;

        self.state = SessionState::Finished;
        info!("Capture session finished");
        Ok(())
    }

    /// Discard session-owned state and return to `Created`
    ///
    /// The builder's temporary directory is not touched — it belongs
    /// to the feed builder. A finished session cannot be rolled back.
    pub fn rollback(&mut self) -> Result<()> {
        if self.state == SessionState::Finished {
            return Err(Error::InvalidSessionState {
                expected: "any state before finished",
                found: "finished",
            });
        }

        debug!("Rolling back capture session from {}", self.state.name());
        self.installer_path = None;
        self.probe_root = None;
        self.before = None;
        self.installation_dir = None;
        self.diff = None;
        self.state = SessionState::Created;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::Transport;
    use crate::progress::SilentProgress;

    /// Transport double for sessions that stage from local overrides
    struct OfflineTransport;

    impl Transport for OfflineTransport {
        fn fetch(
            &self,
            url: &Url,
            _dest: &Path,
            _cancel: &CancelToken,
            _progress: &dyn ProgressTracker,
        ) -> Result<()> {
            Err(Error::Transport(format!("offline: {}", url)))
        }
    }

    /// Installer double that deposits files into a target directory
    struct FakeInstaller {
        target: PathBuf,
        files: Vec<(String, Vec<u8>)>,
    }

    impl InstallerRunner for FakeInstaller {
        fn run(&self, _executable: &Path) -> Result<()> {
            for (rel, content) in &self.files {
                let path = self.target.join(rel);
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent).map_err(Error::Io)?;
                }
                fs::write(&path, content).map_err(Error::Io)?;
            }
            Ok(())
        }
    }

    fn staged_session(
        installer_bytes: &[u8],
    ) -> (CaptureSession, FeedBuilder, tempfile::TempDir) {
        let fixtures = tempfile::TempDir::new().unwrap();
        let installer = fixtures.path().join("setup.exe");
        fs::write(&installer, installer_bytes).unwrap();

        let transport = OfflineTransport;
        let stager = Stager::new(&transport);
        let mut session = CaptureSession::new();
        let mut builder = FeedBuilder::new();

        session
            .stage_installer(
                &mut builder,
                &stager,
                Url::parse("https://example.com/setup.exe").unwrap(),
                Some(&installer),
                &CancelToken::new(),
                &SilentProgress::new(),
            )
            .unwrap();

        (session, builder, fixtures)
    }

    #[test]
    fn test_lifecycle_requires_order() {
        let mut session = CaptureSession::new();

        // diff before anything is state-machine misuse
        let err = session.diff(&CancelToken::new()).unwrap_err();
        assert!(matches!(err, Error::InvalidSessionState { .. }));

        let mut builder = FeedBuilder::new();
        let err = session.finish(&mut builder, &CancelToken::new()).unwrap_err();
        assert!(matches!(err, Error::InvalidSessionState { .. }));
    }

    #[test]
    fn test_capture_flow_with_collect() {
        let (mut session, mut builder, _fixtures) = staged_session(b"not an archive");
        assert_eq!(session.state(), SessionState::InstallerStaged);

        let probe = tempfile::TempDir::new().unwrap();
        let install_dir = probe.path().join("MyApp");
        fs::create_dir_all(&install_dir).unwrap();
        fs::write(install_dir.join("a.txt"), b"pre-existing").unwrap();

        session
            .snapshot_before(probe.path(), &CancelToken::new(), &SilentProgress::new())
            .unwrap();
        assert_eq!(session.state(), SessionState::Snapshotted);

        session.set_installation_dir(install_dir.clone()).unwrap();

        let installer = FakeInstaller {
            target: install_dir.clone(),
            files: vec![("b.dll".to_string(), b"library code".to_vec())],
        };
        session.run_installer(&installer).unwrap();

        let diff = session.diff(&CancelToken::new()).unwrap();
        assert_eq!(diff.added, vec![PathBuf::from("b.dll")]);
        assert!(diff.modified.is_empty());
        assert_eq!(session.state(), SessionState::Diffed);

        // Installer is no recognized container: fall back to collect
        let err = session
            .extract_installer_as_archive(
                &mut builder,
                &CancelToken::new(),
                &SilentProgress::new(),
            )
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(_)));
        assert_eq!(session.state(), SessionState::Diffed);

        let out = tempfile::TempDir::new().unwrap();
        let archive_path = out.path().join("captured.tar.gz");
        session
            .collect_files(
                &mut builder,
                &archive_path,
                Url::parse("https://example.com/captured.tar.gz").unwrap(),
                &CancelToken::new(),
                &SilentProgress::new(),
            )
            .unwrap();
        assert_eq!(session.state(), SessionState::FilesCollected);
        assert!(archive_path.exists());

        // The archive contains exactly the captured file
        let unpack = out.path().join("unpacked");
        let entries = extract_archive(
            &archive_path,
            &unpack,
            archive::MIME_TAR_GZIP,
            &CancelToken::new(),
            &SilentProgress::new(),
        )
        .unwrap();
        assert_eq!(entries, vec![PathBuf::from("b.dll")]);

        // Retrieval method now points at the upload location
        assert!(matches!(
            builder.retrieval_method(),
            Some(RetrievalMethod::Archive { .. })
        ));
    }

    #[test]
    fn test_empty_diff_is_an_error() {
        let (mut session, _builder, _fixtures) = staged_session(b"installer");

        let probe = tempfile::TempDir::new().unwrap();
        let install_dir = probe.path().join("App");
        fs::create_dir_all(&install_dir).unwrap();
        fs::write(install_dir.join("a.txt"), b"untouched").unwrap();

        session
            .snapshot_before(probe.path(), &CancelToken::new(), &SilentProgress::new())
            .unwrap();
        session.set_installation_dir(install_dir).unwrap();

        // No installer ran; state is identical
        let err = session.diff(&CancelToken::new()).unwrap_err();
        assert!(matches!(err, Error::EmptyDiff(_)));
        // Recoverable: still snapshotted, the operator can retry
        assert_eq!(session.state(), SessionState::Snapshotted);
    }

    #[test]
    fn test_extract_installer_as_archive_from_staged() {
        use crate::archive::{ArchiveCodec, ZipCodec};

        // Build a zip and pass it off as the installer binary
        let payload = tempfile::TempDir::new().unwrap();
        fs::write(payload.path().join("app.sh"), b"#!/bin/sh\necho hi\n").unwrap();
        let zipped = payload.path().join("installer.bin");
        ZipCodec
            .create(
                payload.path(),
                &[PathBuf::from("app.sh")],
                &zipped,
                &CancelToken::new(),
            )
            .unwrap();

        let bytes = fs::read(&zipped).unwrap();
        let (mut session, mut builder, _fixtures) = staged_session(&bytes);

        session
            .extract_installer_as_archive(&mut builder, &CancelToken::new(), &SilentProgress::new())
            .unwrap();
        assert_eq!(session.state(), SessionState::ArchiveExtracted);

        let impl_dir = builder.implementation_dir().unwrap();
        assert!(impl_dir.join("app.sh").exists());

        session.finish(&mut builder, &CancelToken::new()).unwrap();
        assert_eq!(session.state(), SessionState::Finished);
        assert!(builder.main_candidate().is_some());
    }

    #[test]
    fn test_finish_without_entry_points() {
        use crate::archive::{ArchiveCodec, ZipCodec};

        // Installer unpacks to data files only
        let payload = tempfile::TempDir::new().unwrap();
        fs::write(payload.path().join("data.txt"), b"no entry points here").unwrap();
        let zipped = payload.path().join("installer.bin");
        ZipCodec
            .create(
                payload.path(),
                &[PathBuf::from("data.txt")],
                &zipped,
                &CancelToken::new(),
            )
            .unwrap();

        let bytes = fs::read(&zipped).unwrap();
        let (mut session, mut builder, _fixtures) = staged_session(&bytes);

        session
            .extract_installer_as_archive(&mut builder, &CancelToken::new(), &SilentProgress::new())
            .unwrap();

        let err = session.finish(&mut builder, &CancelToken::new()).unwrap_err();
        assert!(matches!(err, Error::NoEntryPoints));
        // Not finished: the operator can go back and change input
        assert_eq!(session.state(), SessionState::ArchiveExtracted);
    }

    #[test]
    fn test_rollback_clears_state() {
        let (mut session, _builder, _fixtures) = staged_session(b"installer");

        let probe = tempfile::TempDir::new().unwrap();
        session
            .snapshot_before(probe.path(), &CancelToken::new(), &SilentProgress::new())
            .unwrap();

        session.rollback().unwrap();
        assert_eq!(session.state(), SessionState::Created);
        assert!(session.installation_dir().is_none());
        assert!(session.snapshot_diff().is_none());
    }

    #[test]
    fn test_finished_session_rejects_everything() {
        use crate::archive::{ArchiveCodec, ZipCodec};

        let payload = tempfile::TempDir::new().unwrap();
        fs::write(payload.path().join("run.sh"), b"#!/bin/sh\n").unwrap();
        let zipped = payload.path().join("installer.bin");
        ZipCodec
            .create(
                payload.path(),
                &[PathBuf::from("run.sh")],
                &zipped,
                &CancelToken::new(),
            )
            .unwrap();

        let bytes = fs::read(&zipped).unwrap();
        let (mut session, mut builder, _fixtures) = staged_session(&bytes);
        session
            .extract_installer_as_archive(&mut builder, &CancelToken::new(), &SilentProgress::new())
            .unwrap();
        session.finish(&mut builder, &CancelToken::new()).unwrap();

        assert!(matches!(
            session.rollback(),
            Err(Error::InvalidSessionState { .. })
        ));
        assert!(matches!(
            session.diff(&CancelToken::new()),
            Err(Error::InvalidSessionState { .. })
        ));
    }
}

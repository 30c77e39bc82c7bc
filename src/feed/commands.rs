// src/feed/commands.rs

//! Run-command generation
//!
//! Binds a candidate to a relative executable path plus whatever
//! interpreter prefix its kind needs.

use crate::candidates::{Candidate, ExecutableKind};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Name of the primary run command
pub const COMMAND_RUN: &str = "run";

/// A run-command descriptor bound into the feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub name: String,
    /// Executable path relative to the implementation directory,
    /// slash-separated
    pub path: String,
    /// Interpreter to launch instead of executing `path` directly
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interpreter: Option<String>,
    /// Arguments inserted between interpreter and path
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
}

fn slash_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Derive the run commands for a candidate
///
/// Directly executable kinds get a bare path; interpreted kinds get
/// their interpreter as a prefix. Installer packages are not runnable
/// and yield no commands.
pub fn generate_commands(candidate: &Candidate) -> Vec<Command> {
    let path = slash_path(&candidate.relative_path);

    match &candidate.kind {
        ExecutableKind::Native(_)
        | ExecutableKind::DotNetAssembly
        | ExecutableKind::WindowsBatch => vec![Command {
            name: COMMAND_RUN.to_string(),
            path,
            interpreter: None,
            args: Vec::new(),
        }],
        ExecutableKind::InterpretedScript { interpreter } => vec![Command {
            name: COMMAND_RUN.to_string(),
            path,
            interpreter: Some(interpreter.clone()),
            args: Vec::new(),
        }],
        ExecutableKind::JavaArchive => vec![Command {
            name: COMMAND_RUN.to_string(),
            path,
            interpreter: Some("java".to_string()),
            args: vec!["-jar".to_string()],
        }],
        ExecutableKind::InstallerPackage { .. } => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidates::BinaryFormat;
    use std::path::PathBuf;

    fn candidate(rel: &str, kind: ExecutableKind) -> Candidate {
        Candidate {
            relative_path: PathBuf::from(rel),
            kind,
            name: None,
            version: None,
            summary: None,
            icon: None,
        }
    }

    #[test]
    fn test_native_binary_runs_directly() {
        let commands = generate_commands(&candidate(
            "bin/app",
            ExecutableKind::Native(BinaryFormat::Elf),
        ));

        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].name, COMMAND_RUN);
        assert_eq!(commands[0].path, "bin/app");
        assert_eq!(commands[0].interpreter, None);
    }

    #[test]
    fn test_script_gets_interpreter() {
        let commands = generate_commands(&candidate(
            "run.py",
            ExecutableKind::InterpretedScript {
                interpreter: "python3".to_string(),
            },
        ));

        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].interpreter.as_deref(), Some("python3"));
        assert!(commands[0].args.is_empty());
    }

    #[test]
    fn test_jar_gets_java_dash_jar() {
        let commands = generate_commands(&candidate("app.jar", ExecutableKind::JavaArchive));

        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].interpreter.as_deref(), Some("java"));
        assert_eq!(commands[0].args, vec!["-jar".to_string()]);
    }

    #[test]
    fn test_installer_package_not_runnable() {
        let commands = generate_commands(&candidate(
            "setup.msi",
            ExecutableKind::InstallerPackage {
                mime_type: crate::archive::MIME_MSI,
            },
        ));
        assert!(commands.is_empty());
    }
}

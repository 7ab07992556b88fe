//! Errors surfaced by the build orchestrator.

use std::io;
use std::path::PathBuf;

use crossforge_runner::{Diagnostics, RunError};
use thiserror::Error;

use crate::config::ConfigError;

/// Errors from [`crate::Toolchain`] operations.
///
/// A returned error always means no usable artifact was produced.
#[derive(Debug, Error)]
pub enum ForgeError {
    #[error("invalid compiler target: {target}")]
    InvalidTarget { target: String },

    #[error("toolchain could not be started: {0}")]
    ToolchainLaunch(#[source] RunError),

    #[error("toolchain failed: {0}")]
    ToolchainExecution(#[source] RunError),

    #[error("toolchain timed out: {0}")]
    TimedOut(#[source] RunError),

    #[error("toolchain cancelled: {0}")]
    Cancelled(#[source] RunError),

    #[error("failed to create cache directory {}: {source}", path.display())]
    CacheDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ForgeError {
    /// Failure context captured by the runner, if a process was involved.
    pub fn diagnostics(&self) -> Option<&Diagnostics> {
        self.run_error().and_then(RunError::diagnostics)
    }

    /// The underlying runner error, if any.
    pub fn run_error(&self) -> Option<&RunError> {
        match self {
            ForgeError::ToolchainLaunch(e)
            | ForgeError::ToolchainExecution(e)
            | ForgeError::TimedOut(e)
            | ForgeError::Cancelled(e) => Some(e),
            _ => None,
        }
    }

    /// Whether the requested target was rejected before any process ran.
    pub fn is_invalid_target(&self) -> bool {
        matches!(self, ForgeError::InvalidTarget { .. })
    }
}

impl From<RunError> for ForgeError {
    fn from(e: RunError) -> Self {
        match e {
            RunError::Launch { .. } => ForgeError::ToolchainLaunch(e),
            RunError::TimedOut { .. } => ForgeError::TimedOut(e),
            RunError::Cancelled { .. } => ForgeError::Cancelled(e),
            RunError::Exit { .. } | RunError::Io { .. } => ForgeError::ToolchainExecution(e),
        }
    }
}

/// Result type for orchestrator operations.
pub type ForgeResult<T> = Result<T, ForgeError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crossforge_runner::{ExitSummary, Invocation};

    fn diagnostics() -> Box<Diagnostics> {
        Box::new(Diagnostics::capture(
            &Invocation::new("go", "."),
            Vec::new(),
            b"boom".to_vec(),
        ))
    }

    #[test]
    fn test_classifies_runner_errors() {
        let launch = ForgeError::from(RunError::Launch {
            program: "garble".to_string(),
            source: io::Error::new(io::ErrorKind::NotFound, "missing"),
            diagnostics: diagnostics(),
        });
        assert!(matches!(launch, ForgeError::ToolchainLaunch(_)));

        let exit = ForgeError::from(RunError::Exit {
            program: "go".to_string(),
            exit: ExitSummary::code(1),
            diagnostics: diagnostics(),
        });
        assert!(matches!(exit, ForgeError::ToolchainExecution(_)));
        assert_eq!(exit.diagnostics().unwrap().stderr_lossy(), "boom");
        assert_eq!(exit.to_string(), "toolchain failed: go failed with exit code 1");
    }

    #[test]
    fn test_invalid_target_has_no_diagnostics() {
        let err = ForgeError::InvalidTarget {
            target: "linux/sparc".to_string(),
        };
        assert!(err.is_invalid_target());
        assert!(err.diagnostics().is_none());
        assert_eq!(err.to_string(), "invalid compiler target: linux/sparc");
    }
}

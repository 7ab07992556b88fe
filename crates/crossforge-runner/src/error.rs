//! Runner errors.

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::diagnostics::{Diagnostics, ExitSummary};

/// Errors from running a process.
///
/// The display form carries only the minimal failure signal; the full
/// context lives in [`RunError::diagnostics`].
#[derive(Debug, Error)]
pub enum RunError {
    #[error("failed to start {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: io::Error,
        diagnostics: Box<Diagnostics>,
    },

    #[error("{program} failed with {exit}")]
    Exit {
        program: String,
        exit: ExitSummary,
        diagnostics: Box<Diagnostics>,
    },

    #[error("{program} timed out after {timeout:?}")]
    TimedOut {
        program: String,
        timeout: Duration,
        diagnostics: Box<Diagnostics>,
    },

    #[error("{program} cancelled")]
    Cancelled {
        program: String,
        diagnostics: Box<Diagnostics>,
    },

    #[error("I/O error supervising {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: io::Error,
    },
}

impl RunError {
    /// The captured failure context, when the child got far enough to
    /// have one.
    pub fn diagnostics(&self) -> Option<&Diagnostics> {
        match self {
            RunError::Launch { diagnostics, .. }
            | RunError::Exit { diagnostics, .. }
            | RunError::TimedOut { diagnostics, .. }
            | RunError::Cancelled { diagnostics, .. } => Some(&**diagnostics),
            RunError::Io { .. } => None,
        }
    }

    /// Program name the error refers to.
    pub fn program(&self) -> &str {
        match self {
            RunError::Launch { program, .. }
            | RunError::Exit { program, .. }
            | RunError::TimedOut { program, .. }
            | RunError::Cancelled { program, .. }
            | RunError::Io { program, .. } => program,
        }
    }

    /// Whether the binary could not be started at all.
    pub fn is_launch_failure(&self) -> bool {
        matches!(self, RunError::Launch { .. })
    }
}

/// Result type for runner operations.
pub type RunResult<T> = Result<T, RunError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invocation::Invocation;

    fn timed_out(timeout: Duration) -> RunError {
        let invocation = Invocation::new("go", "/work");
        RunError::TimedOut {
            program: "go".to_string(),
            timeout,
            diagnostics: Box::new(Diagnostics::capture(&invocation, Vec::new(), Vec::new())),
        }
    }

    #[test]
    fn test_sub_second_timeout_display() {
        let msg = timed_out(Duration::from_millis(300)).to_string();
        assert_eq!(msg, "go timed out after 300ms");
        assert!(!msg.contains("0s"));
    }

    #[test]
    fn test_whole_second_timeout_display() {
        assert_eq!(
            timed_out(Duration::from_secs(1800)).to_string(),
            "go timed out after 1800s"
        );
    }
}

//! Timeout configuration for toolchain invocations
//!
//! - `build_seconds`: wall-clock limit for `build` and `mod` invocations
//! - `probe_seconds`: wall-clock limit for `version` and target discovery
//! - `termination_grace_seconds`: SIGTERM-to-SIGKILL grace period
//!
//! When a limit expires the runner terminates the child's process group
//! and the call fails with a timeout.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Timeout configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Limit for build and module commands (default: 1800 = 30 min)
    pub build_seconds: u64,

    /// Limit for introspection commands (default: 60)
    pub probe_seconds: u64,

    /// Grace period before a terminated child is killed (default: 10)
    pub termination_grace_seconds: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            build_seconds: 1800,
            probe_seconds: 60,
            termination_grace_seconds: 10,
        }
    }
}

impl TimeoutConfig {
    /// Validate bounds
    pub fn validate(&self) -> Result<(), TimeoutValidationError> {
        // build_seconds must be in (0, 86400]
        if self.build_seconds == 0 || self.build_seconds > 86400 {
            return Err(TimeoutValidationError::BuildOutOfBounds {
                value: self.build_seconds,
            });
        }

        // probe_seconds must be in (0, 600]
        if self.probe_seconds == 0 || self.probe_seconds > 600 {
            return Err(TimeoutValidationError::ProbeOutOfBounds {
                value: self.probe_seconds,
            });
        }

        // termination_grace_seconds must be in (0, 300]
        if self.termination_grace_seconds == 0 || self.termination_grace_seconds > 300 {
            return Err(TimeoutValidationError::GraceOutOfBounds {
                value: self.termination_grace_seconds,
            });
        }

        Ok(())
    }

    /// Limit for build and module invocations
    pub fn build(&self) -> Duration {
        Duration::from_secs(self.build_seconds)
    }

    /// Limit for introspection invocations
    pub fn probe(&self) -> Duration {
        Duration::from_secs(self.probe_seconds)
    }

    /// Termination grace period
    pub fn grace(&self) -> Duration {
        Duration::from_secs(self.termination_grace_seconds)
    }
}

/// Timeout validation errors
#[derive(Debug, thiserror::Error)]
pub enum TimeoutValidationError {
    #[error("build_seconds must be in (0, 86400], got {value}")]
    BuildOutOfBounds { value: u64 },

    #[error("probe_seconds must be in (0, 600], got {value}")]
    ProbeOutOfBounds { value: u64 },

    #[error("termination_grace_seconds must be in (0, 300], got {value}")]
    GraceOutOfBounds { value: u64 },
}

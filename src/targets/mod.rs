//! Compile target matrix
//!
//! A target is an `(os, arch)` pair as printed by `go tool dist list`.
//! The matrix is discovered from the installed toolchain rather than
//! compiled in, so it always reflects what the configured toolchain
//! root can actually build.

mod resolver;

pub use resolver::{TargetResolver, DEFAULT_TARGET_CACHE_TTL_SECONDS};

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Separator between OS and architecture in toolchain output.
pub const TARGET_SEPARATOR: char = '/';

/// A compile target.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Target {
    /// Operating system (GOOS), e.g. "linux"
    pub os: String,
    /// Architecture (GOARCH), e.g. "amd64"
    pub arch: String,
}

impl Target {
    /// Create a target from its parts.
    pub fn new(os: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            arch: arch.into(),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.os, TARGET_SEPARATOR, self.arch)
    }
}

/// Reasons a target string is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TargetParseError {
    #[error("missing '/' separator in {0:?}")]
    MissingSeparator(String),

    #[error("empty os or arch in {0:?}")]
    EmptyComponent(String),

    #[error("too many separators in {0:?}")]
    TooManySeparators(String),
}

impl FromStr for Target {
    type Err = TargetParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (os, arch) = s
            .split_once(TARGET_SEPARATOR)
            .ok_or_else(|| TargetParseError::MissingSeparator(s.to_string()))?;
        if arch.contains(TARGET_SEPARATOR) {
            return Err(TargetParseError::TooManySeparators(s.to_string()));
        }
        let (os, arch) = (os.trim(), arch.trim());
        if os.is_empty() || arch.is_empty() {
            return Err(TargetParseError::EmptyComponent(s.to_string()));
        }
        Ok(Target::new(os, arch))
    }
}

/// Set of targets the toolchain can compile for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetMatrix {
    targets: BTreeSet<Target>,
    /// When the matrix was discovered
    pub resolved_at: DateTime<Utc>,
}

impl Default for TargetMatrix {
    fn default() -> Self {
        Self::empty()
    }
}

impl TargetMatrix {
    /// A matrix that accepts nothing.
    pub fn empty() -> Self {
        Self {
            targets: BTreeSet::new(),
            resolved_at: Utc::now(),
        }
    }

    /// Parse newline-delimited `os/arch` output.
    ///
    /// Malformed lines are skipped individually; blank lines are ignored.
    pub fn parse(output: &str) -> Self {
        let mut targets = BTreeSet::new();
        for line in output.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match line.parse::<Target>() {
                Ok(target) => {
                    targets.insert(target);
                }
                Err(e) => debug!("skipping target line: {}", e),
            }
        }
        Self {
            targets,
            resolved_at: Utc::now(),
        }
    }

    /// Whether `target` is supported.
    pub fn contains(&self, target: &Target) -> bool {
        self.targets.contains(target)
    }

    /// Whether the `(os, arch)` pair is supported.
    pub fn supports(&self, os: &str, arch: &str) -> bool {
        self.targets.iter().any(|t| t.os == os && t.arch == arch)
    }

    /// Targets in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &Target> {
        self.targets.iter()
    }

    /// Number of targets.
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// True when nothing is supported.
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Architectures supported for one OS.
    pub fn arches_for(&self, os: &str) -> Vec<&str> {
        self.targets
            .iter()
            .filter(|t| t.os == os)
            .map(|t| t.arch.as_str())
            .collect()
    }
}

impl FromIterator<Target> for TargetMatrix {
    fn from_iter<I: IntoIterator<Item = Target>>(iter: I) -> Self {
        Self {
            targets: iter.into_iter().collect(),
            resolved_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_from_str() {
        let target: Target = "linux/amd64".parse().unwrap();
        assert_eq!(target, Target::new("linux", "amd64"));
        assert_eq!(target.to_string(), "linux/amd64");
    }

    #[test]
    fn test_target_from_str_rejects_malformed() {
        assert!(matches!(
            "linux".parse::<Target>(),
            Err(TargetParseError::MissingSeparator(_))
        ));
        assert!(matches!(
            "/amd64".parse::<Target>(),
            Err(TargetParseError::EmptyComponent(_))
        ));
        assert!(matches!(
            "linux/".parse::<Target>(),
            Err(TargetParseError::EmptyComponent(_))
        ));
        assert!(matches!(
            "linux/arm/v7".parse::<Target>(),
            Err(TargetParseError::TooManySeparators(_))
        ));
    }

    #[test]
    fn test_parse_dist_list_output() {
        let output = "aix/ppc64\nandroid/arm64\ndarwin/arm64\nlinux/amd64\nwindows/amd64\n";
        let matrix = TargetMatrix::parse(output);

        assert_eq!(matrix.len(), 5);
        assert!(matrix.supports("linux", "amd64"));
        assert!(matrix.contains(&Target::new("darwin", "arm64")));
        assert!(!matrix.supports("linux", "sparc"));
    }

    #[test]
    fn test_parse_skips_malformed_lines_individually() {
        let output = "linux/amd64\ngarbage\n\n/arm\nwindows/386\nlinux/arm/v7\r\nplan9/arm\r\n";
        let matrix = TargetMatrix::parse(output);

        let names: Vec<String> = matrix.iter().map(|t| t.to_string()).collect();
        assert_eq!(names, vec!["linux/amd64", "plan9/arm", "windows/386"]);
    }

    #[test]
    fn test_empty_matrix_rejects_everything() {
        let matrix = TargetMatrix::parse("");
        assert!(matrix.is_empty());
        assert!(!matrix.supports("linux", "amd64"));
    }

    #[test]
    fn test_arches_for() {
        let matrix = TargetMatrix::parse("linux/386\nlinux/amd64\nwindows/amd64\n");
        assert_eq!(matrix.arches_for("linux"), vec!["386", "amd64"]);
        assert!(matrix.arches_for("plan9").is_empty());
    }
}

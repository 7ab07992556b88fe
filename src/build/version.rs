//! Parsing of `go version` output.

use regex_lite::Regex;
use serde::{Deserialize, Serialize};

/// Identity of an installed toolchain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolchainVersion {
    /// Version token, e.g. "go1.21.5" or "devel go1.23-abc123 ..."
    pub version: String,
    /// Host OS of the toolchain
    pub os: String,
    /// Host architecture of the toolchain
    pub arch: String,
}

impl ToolchainVersion {
    /// Parse `go version go1.21.5 linux/amd64`.
    pub fn parse(output: &str) -> Option<Self> {
        let re = Regex::new(r"^go version (.+) ([^ \t/]+)/([^ \t/]+)$").ok()?;
        let line = output.lines().next()?.trim();
        let caps = re.captures(line)?;
        Some(Self {
            version: caps.get(1)?.as_str().to_string(),
            os: caps.get(2)?.as_str().to_string(),
            arch: caps.get(3)?.as_str().to_string(),
        })
    }

    /// Release number as `(major, minor, patch)`; `None` for devel builds.
    pub fn release(&self) -> Option<(u32, u32, u32)> {
        let re = Regex::new(r"^go(\d+)\.(\d+)(?:\.(\d+))?").ok()?;
        let caps = re.captures(&self.version)?;
        let major = caps.get(1)?.as_str().parse().ok()?;
        let minor = caps.get(2)?.as_str().parse().ok()?;
        let patch = caps
            .get(3)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0);
        Some((major, minor, patch))
    }
}

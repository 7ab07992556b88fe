//! Build request and compiler argument assembly.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Package argument appended to every build.
pub const CURRENT_PACKAGE: &str = ".";

/// Output artifact shape (`-buildmode`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BuildMode {
    Default,
    Exe,
    Pie,
    CShared,
    CArchive,
    Shared,
    Plugin,
    Archive,
}

impl BuildMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildMode::Default => "default",
            BuildMode::Exe => "exe",
            BuildMode::Pie => "pie",
            BuildMode::CShared => "c-shared",
            BuildMode::CArchive => "c-archive",
            BuildMode::Shared => "shared",
            BuildMode::Plugin => "plugin",
            BuildMode::Archive => "archive",
        }
    }
}

impl fmt::Display for BuildMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BuildMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(BuildMode::Default),
            "exe" => Ok(BuildMode::Exe),
            "pie" => Ok(BuildMode::Pie),
            "c-shared" => Ok(BuildMode::CShared),
            "c-archive" => Ok(BuildMode::CArchive),
            "shared" => Ok(BuildMode::Shared),
            "plugin" => Ok(BuildMode::Plugin),
            "archive" => Ok(BuildMode::Archive),
            other => Err(format!("unknown build mode '{}'", other)),
        }
    }
}

/// What to build and how.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildRequest {
    /// Output path passed to `-o`
    pub dest: PathBuf,
    pub build_mode: Option<BuildMode>,
    /// Build tags, joined with commas into one `-tags` value
    pub tags: Vec<String>,
    /// Linker flags, joined with spaces into one `-ldflags` value
    pub ldflags: Vec<String>,
    pub gcflags: Option<String>,
    pub asmflags: Option<String>,
    /// Strip local filesystem paths from the artifact
    pub trimpath: bool,
    /// Obfuscation seed to use instead of a fresh random one
    pub pinned_seed: Option<String>,
}

impl BuildRequest {
    /// Request writing the artifact to `dest`.
    pub fn new(dest: impl Into<PathBuf>) -> Self {
        Self {
            dest: dest.into(),
            ..Default::default()
        }
    }

    pub fn build_mode(mut self, mode: BuildMode) -> Self {
        self.build_mode = Some(mode);
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn ldflags<I, S>(mut self, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ldflags.extend(flags.into_iter().map(Into::into));
        self
    }

    pub fn gcflags(mut self, flags: impl Into<String>) -> Self {
        self.gcflags = Some(flags.into());
        self
    }

    pub fn asmflags(mut self, flags: impl Into<String>) -> Self {
        self.asmflags = Some(flags.into());
        self
    }

    pub fn trimpath(mut self, enabled: bool) -> Self {
        self.trimpath = enabled;
        self
    }

    /// Reuse a known seed. Only for reproducing a previous build.
    pub fn pin_seed(mut self, seed: impl Into<String>) -> Self {
        self.pinned_seed = Some(seed.into());
        self
    }

    /// The compiler sub-command: `build [flags] -o <dest> .`
    pub fn compiler_args(&self) -> Vec<String> {
        let mut args = vec!["build".to_string()];

        if self.trimpath {
            args.push("-trimpath".to_string());
        }

        let tags: Vec<&str> = self
            .tags
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .collect();
        if !tags.is_empty() {
            args.push("-tags".to_string());
            args.push(tags.join(","));
        }

        let ldflags: Vec<&str> = self
            .ldflags
            .iter()
            .map(|f| f.trim())
            .filter(|f| !f.is_empty())
            .collect();
        if !ldflags.is_empty() {
            args.push("-ldflags".to_string());
            args.push(ldflags.join(" "));
        }

        if let Some(gcflags) = non_empty(&self.gcflags) {
            args.push(format!("-gcflags={}", gcflags));
        }
        if let Some(asmflags) = non_empty(&self.asmflags) {
            args.push(format!("-asmflags={}", asmflags));
        }
        if let Some(mode) = self.build_mode {
            args.push(format!("-buildmode={}", mode));
        }

        args.push("-o".to_string());
        args.push(self.dest.display().to_string());
        args.push(CURRENT_PACKAGE.to_string());
        args
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_args() {
        let request = BuildRequest::new("/tmp/out/implant");
        assert_eq!(
            request.compiler_args(),
            vec!["build", "-o", "/tmp/out/implant", "."]
        );
    }

    #[test]
    fn test_full_args_order() {
        let request = BuildRequest::new("out.dll")
            .trimpath(true)
            .tags(["osusergo", "netgo"])
            .ldflags(["-s", "-w", "-buildid="])
            .gcflags("all=-l")
            .asmflags("all=-trimpath")
            .build_mode(BuildMode::CShared);

        assert_eq!(
            request.compiler_args(),
            vec![
                "build",
                "-trimpath",
                "-tags",
                "osusergo,netgo",
                "-ldflags",
                "-s -w -buildid=",
                "-gcflags=all=-l",
                "-asmflags=all=-trimpath",
                "-buildmode=c-shared",
                "-o",
                "out.dll",
                ".",
            ]
        );
    }

    #[test]
    fn test_blank_values_are_omitted() {
        let request = BuildRequest::new("out")
            .tags([" ", ""])
            .ldflags([""])
            .gcflags("  ")
            .asmflags("");
        assert_eq!(request.compiler_args(), vec!["build", "-o", "out", "."]);
    }

    #[test]
    fn test_build_mode_round_trips_through_str() {
        for mode in ["default", "exe", "pie", "c-shared", "c-archive", "shared", "plugin", "archive"] {
            assert_eq!(mode.parse::<BuildMode>().unwrap().as_str(), mode);
        }
        assert!("dll".parse::<BuildMode>().is_err());
    }
}

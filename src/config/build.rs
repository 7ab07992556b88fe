//! Per-invocation build configuration.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::targets::Target;

/// Directory under the application root holding the toolchain.
pub const TOOLCHAIN_DIR_NAME: &str = "go";

/// Default toolchain binary name under `<toolchain_root>/bin`.
pub const DEFAULT_TOOLCHAIN_BINARY: &str = "go";

/// Default obfuscator binary name under `<toolchain_root>/bin`.
pub const DEFAULT_OBFUSCATOR_BINARY: &str = "garble";

/// Default module proxy list.
pub const DEFAULT_MODULE_PROXY: &str = "https://proxy.golang.org,direct";

/// Native interop toggle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CgoMode {
    On,
    Off,
    /// Leave `CGO_ENABLED` out of the environment entirely.
    #[default]
    Unset,
}

impl CgoMode {
    /// Value for `CGO_ENABLED`, if any.
    pub fn env_value(&self) -> Option<&'static str> {
        match self {
            CgoMode::On => Some("1"),
            CgoMode::Off => Some("0"),
            CgoMode::Unset => None,
        }
    }
}

impl fmt::Display for CgoMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CgoMode::On => "on",
            CgoMode::Off => "off",
            CgoMode::Unset => "unset",
        };
        f.write_str(s)
    }
}

impl FromStr for CgoMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "on" | "1" | "true" => Ok(CgoMode::On),
            "off" | "0" | "false" => Ok(CgoMode::Off),
            "unset" | "" => Ok(CgoMode::Unset),
            other => Err(format!("invalid cgo mode '{}', expected on, off or unset", other)),
        }
    }
}

/// Immutable configuration for one toolchain invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildConfig {
    /// Isolated package root (GOPATH)
    pub project_root: PathBuf,
    /// Directory containing the package to build; defaults to `project_root`
    pub source_dir: Option<PathBuf>,

    /// Requested target OS (GOOS)
    pub target_os: String,
    /// Requested target architecture (GOARCH)
    pub target_arch: String,

    /// Root containing `bin/<toolchain_binary>` and `bin/<obfuscator_binary>`
    pub toolchain_root: PathBuf,
    pub toolchain_binary: String,
    pub obfuscator_binary: String,

    /// GOCACHE
    pub build_cache_dir: PathBuf,
    /// GOMODCACHE
    pub module_cache_dir: PathBuf,

    /// GOPROXY
    pub module_proxy: String,
    /// GOPRIVATE
    pub private_module_patterns: String,

    pub cgo: CgoMode,
    pub cc: Option<PathBuf>,
    pub cxx: Option<PathBuf>,

    /// Route builds through the obfuscator
    pub obfuscation: bool,
}

impl BuildConfig {
    /// Configuration using the standard application layout:
    /// `<app>/go` as toolchain root with `cache` and `modcache` beneath it.
    pub fn for_app_dir(
        app_dir: &Path,
        project_root: impl Into<PathBuf>,
        target_os: impl Into<String>,
        target_arch: impl Into<String>,
    ) -> Self {
        let toolchain_root = toolchain_root_for(app_dir);
        Self {
            project_root: project_root.into(),
            source_dir: None,
            target_os: target_os.into(),
            target_arch: target_arch.into(),
            build_cache_dir: toolchain_root.join("cache"),
            module_cache_dir: toolchain_root.join("modcache"),
            toolchain_root,
            toolchain_binary: DEFAULT_TOOLCHAIN_BINARY.to_string(),
            obfuscator_binary: DEFAULT_OBFUSCATOR_BINARY.to_string(),
            module_proxy: DEFAULT_MODULE_PROXY.to_string(),
            private_module_patterns: String::new(),
            cgo: CgoMode::Unset,
            cc: None,
            cxx: None,
            obfuscation: false,
        }
    }

    /// Same configuration with a different target.
    pub fn with_target(mut self, os: impl Into<String>, arch: impl Into<String>) -> Self {
        self.target_os = os.into();
        self.target_arch = arch.into();
        self
    }

    /// Same configuration with obfuscation toggled.
    pub fn with_obfuscation(mut self, enabled: bool) -> Self {
        self.obfuscation = enabled;
        self
    }

    /// Same configuration building from `dir`.
    pub fn with_source_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.source_dir = Some(dir.into());
        self
    }

    /// The requested target.
    pub fn target(&self) -> Target {
        Target::new(&self.target_os, &self.target_arch)
    }

    /// `<toolchain_root>/bin`
    pub fn toolchain_bin_dir(&self) -> PathBuf {
        self.toolchain_root.join("bin")
    }

    /// Path of the compiler driver.
    pub fn toolchain_path(&self) -> PathBuf {
        self.toolchain_bin_dir().join(&self.toolchain_binary)
    }

    /// Path of the obfuscator.
    pub fn obfuscator_path(&self) -> PathBuf {
        self.toolchain_bin_dir().join(&self.obfuscator_binary)
    }

    /// Working directory for build and module commands.
    pub fn work_dir(&self) -> &Path {
        self.source_dir.as_deref().unwrap_or(&self.project_root)
    }

    /// Create the cache directories (owner-only) if missing.
    ///
    /// Returns the path that could not be created on failure.
    pub fn ensure_cache_dirs(&self) -> Result<(), (PathBuf, io::Error)> {
        for dir in [&self.build_cache_dir, &self.module_cache_dir] {
            create_private_dir(dir).map_err(|e| (dir.clone(), e))?;
        }
        Ok(())
    }
}

/// Toolchain root for an application directory.
pub fn toolchain_root_for(app_dir: &Path) -> PathBuf {
    app_dir.join(TOOLCHAIN_DIR_NAME)
}

/// `mkdir -p` with mode 0700 on unix. Safe to race.
pub fn create_private_dir(path: &Path) -> io::Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder.create(path)
}

//! Typed view of the merged configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::build::{BuildConfig, CgoMode, DEFAULT_MODULE_PROXY, DEFAULT_OBFUSCATOR_BINARY, DEFAULT_TOOLCHAIN_BINARY};
use super::ConfigError;
use crate::policy::ObfuscationTuning;
use crate::targets::DEFAULT_TARGET_CACHE_TTL_SECONDS;
use crate::timeout::TimeoutConfig;

/// `[toolchain]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolchainSettings {
    /// Overrides `<app-dir>/go`
    pub root: Option<PathBuf>,
    pub binary: String,
    pub obfuscator: String,
}

impl Default for ToolchainSettings {
    fn default() -> Self {
        Self {
            root: None,
            binary: DEFAULT_TOOLCHAIN_BINARY.to_string(),
            obfuscator: DEFAULT_OBFUSCATOR_BINARY.to_string(),
        }
    }
}

/// `[cache]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub build_dir: Option<PathBuf>,
    pub module_dir: Option<PathBuf>,
}

/// `[modules]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleSettings {
    pub proxy: String,
    /// Module path globs fetched directly, joined into GOPRIVATE
    pub private: Vec<String>,
}

impl Default for ModuleSettings {
    fn default() -> Self {
        Self {
            proxy: DEFAULT_MODULE_PROXY.to_string(),
            private: Vec::new(),
        }
    }
}

/// `[cgo]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CgoSettings {
    pub enabled: CgoMode,
    pub cc: Option<PathBuf>,
    pub cxx: Option<PathBuf>,
}

/// `[obfuscation]`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObfuscationSettings {
    pub enabled: bool,
    #[serde(flatten)]
    pub tuning: ObfuscationTuning,
}

/// `[targets]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetSettings {
    /// Zero disables caching
    pub cache_ttl_seconds: u64,
}

impl Default for TargetSettings {
    fn default() -> Self {
        Self {
            cache_ttl_seconds: DEFAULT_TARGET_CACHE_TTL_SECONDS,
        }
    }
}

/// All settings, after layering.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForgeSettings {
    pub toolchain: ToolchainSettings,
    pub cache: CacheSettings,
    pub modules: ModuleSettings,
    pub cgo: CgoSettings,
    pub obfuscation: ObfuscationSettings,
    pub targets: TargetSettings,
    pub timeouts: TimeoutConfig,
}

impl ForgeSettings {
    /// Deserialize from a merged JSON tree and validate.
    pub fn from_value(value: serde_json::Value) -> Result<Self, ConfigError> {
        let settings: ForgeSettings = serde_json::from_value(value)
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (key, name) in [
            ("toolchain.binary", &self.toolchain.binary),
            ("toolchain.obfuscator", &self.toolchain.obfuscator),
        ] {
            if name.is_empty() || name.contains('/') || name.contains('\\') {
                return Err(ConfigError::ValidationError(format!(
                    "{} must be a bare file name, got '{}'",
                    key, name
                )));
            }
        }
        if self.modules.proxy.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "modules.proxy must not be empty".to_string(),
            ));
        }
        self.timeouts
            .validate()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;
        self.obfuscation
            .tuning
            .validate()
            .map_err(|e| ConfigError::ValidationError(format!("obfuscation: {}", e)))?;
        Ok(())
    }

    /// Build configuration for one target, rooted at `app_dir`.
    pub fn build_config(
        &self,
        app_dir: &Path,
        project_root: impl Into<PathBuf>,
        target_os: impl Into<String>,
        target_arch: impl Into<String>,
    ) -> BuildConfig {
        let mut config = BuildConfig::for_app_dir(app_dir, project_root, target_os, target_arch);

        if let Some(root) = &self.toolchain.root {
            config.build_cache_dir = root.join("cache");
            config.module_cache_dir = root.join("modcache");
            config.toolchain_root = root.clone();
        }
        config.toolchain_binary = self.toolchain.binary.clone();
        config.obfuscator_binary = self.toolchain.obfuscator.clone();

        if let Some(dir) = &self.cache.build_dir {
            config.build_cache_dir = dir.clone();
        }
        if let Some(dir) = &self.cache.module_dir {
            config.module_cache_dir = dir.clone();
        }

        config.module_proxy = self.modules.proxy.clone();
        config.private_module_patterns = self.modules.private.join(",");

        config.cgo = self.cgo.enabled;
        config.cc = self.cgo.cc.clone();
        config.cxx = self.cgo.cxx.clone();

        config.obfuscation = self.obfuscation.enabled;
        config
    }
}

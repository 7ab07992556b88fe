//! Configuration
//!
//! Settings come from four layers, later ones winning:
//! 1. Built-in defaults
//! 2. Host config (`~/.config/crossforge/forge.toml`)
//! 3. Project config (`.crossforge.toml`)
//! 4. CLI flags
//!
//! [`ForgeSettings`] is the typed result; [`BuildConfig`] is the
//! per-invocation snapshot handed to the orchestrator.

mod build;
mod defaults;
mod effective;
mod merge;
mod settings;

pub use build::{
    create_private_dir, toolchain_root_for, BuildConfig, CgoMode, DEFAULT_MODULE_PROXY,
    DEFAULT_OBFUSCATOR_BINARY, DEFAULT_TOOLCHAIN_BINARY, TOOLCHAIN_DIR_NAME,
};
pub use defaults::BuiltinDefaults;
pub use effective::{
    host_config_path, project_config_path, ConfigError, ConfigOrigin, ConfigSource,
    EffectiveConfig, PROJECT_CONFIG_FILE,
};
pub use merge::{deep_merge, merge_layers};
pub use settings::{
    CacheSettings, CgoSettings, ForgeSettings, ModuleSettings, ObfuscationSettings,
    TargetSettings, ToolchainSettings,
};

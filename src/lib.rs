//! crossforge - cross-compilation build orchestration
//!
//! Drives an installed Go-style toolchain (and optionally an obfuscating
//! front-end) to produce artifacts for a requested OS/architecture:
//! resolves which targets the toolchain supports, picks an obfuscation
//! policy from host memory, assembles an isolated environment, and runs
//! the toolchain with full failure diagnostics.

pub mod build;
pub mod config;
pub mod env;
pub mod error;
pub mod policy;
pub mod signal;
pub mod targets;
pub mod timeout;

pub use build::{BuildMode, BuildOutput, BuildPlan, BuildRequest, Toolchain, ToolchainVersion};
pub use config::{BuildConfig, CgoMode, ConfigError, EffectiveConfig, ForgeSettings};
pub use env::Environment;
pub use error::{ForgeError, ForgeResult};
pub use policy::{choose_policy, MemoryProbe, ObfuscationPolicy, ObfuscationTuning};
pub use targets::{Target, TargetMatrix, TargetResolver};
pub use timeout::TimeoutConfig;

pub use crossforge_runner::{CancelFlag, Diagnostics, ProcessRunner, RunError, SystemRunner};

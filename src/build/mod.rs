//! Build orchestrator
//!
//! [`Toolchain`] is the public entry point. A build:
//! 1. Validates the requested target against the discovered matrix
//! 2. Ensures the cache directories exist
//! 3. Assembles the compiler sub-command
//! 4. For obfuscated builds, prefixes a fresh seed and the memory-derived
//!    literal flags and routes through the obfuscator
//! 5. Runs it with the isolated environment and returns stdout
//!
//! Module maintenance and version queries share the environment and
//! runner but skip target validation and obfuscation.

mod request;
mod seed;
mod version;

pub use request::{BuildMode, BuildRequest, CURRENT_PACKAGE};
pub use seed::{generate_seed, SEED_BYTES};
pub use version::ToolchainVersion;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crossforge_runner::{Invocation, ProcessRunner};
use sha2::{Digest, Sha256};
use tracing::{debug, info, info_span};
use uuid::Uuid;

use crate::config::{BuildConfig, ConfigError, ForgeSettings};
use crate::env::Environment;
use crate::error::{ForgeError, ForgeResult};
use crate::policy::{choose_policy, MemoryProbe, ObfuscationPolicy, ObfuscationTuning, SystemMemoryProbe};
use crate::targets::{TargetMatrix, TargetResolver};
use crate::timeout::TimeoutConfig;

/// A validated, fully assembled build ready to run.
#[derive(Debug, Clone)]
pub struct BuildPlan {
    pub invocation: Invocation,
    /// Obfuscation seed, when routed through the obfuscator
    pub seed: Option<String>,
    /// Literal policy, when routed through the obfuscator
    pub policy: Option<ObfuscationPolicy>,
}

impl BuildPlan {
    /// Whether the plan runs the obfuscator.
    pub fn is_obfuscated(&self) -> bool {
        self.seed.is_some()
    }
}

/// Result of a successful build.
#[derive(Debug, Clone)]
pub struct BuildOutput {
    /// Correlates log lines of one build
    pub build_id: String,
    /// Raw stdout of the toolchain
    pub artifact: Vec<u8>,
    pub seed: Option<String>,
    pub policy: Option<ObfuscationPolicy>,
    pub program: PathBuf,
    pub args: Vec<String>,
    pub elapsed: Duration,
}

impl BuildOutput {
    /// SHA-256 of the artifact bytes, hex encoded.
    pub fn artifact_digest(&self) -> String {
        hex::encode(Sha256::digest(&self.artifact))
    }
}

/// Drives the toolchain and obfuscator.
pub struct Toolchain {
    runner: Arc<dyn ProcessRunner>,
    resolver: TargetResolver,
    probe: Arc<dyn MemoryProbe>,
    tuning: ObfuscationTuning,
    timeouts: TimeoutConfig,
}

impl Toolchain {
    /// Orchestrator with default tuning, timeouts and the host memory probe.
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        let timeouts = TimeoutConfig::default();
        Self {
            resolver: TargetResolver::new(Arc::clone(&runner)).with_timeout(Some(timeouts.probe())),
            runner,
            probe: Arc::new(SystemMemoryProbe),
            tuning: ObfuscationTuning::default(),
            timeouts,
        }
    }

    /// Orchestrator configured from effective settings.
    pub fn from_settings(
        settings: &ForgeSettings,
        runner: Arc<dyn ProcessRunner>,
    ) -> ForgeResult<Self> {
        Ok(Self::new(runner)
            .with_tuning(settings.obfuscation.tuning)?
            .with_timeouts(settings.timeouts)
            .with_target_cache_ttl(Duration::from_secs(settings.targets.cache_ttl_seconds)))
    }

    pub fn with_memory_probe(mut self, probe: Arc<dyn MemoryProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Replace the policy table; tables with inverted thresholds or caps
    /// are rejected.
    pub fn with_tuning(mut self, tuning: ObfuscationTuning) -> ForgeResult<Self> {
        tuning
            .validate()
            .map_err(|msg| ConfigError::ValidationError(format!("obfuscation: {}", msg)))?;
        self.tuning = tuning;
        Ok(self)
    }

    pub fn with_timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = timeouts;
        self.resolver = self.resolver.with_timeout(Some(timeouts.probe()));
        self
    }

    /// Lifetime of discovered target matrices; zero re-queries every time.
    pub fn with_target_cache_ttl(mut self, ttl: Duration) -> Self {
        self.resolver = self.resolver.with_ttl(ttl);
        self
    }

    /// Targets the configured toolchain supports.
    pub fn resolve_targets(&self, config: &BuildConfig) -> TargetMatrix {
        self.resolver.resolve(config)
    }

    /// Fail unless `config`'s target is in the matrix.
    pub fn validate_target(&self, config: &BuildConfig) -> ForgeResult<()> {
        let matrix = self.resolver.resolve(config);
        if matrix.supports(&config.target_os, &config.target_arch) {
            Ok(())
        } else {
            Err(ForgeError::InvalidTarget {
                target: config.target().to_string(),
            })
        }
    }

    /// Validate the target and assemble the command without running it.
    pub fn plan(&self, config: &BuildConfig, request: &BuildRequest) -> ForgeResult<BuildPlan> {
        self.validate_target(config)?;

        let compiler_args = request.compiler_args();
        let env = Environment::for_build(config);

        let (program, args, seed, policy) = if config.obfuscation {
            let seed = request.pinned_seed.clone().unwrap_or_else(generate_seed);
            let policy = choose_policy(self.probe.as_ref(), &self.tuning);

            let mut args = vec![format!("-seed={}", seed)];
            args.extend(policy.flags());
            args.extend(compiler_args);
            (config.obfuscator_path(), args, Some(seed), Some(policy))
        } else {
            (config.toolchain_path(), compiler_args, None, None)
        };

        let invocation = Invocation::new(program, config.work_dir())
            .args(args)
            .env(env.pairs().iter().cloned())
            .timeout(Some(self.timeouts.build()));

        Ok(BuildPlan {
            invocation,
            seed,
            policy,
        })
    }

    /// Build `config`'s target and return the toolchain's stdout.
    pub fn build(&self, config: &BuildConfig, request: &BuildRequest) -> ForgeResult<BuildOutput> {
        let build_id = Uuid::new_v4().to_string();
        let span = info_span!("build", build_id = %build_id, target = %config.target());
        let _guard = span.enter();

        let plan = self.plan(config, request)?;
        self.ensure_cache_dirs(config)?;

        let withheld = Environment::for_build(config)
            .dropped_keys(std::env::vars_os().map(|(k, _)| k.to_string_lossy().into_owned()));
        if !withheld.is_empty() {
            debug!("withheld parent environment: {}", withheld.join(", "));
        }

        info!(
            obfuscated = plan.is_obfuscated(),
            "{} cmd: {}",
            plan.invocation.program_name(),
            plan.invocation.command_line()
        );

        let output = self.runner.run(&plan.invocation)?;

        let result = BuildOutput {
            build_id,
            artifact: output.stdout,
            seed: plan.seed,
            policy: plan.policy,
            program: plan.invocation.program,
            args: plan.invocation.args,
            elapsed: output.elapsed,
        };
        info!(
            elapsed_ms = result.elapsed.as_millis() as u64,
            sha256 = %result.artifact_digest(),
            "build finished"
        );
        Ok(result)
    }

    /// Run `mod <args>` in the source directory.
    pub fn mod_command<I, S>(&self, config: &BuildConfig, args: I) -> ForgeResult<Vec<u8>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ensure_cache_dirs(config)?;
        let invocation = Invocation::new(config.toolchain_path(), config.work_dir())
            .arg("mod")
            .args(args)
            .env(Environment::for_introspection(config).pairs().iter().cloned())
            .timeout(Some(self.timeouts.build()));

        info!("{} cmd: {}", invocation.program_name(), invocation.command_line());
        Ok(self.runner.run(&invocation)?.stdout)
    }

    /// Run `version` in the current directory.
    pub fn version(&self, config: &BuildConfig) -> ForgeResult<Vec<u8>> {
        let cwd = std::env::current_dir().unwrap_or_else(|_| config.project_root.clone());
        let invocation = Invocation::new(config.toolchain_path(), cwd)
            .arg("version")
            .env(Environment::for_introspection(config).pairs().iter().cloned())
            .timeout(Some(self.timeouts.probe()));

        Ok(self.runner.run(&invocation)?.stdout)
    }

    /// Parsed form of [`Toolchain::version`]; `None` if unparseable.
    pub fn toolchain_version(&self, config: &BuildConfig) -> ForgeResult<Option<ToolchainVersion>> {
        let stdout = self.version(config)?;
        Ok(ToolchainVersion::parse(&String::from_utf8_lossy(&stdout)))
    }

    fn ensure_cache_dirs(&self, config: &BuildConfig) -> ForgeResult<()> {
        config
            .ensure_cache_dirs()
            .map_err(|(path, source)| ForgeError::CacheDir { path, source })
    }
}

//! Target discovery through the toolchain's `tool dist list`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crossforge_runner::{Invocation, ProcessRunner};
use tracing::{debug, warn};

use super::TargetMatrix;
use crate::config::BuildConfig;
use crate::env::Environment;

/// Default lifetime of a discovered matrix.
pub const DEFAULT_TARGET_CACHE_TTL_SECONDS: u64 = 60;

const DIST_LIST_ARGS: [&str; 3] = ["tool", "dist", "list"];

struct CachedMatrix {
    matrix: TargetMatrix,
    fetched: Instant,
}

/// Resolves the target matrix for a toolchain installation.
///
/// A failed discovery yields an empty matrix and is never cached, so a
/// toolchain that becomes reachable again is picked up on the next call.
pub struct TargetResolver {
    runner: Arc<dyn ProcessRunner>,
    ttl: Duration,
    timeout: Option<Duration>,
    cache: Mutex<HashMap<PathBuf, CachedMatrix>>,
}

impl TargetResolver {
    /// Resolver with the default cache lifetime.
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            runner,
            ttl: Duration::from_secs(DEFAULT_TARGET_CACHE_TTL_SECONDS),
            timeout: None,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Set the cache lifetime. Zero disables caching.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the discovery timeout.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Resolve the matrix for `config`'s toolchain.
    pub fn resolve(&self, config: &BuildConfig) -> TargetMatrix {
        let key = config.toolchain_path();

        if !self.ttl.is_zero() {
            if let Ok(cache) = self.cache.lock() {
                if let Some(entry) = cache.get(&key) {
                    if entry.fetched.elapsed() < self.ttl {
                        debug!(toolchain = %key.display(), "using cached target matrix");
                        return entry.matrix.clone();
                    }
                }
            }
        }

        let matrix = self.discover(config);

        if !self.ttl.is_zero() && !matrix.is_empty() {
            if let Ok(mut cache) = self.cache.lock() {
                cache.insert(
                    key,
                    CachedMatrix {
                        matrix: matrix.clone(),
                        fetched: Instant::now(),
                    },
                );
            }
        }

        matrix
    }

    /// Drop every cached matrix.
    pub fn invalidate(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
    }

    fn discover(&self, config: &BuildConfig) -> TargetMatrix {
        let env = Environment::for_introspection(config);
        let invocation = Invocation::new(config.toolchain_path(), config.work_dir())
            .args(DIST_LIST_ARGS)
            .env(env.pairs().iter().cloned())
            .timeout(self.timeout);

        match self.runner.run(&invocation) {
            Ok(output) => {
                let matrix = TargetMatrix::parse(&output.stdout_lossy());
                debug!(targets = matrix.len(), "discovered target matrix");
                matrix
            }
            Err(e) => {
                warn!("target discovery failed, no targets will be accepted: {}", e);
                TargetMatrix::empty()
            }
        }
    }
}

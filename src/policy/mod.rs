//! Memory-aware obfuscation policy
//!
//! Literal obfuscation inflates the obfuscator's peak memory roughly in
//! proportion to the largest literal it rewrites. The policy maps total
//! host memory onto a literal size cap with a three-step table:
//!
//! - below `low_memory_threshold`: `low_cap`
//! - above `high_memory_threshold`: `high_cap`
//! - otherwise: `mid_cap`
//!
//! A failed memory probe selects `low_cap`.

mod probe;

pub use probe::{parse_meminfo, FixedMemoryProbe, MemoryProbe, ProbeError, SystemMemoryProbe};

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{error, info};

const KIB: u64 = 1024;
const MIB: u64 = 1024 * KIB;
const GIB: u64 = 1024 * MIB;

/// Tunable policy table. All values are bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObfuscationTuning {
    /// Below this total, use `low_cap` (default: 6 GiB)
    pub low_memory_threshold: u64,
    /// Above this total, use `high_cap` (default: 10 GiB)
    pub high_memory_threshold: u64,
    /// Cap for constrained hosts (default: 2 KiB)
    pub low_cap: u64,
    /// Cap between the thresholds (default: 64 KiB)
    pub mid_cap: u64,
    /// Cap for large hosts (default: 512 KiB)
    pub high_cap: u64,
    /// Pass `-literals` to the obfuscator (default: true)
    pub literals: bool,
}

impl Default for ObfuscationTuning {
    fn default() -> Self {
        Self {
            low_memory_threshold: 6 * GIB,
            high_memory_threshold: 10 * GIB,
            low_cap: 2 * KIB,
            mid_cap: 64 * KIB,
            high_cap: 512 * KIB,
            literals: true,
        }
    }
}

impl ObfuscationTuning {
    /// Reject tables that would make the cap non-monotonic in memory.
    pub fn validate(&self) -> Result<(), String> {
        if self.low_memory_threshold > self.high_memory_threshold {
            return Err(format!(
                "low_memory_threshold ({}) must not exceed high_memory_threshold ({})",
                self.low_memory_threshold, self.high_memory_threshold
            ));
        }
        if self.low_cap > self.mid_cap || self.mid_cap > self.high_cap {
            return Err(format!(
                "caps must satisfy low_cap <= mid_cap <= high_cap, got {} / {} / {}",
                self.low_cap, self.mid_cap, self.high_cap
            ));
        }
        Ok(())
    }

    /// The most conservative policy this table allows.
    pub fn conservative(&self) -> ObfuscationPolicy {
        ObfuscationPolicy {
            literals: self.literals,
            max_literal_size: self.low_cap,
            tier: MemoryTier::Unknown,
        }
    }

    /// Policy for a known memory total.
    pub fn for_memory(&self, total: u64) -> ObfuscationPolicy {
        let (tier, cap) = if total < self.low_memory_threshold {
            (MemoryTier::Low, self.low_cap)
        } else if total > self.high_memory_threshold {
            (MemoryTier::High, self.high_cap)
        } else {
            (MemoryTier::Mid, self.mid_cap)
        };
        ObfuscationPolicy {
            literals: self.literals,
            max_literal_size: cap,
            tier,
        }
    }
}

/// Which row of the table was selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryTier {
    Low,
    Mid,
    High,
    /// Telemetry failed
    Unknown,
}

impl fmt::Display for MemoryTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MemoryTier::Low => "low",
            MemoryTier::Mid => "mid",
            MemoryTier::High => "high",
            MemoryTier::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Obfuscator tuning derived for one build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObfuscationPolicy {
    /// Obfuscate literals at all
    pub literals: bool,
    /// Largest literal (bytes) the obfuscator may rewrite
    pub max_literal_size: u64,
    pub tier: MemoryTier,
}

impl ObfuscationPolicy {
    /// Whether the large-literal row was selected.
    pub fn large_literals(&self) -> bool {
        self.tier == MemoryTier::High
    }

    /// Obfuscator flags for this policy (excluding the seed).
    pub fn flags(&self) -> Vec<String> {
        let mut flags = Vec::new();
        if self.literals {
            flags.push("-literals".to_string());
            flags.push(format!("-literals-max-size={}", self.max_literal_size));
        }
        flags
    }
}

/// Choose the policy from current host memory.
///
/// Never fails: telemetry errors fall back to the conservative cap.
pub fn choose_policy(probe: &dyn MemoryProbe, tuning: &ObfuscationTuning) -> ObfuscationPolicy {
    match probe.total_memory() {
        Ok(total) => {
            let policy = tuning.for_memory(total);
            info!(
                total_mib = total / MIB,
                tier = %policy.tier,
                max_literal_size = policy.max_literal_size,
                "selected literal obfuscation cap"
            );
            policy
        }
        Err(e) => {
            error!("failed to detect amount of system memory: {}", e);
            tuning.conservative()
        }
    }
}

//! Built-in defaults (layer 1)
//!
//! Hardcoded defaults for every configuration section. Paths that are
//! derived from the application directory are left out so the layout in
//! [`super::BuildConfig::for_app_dir`] applies unless a layer sets them.

use serde::{Deserialize, Serialize};

use super::build::{DEFAULT_MODULE_PROXY, DEFAULT_OBFUSCATOR_BINARY, DEFAULT_TOOLCHAIN_BINARY};
use crate::policy::ObfuscationTuning;
use crate::targets::DEFAULT_TARGET_CACHE_TTL_SECONDS;
use crate::timeout::TimeoutConfig;

/// Built-in default configuration values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltinDefaults {
    /// Compiler driver under `<root>/bin` (default: "go")
    pub toolchain_binary: String,

    /// Obfuscator under `<root>/bin` (default: "garble")
    pub obfuscator_binary: String,

    /// GOPROXY (default: public proxy, then direct)
    pub module_proxy: String,

    /// Native interop (default: "unset")
    pub cgo_enabled: String,

    /// Obfuscate builds (default: false)
    pub obfuscation_enabled: bool,

    /// Literal policy table
    pub tuning: ObfuscationTuning,

    /// Target matrix cache lifetime (default: 60)
    pub target_cache_ttl_seconds: u64,

    /// Process deadlines
    pub timeouts: TimeoutConfig,
}

impl Default for BuiltinDefaults {
    fn default() -> Self {
        Self {
            toolchain_binary: DEFAULT_TOOLCHAIN_BINARY.to_string(),
            obfuscator_binary: DEFAULT_OBFUSCATOR_BINARY.to_string(),
            module_proxy: DEFAULT_MODULE_PROXY.to_string(),
            cgo_enabled: "unset".to_string(),
            obfuscation_enabled: false,
            tuning: ObfuscationTuning::default(),
            target_cache_ttl_seconds: DEFAULT_TARGET_CACHE_TTL_SECONDS,
            timeouts: TimeoutConfig::default(),
        }
    }
}

impl BuiltinDefaults {
    /// Convert to JSON Value for merging
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "toolchain": {
                "binary": self.toolchain_binary,
                "obfuscator": self.obfuscator_binary
            },
            "cache": {},
            "modules": {
                "proxy": self.module_proxy,
                "private": []
            },
            "cgo": {
                "enabled": self.cgo_enabled
            },
            "obfuscation": {
                "enabled": self.obfuscation_enabled,
                "literals": self.tuning.literals,
                "low_memory_threshold": self.tuning.low_memory_threshold,
                "high_memory_threshold": self.tuning.high_memory_threshold,
                "low_cap": self.tuning.low_cap,
                "mid_cap": self.tuning.mid_cap,
                "high_cap": self.tuning.high_cap
            },
            "targets": {
                "cache_ttl_seconds": self.target_cache_ttl_seconds
            },
            "timeouts": {
                "build_seconds": self.timeouts.build_seconds,
                "probe_seconds": self.timeouts.probe_seconds,
                "termination_grace_seconds": self.timeouts.termination_grace_seconds
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_value() {
        let value = BuiltinDefaults::default().to_value();

        assert_eq!(value["toolchain"]["binary"], "go");
        assert_eq!(value["toolchain"]["obfuscator"], "garble");
        assert_eq!(value["cgo"]["enabled"], "unset");
        assert_eq!(value["obfuscation"]["enabled"], false);
        assert_eq!(value["obfuscation"]["low_cap"], 2048);
        assert_eq!(value["targets"]["cache_ttl_seconds"], 60);
        assert_eq!(value["timeouts"]["build_seconds"], 1800);
        assert!(value["toolchain"].get("root").is_none());
    }
}

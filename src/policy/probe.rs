//! Host memory telemetry.

use std::fs;
use std::process::Command;

/// Errors from a memory probe.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("memory telemetry unavailable: {0}")]
    Unavailable(String),

    #[error("could not parse memory telemetry: {0}")]
    Parse(String),
}

/// Source of total physical memory.
pub trait MemoryProbe: Send + Sync {
    /// Total physical memory in bytes.
    fn total_memory(&self) -> Result<u64, ProbeError>;
}

/// Reads the running host's memory.
///
/// Linux: `MemTotal` from `/proc/meminfo`. macOS: `sysctl -n hw.memsize`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemMemoryProbe;

impl MemoryProbe for SystemMemoryProbe {
    fn total_memory(&self) -> Result<u64, ProbeError> {
        if cfg!(target_os = "linux") {
            let meminfo = fs::read_to_string("/proc/meminfo")
                .map_err(|e| ProbeError::Unavailable(format!("/proc/meminfo: {}", e)))?;
            parse_meminfo(&meminfo)
        } else if cfg!(target_os = "macos") {
            let output = Command::new("sysctl")
                .args(["-n", "hw.memsize"])
                .output()
                .map_err(|e| ProbeError::Unavailable(format!("sysctl: {}", e)))?;
            if !output.status.success() {
                return Err(ProbeError::Unavailable(format!(
                    "sysctl exited with {:?}",
                    output.status.code()
                )));
            }
            let text = String::from_utf8_lossy(&output.stdout);
            text.trim()
                .parse::<u64>()
                .map_err(|e| ProbeError::Parse(format!("hw.memsize {:?}: {}", text.trim(), e)))
        } else {
            Err(ProbeError::Unavailable(format!(
                "no memory probe for {}",
                std::env::consts::OS
            )))
        }
    }
}

/// Fixed reading, for tests and for pinning the policy explicitly.
#[derive(Debug, Clone, Copy)]
pub struct FixedMemoryProbe(pub Option<u64>);

impl MemoryProbe for FixedMemoryProbe {
    fn total_memory(&self) -> Result<u64, ProbeError> {
        self.0
            .ok_or_else(|| ProbeError::Unavailable("no reading configured".to_string()))
    }
}

/// Extract `MemTotal` (reported in kB) as bytes.
pub fn parse_meminfo(meminfo: &str) -> Result<u64, ProbeError> {
    let line = meminfo
        .lines()
        .find(|line| line.starts_with("MemTotal:"))
        .ok_or_else(|| ProbeError::Parse("no MemTotal line".to_string()))?;

    let parts: Vec<&str> = line.split_whitespace().collect();
    let kb = parts
        .get(1)
        .and_then(|v| v.parse::<u64>().ok())
        .ok_or_else(|| ProbeError::Parse(format!("bad MemTotal line {:?}", line)))?;

    kb.checked_mul(1024)
        .ok_or_else(|| ProbeError::Parse(format!("MemTotal out of range: {} kB", kb)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_meminfo() {
        let meminfo = "MemTotal:       16318472 kB\nMemFree:         1234567 kB\n";
        assert_eq!(parse_meminfo(meminfo).unwrap(), 16318472 * 1024);
    }

    #[test]
    fn test_parse_meminfo_missing_total() {
        assert!(matches!(
            parse_meminfo("MemFree: 1 kB\n"),
            Err(ProbeError::Parse(_))
        ));
    }

    #[test]
    fn test_parse_meminfo_garbage_value() {
        assert!(matches!(
            parse_meminfo("MemTotal: lots kB\n"),
            Err(ProbeError::Parse(_))
        ));
    }

    #[test]
    fn test_parse_meminfo_overflowing_total() {
        assert!(matches!(
            parse_meminfo("MemTotal: 18446744073709551615 kB\n"),
            Err(ProbeError::Parse(_))
        ));
    }

    #[test]
    fn test_fixed_probe() {
        assert_eq!(FixedMemoryProbe(Some(42)).total_memory().unwrap(), 42);
        assert!(FixedMemoryProbe(None).total_memory().is_err());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_system_probe_reads_host() {
        let total = SystemMemoryProbe.total_memory().unwrap();
        assert!(total > 0);
    }
}

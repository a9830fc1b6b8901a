//! Physical memory snapshot from the /proc filesystem.
//!
//! The probe never fails: when the platform offers no memory accounting, or
//! /proc cannot be read or parsed, every field reports zero and callers fall
//! back to conservative sizing. It is cheap enough to call several times a
//! second for live refresh.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Snapshot of system physical memory, in bytes.
///
/// Immutable once created; recomputed on demand via [`probe_memory`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MemoryInfo {
    /// Total physical memory.
    pub total: u64,
    /// Memory available for new allocations without swapping.
    pub available: u64,
    /// Memory currently in use (`total - available`).
    pub used: u64,
    /// Percentage of total memory in use (0.0 when total is unknown).
    pub percent_used: f64,
}

impl MemoryInfo {
    /// Snapshot with all fields zero, reported when the probe is degraded.
    pub const fn zeroed() -> Self {
        Self {
            total: 0,
            available: 0,
            used: 0,
            percent_used: 0.0,
        }
    }

    /// Whether this snapshot came from a degraded probe.
    pub fn is_degraded(&self) -> bool {
        self.total == 0
    }

    fn from_counts(total: u64, available: u64) -> Self {
        let used = total.saturating_sub(available);
        let percent_used = if total > 0 {
            used as f64 / total as f64 * 100.0
        } else {
            0.0
        };
        Self {
            total,
            available,
            used,
            percent_used,
        }
    }
}

/// Query total/available physical memory.
///
/// Returns [`MemoryInfo::zeroed`] on any failure; never errors or panics.
pub fn probe_memory() -> MemoryInfo {
    #[cfg(target_os = "linux")]
    {
        match std::fs::read_to_string("/proc/meminfo") {
            Ok(content) => parse_meminfo(&content).unwrap_or_else(|| {
                warn!("could not parse /proc/meminfo; reporting zeroed memory info");
                MemoryInfo::zeroed()
            }),
            Err(err) => {
                warn!(error = %err, "failed to read /proc/meminfo; reporting zeroed memory info");
                MemoryInfo::zeroed()
            }
        }
    }
    #[cfg(not(target_os = "linux"))]
    {
        warn!("memory probing not supported on this platform; reporting zeroed memory info");
        MemoryInfo::zeroed()
    }
}

/// Best-effort resident set size of the current process, in bytes.
///
/// Returns 0 when unavailable.
pub fn process_rss() -> u64 {
    #[cfg(target_os = "linux")]
    {
        match std::fs::read_to_string("/proc/self/status") {
            Ok(content) => parse_vmrss(&content).unwrap_or(0),
            Err(_) => 0,
        }
    }
    #[cfg(not(target_os = "linux"))]
    {
        0
    }
}

/// Parse /proc/meminfo content into a memory snapshot.
///
/// Format:
/// ```text
/// MemTotal:       32602080 kB
/// MemFree:         1159848 kB
/// MemAvailable:   21349140 kB
/// ```
///
/// Both `MemTotal` and `MemAvailable` must be present; otherwise the probe
/// is considered degraded.
fn parse_meminfo(content: &str) -> Option<MemoryInfo> {
    let mut total = None;
    let mut available = None;

    for line in content.lines() {
        if let Some(rest) = line.strip_prefix("MemTotal:") {
            total = parse_kib(rest);
        } else if let Some(rest) = line.strip_prefix("MemAvailable:") {
            available = parse_kib(rest);
        }
        if total.is_some() && available.is_some() {
            break;
        }
    }

    Some(MemoryInfo::from_counts(total?, available?))
}

/// Parse the RSS line from /proc/self/status (`VmRSS:    1234 kB`).
fn parse_vmrss(content: &str) -> Option<u64> {
    content
        .lines()
        .find_map(|line| line.strip_prefix("VmRSS:"))
        .and_then(parse_kib)
}

/// Parse a `/proc` kB field into bytes.
fn parse_kib(rest: &str) -> Option<u64> {
    rest.split_whitespace()
        .next()?
        .parse::<u64>()
        .ok()
        .map(|kib| kib * 1024)
}

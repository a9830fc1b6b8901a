//! Display-ready formatting over results and snapshots.
//!
//! Pure functions: no engine state, no mutation, safe to call repeatedly
//! and concurrently.

use crate::engine::{BenchmarkResult, ProgressSnapshot};
use std::fmt::Write as _;

/// Format bytes in human-readable form (1024-based units).
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    const TB: u64 = GB * 1024;

    if bytes >= TB {
        format!("{:.2} TB", bytes as f64 / TB as f64)
    } else if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Format seconds as `mm:ss`, clamping negatives to zero.
pub fn format_mmss(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    format!("{:02}:{:02}", total / 60, total % 60)
}

/// One-line live progress rendering for a snapshot.
pub fn render_progress_line(snapshot: &ProgressSnapshot) -> String {
    format!(
        "[{} / -{}] loop {}  write {:.2} GB/s  read {:.2} GB/s  total {:.2} GB/s",
        format_mmss(snapshot.elapsed_s),
        format_mmss(snapshot.remaining_s),
        snapshot.loop_count,
        snapshot.inst_write_gbps,
        snapshot.inst_read_gbps,
        snapshot.inst_total_gbps,
    )
}

/// Multi-line end-of-run summary.
pub fn render_summary(result: &BenchmarkResult) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Start: {}",
        result.started_at.format("%Y-%m-%d %H:%M:%S")
    );
    let _ = writeln!(out, "End  : {}", result.ended_at.format("%Y-%m-%d %H:%M:%S"));
    let _ = writeln!(
        out,
        "Allocated RAM: {}",
        format_bytes(result.allocated_bytes)
    );
    let _ = writeln!(out, "Loops: {}", result.loop_count);
    let _ = writeln!(
        out,
        "WRITE avg: {:.2} GB/s   (data={}, time={:.3}s)",
        result.write_gbps(),
        format_bytes(result.write_bytes),
        result.write_time_s,
    );
    let _ = writeln!(
        out,
        "READ  avg: {:.2} GB/s   (data={}, time={:.3}s)",
        result.read_gbps(),
        format_bytes(result.read_bytes),
        result.read_time_s,
    );
    let _ = writeln!(out, "TOTAL avg: {:.2} GB/s", result.total_gbps());
    let _ = writeln!(out, "Checksum: {:#010X}", result.checksum);
    if let Some(error) = &result.error {
        let _ = writeln!(out, "ERROR: {}", error);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RunError;

    #[test]
    fn format_bytes_units() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.00 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.00 MB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.00 GB");
        assert_eq!(format_bytes(1024u64.pow(4)), "1.00 TB");
    }

    #[test]
    fn format_bytes_fractional() {
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(1024 * 1024 + 512 * 1024), "1.50 MB");
    }

    #[test]
    fn mmss_formatting() {
        assert_eq!(format_mmss(0.0), "00:00");
        assert_eq!(format_mmss(-3.0), "00:00");
        assert_eq!(format_mmss(61.4), "01:01");
        assert_eq!(format_mmss(600.0), "10:00");
    }

    #[test]
    fn progress_line_contains_rates_and_clock() {
        let snapshot = ProgressSnapshot {
            elapsed_s: 12.0,
            remaining_s: 48.0,
            loop_count: 7,
            inst_write_gbps: 10.5,
            inst_read_gbps: 12.25,
            inst_total_gbps: 11.3,
            avg_write_gbps: 10.0,
            avg_read_gbps: 12.0,
            checksum: 0,
        };
        let line = render_progress_line(&snapshot);
        assert!(line.contains("00:12"));
        assert!(line.contains("00:48"));
        assert!(line.contains("loop 7"));
        assert!(line.contains("10.50 GB/s"));
    }

    #[test]
    fn summary_covers_counters_and_checksum() {
        let result = BenchmarkResult {
            ok: true,
            allocated_bytes: 256 * 1024 * 1024,
            write_bytes: 512 * 1024 * 1024,
            read_bytes: 512 * 1024 * 1024,
            write_time_s: 0.25,
            read_time_s: 0.25,
            checksum: 0x1234_ABCD,
            loop_count: 2,
            ..Default::default()
        };
        let summary = render_summary(&result);
        assert!(summary.contains("Allocated RAM: 256.00 MB"));
        assert!(summary.contains("Loops: 2"));
        assert!(summary.contains("WRITE avg: 2.00 GB/s"));
        assert!(summary.contains("Checksum: 0x1234ABCD"));
        assert!(!summary.contains("ERROR"));
    }

    #[test]
    fn summary_includes_error_line_on_failure() {
        let result = BenchmarkResult {
            ok: false,
            error: Some(RunError::Allocation {
                requested: 1 << 60,
                reason: "out of memory".to_string(),
            }),
            ..Default::default()
        };
        let summary = render_summary(&result);
        assert!(summary.contains("ERROR: memory allocation"));
        assert!(summary.contains("Loops: 0"));
    }
}

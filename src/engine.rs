//! Benchmark engine: the timed write/read/checksum loop.
//!
//! One run allocates a single contiguous buffer, primes it so the OS commits
//! backing pages, then repeats full-buffer write and checksum-read passes
//! until the configured duration elapses or cancellation is observed. The
//! buffer is exclusively owned by the engine for the run's duration; no
//! other thread touches it, so the hot loop carries no locks and timing
//! measurements stay free of synchronization jitter.
//!
//! Run phases: Allocating, Priming, Looping, Finalizing. Cancellation is
//! checked only at loop-iteration boundaries in the measurement loop; a
//! started write or read pass always completes so no partial-phase timing
//! sample is ever recorded.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::hint::black_box;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::checksum::Adler32;
use crate::error::RunError;

/// Fill byte for the priming pass, distinct from the measured write byte so
/// the first timed write pass still dirties every cache line.
const PRIME_BYTE: u8 = 0xAA;
/// Fill byte for the measured write phase.
const WRITE_BYTE: u8 = 0x5A;
/// Priming writes in chunks this large, checking cancellation between
/// chunks; priming is untimed and best-effort.
const PRIME_CHUNK: usize = 64 * 1024 * 1024;
/// Minimum interval between progress emissions (caps emission at 5 Hz).
const PROGRESS_INTERVAL: Duration = Duration::from_millis(200);
/// Shortest permitted run duration.
const MIN_DURATION: Duration = Duration::from_secs(1);

const GIB_F: f64 = (1u64 << 30) as f64;

/// Bytes/second over seconds as GiB/s; 0 when the denominator is 0.
fn rate_gbps(bytes: u64, seconds: f64) -> f64 {
    if seconds > 0.0 {
        bytes as f64 / seconds / GIB_F
    } else {
        0.0
    }
}

/// Cooperative cancellation flag shared between the controller and the
/// worker. Setting it is idempotent; checking it is a single atomic load.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. The worker honors it at the next iteration
    /// boundary; a phase already in progress completes first.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Parameters for one benchmark run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Buffer size to allocate.
    pub target_bytes: u64,
    /// Requested run duration; clamped to at least one second.
    pub duration: Duration,
}

impl RunConfig {
    pub fn new(target_bytes: u64, duration: Duration) -> Self {
        Self {
            target_bytes,
            duration,
        }
    }

    /// Duration actually used by the engine.
    pub fn effective_duration(&self) -> Duration {
        self.duration.max(MIN_DURATION)
    }
}

/// Periodic progress emission. Instantaneous rates cover only the window
/// since the previous emission; average rates cover the whole run so far.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub elapsed_s: f64,
    pub remaining_s: f64,
    pub loop_count: u64,
    pub inst_write_gbps: f64,
    pub inst_read_gbps: f64,
    pub inst_total_gbps: f64,
    pub avg_write_gbps: f64,
    pub avg_read_gbps: f64,
    /// Running Adler-32 over all bytes read so far.
    pub checksum: u32,
}

/// Terminal record of a run: created once, immutable thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkResult {
    /// True unless the run ended with an error (cancellation is not an error).
    pub ok: bool,
    pub error: Option<RunError>,
    /// Bytes actually allocated (0 when allocation failed).
    pub allocated_bytes: u64,
    /// Effective (clamped) duration the run was configured for.
    pub configured_duration_s: f64,
    pub write_bytes: u64,
    pub read_bytes: u64,
    pub write_time_s: f64,
    pub read_time_s: f64,
    /// Final Adler-32 over every byte read across all iterations.
    pub checksum: u32,
    /// Completed write+read iterations; `write_bytes == loop_count *
    /// allocated_bytes` and identically for reads.
    pub loop_count: u64,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

impl Default for BenchmarkResult {
    fn default() -> Self {
        Self {
            ok: false,
            error: None,
            allocated_bytes: 0,
            configured_duration_s: 0.0,
            write_bytes: 0,
            read_bytes: 0,
            write_time_s: 0.0,
            read_time_s: 0.0,
            checksum: 0,
            loop_count: 0,
            started_at: Utc::now(),
            ended_at: Utc::now(),
        }
    }
}

impl BenchmarkResult {
    /// Average write throughput in GiB/s (0 when no write time accumulated).
    pub fn write_gbps(&self) -> f64 {
        rate_gbps(self.write_bytes, self.write_time_s)
    }

    /// Average read throughput in GiB/s (0 when no read time accumulated).
    pub fn read_gbps(&self) -> f64 {
        rate_gbps(self.read_bytes, self.read_time_s)
    }

    /// Combined throughput over both phases in GiB/s.
    pub fn total_gbps(&self) -> f64 {
        rate_gbps(
            self.write_bytes + self.read_bytes,
            self.write_time_s + self.read_time_s,
        )
    }
}

/// Accumulated phase counters, also used as the emission-window baseline.
#[derive(Debug, Clone, Copy, Default)]
struct Counters {
    write_bytes: u64,
    read_bytes: u64,
    write_time_s: f64,
    read_time_s: f64,
}

fn make_snapshot(
    totals: &Counters,
    window_base: &Counters,
    elapsed_s: f64,
    remaining_s: f64,
    loop_count: u64,
    checksum: u32,
) -> ProgressSnapshot {
    let d_wb = totals.write_bytes - window_base.write_bytes;
    let d_rb = totals.read_bytes - window_base.read_bytes;
    let d_wt = totals.write_time_s - window_base.write_time_s;
    let d_rt = totals.read_time_s - window_base.read_time_s;

    ProgressSnapshot {
        elapsed_s,
        remaining_s,
        loop_count,
        inst_write_gbps: rate_gbps(d_wb, d_wt),
        inst_read_gbps: rate_gbps(d_rb, d_rt),
        inst_total_gbps: rate_gbps(d_wb + d_rb, d_wt + d_rt),
        avg_write_gbps: rate_gbps(totals.write_bytes, totals.write_time_s),
        avg_read_gbps: rate_gbps(totals.read_bytes, totals.read_time_s),
        checksum,
    }
}

/// Fallible buffer reservation. Failure yields an `Allocation` error without
/// the buffer ever being touched.
fn allocate(target_bytes: u64) -> Result<Vec<u8>, RunError> {
    let len = usize::try_from(target_bytes).map_err(|_| RunError::Allocation {
        requested: target_bytes,
        reason: "size exceeds addressable memory".to_string(),
    })?;

    let mut buffer: Vec<u8> = Vec::new();
    buffer
        .try_reserve_exact(len)
        .map_err(|err| RunError::Allocation {
            requested: target_bytes,
            reason: err.to_string(),
        })?;
    buffer.resize(len, 0);
    Ok(buffer)
}

/// Priming pass: write a fill byte across the whole buffer once, forcing the
/// OS to commit backing pages. Untimed. Cancellation is checked between
/// chunks; an aborted prime still proceeds to the loop (which then exits
/// immediately on the same flag) so the run always reports a result.
fn prime_buffer(buffer: &mut [u8], cancel: &CancelToken) {
    for chunk in buffer.chunks_mut(PRIME_CHUNK) {
        if cancel.is_cancelled() {
            debug!("cancellation observed during priming");
            return;
        }
        chunk.fill(PRIME_BYTE);
    }
}

/// Execute one benchmark run to completion.
///
/// Returns exactly one terminal result whether the run completed, was
/// cancelled (still `ok`), or failed. The buffer is released before this
/// function returns. Progress emissions happen outside the timed sections
/// and at most every 200 ms.
pub fn run_benchmark(
    config: &RunConfig,
    cancel: &CancelToken,
    mut on_progress: Option<&mut dyn FnMut(ProgressSnapshot)>,
) -> BenchmarkResult {
    let started_at = Utc::now();
    let duration = config.effective_duration();
    let configured_duration_s = duration.as_secs_f64();

    debug!(
        target_bytes = config.target_bytes,
        duration_s = configured_duration_s,
        "allocating benchmark buffer"
    );

    let mut buffer = match allocate(config.target_bytes) {
        Ok(buffer) => buffer,
        Err(err) => {
            warn!(error = %err, requested = config.target_bytes, "buffer allocation failed");
            return BenchmarkResult {
                ok: false,
                error: Some(err),
                configured_duration_s,
                started_at,
                ended_at: Utc::now(),
                ..Default::default()
            };
        }
    };
    let len = buffer.len();

    debug!(allocated_bytes = len, "priming buffer");
    prime_buffer(&mut buffer, cancel);

    debug!("entering measurement loop");
    let t0 = Instant::now();
    let deadline = t0 + duration;

    let mut totals = Counters::default();
    let mut window_base = Counters::default();
    // The fold is seeded with 0 (not the standard Adler-32 seed of 1) and
    // carried across iterations, continuing a zero-initialized checksum
    // value the same way zlib's adler32(prev, data) does.
    let mut checksum = Adler32::from_value(0);
    let mut loop_count = 0u64;
    let mut last_report = t0;

    while !cancel.is_cancelled() && Instant::now() < deadline {
        // Write phase: overwrite every byte, timed in isolation.
        let t = Instant::now();
        buffer.fill(WRITE_BYTE);
        totals.write_time_s += t.elapsed().as_secs_f64();
        totals.write_bytes += len as u64;

        // Read phase: fold the full buffer into the running checksum. The
        // carried checksum state makes the pass visit every byte, keeping it
        // bandwidth-bound for buffers larger than cache.
        let t = Instant::now();
        checksum.update(&buffer);
        black_box(checksum.value());
        totals.read_time_s += t.elapsed().as_secs_f64();
        totals.read_bytes += len as u64;

        loop_count += 1;

        // Reporting happens between iterations so its overhead never lands
        // inside a timed phase.
        let now = Instant::now();
        if now.duration_since(last_report) >= PROGRESS_INTERVAL {
            if let Some(emit) = on_progress.as_deref_mut() {
                let elapsed_s = now.duration_since(t0).as_secs_f64();
                let remaining_s = deadline.saturating_duration_since(now).as_secs_f64();
                emit(make_snapshot(
                    &totals,
                    &window_base,
                    elapsed_s,
                    remaining_s,
                    loop_count,
                    checksum.value(),
                ));
            }
            last_report = now;
            window_base = totals;
        }
    }

    if cancel.is_cancelled() {
        debug!(loop_count, "run cancelled");
    }

    // Finalizing: release the large buffer before the terminal result is
    // built, on every exit path.
    drop(buffer);
    let ended_at = Utc::now();

    let result = BenchmarkResult {
        ok: true,
        error: None,
        allocated_bytes: len as u64,
        configured_duration_s,
        write_bytes: totals.write_bytes,
        read_bytes: totals.read_bytes,
        write_time_s: totals.write_time_s,
        read_time_s: totals.read_time_s,
        checksum: checksum.value(),
        loop_count,
        started_at,
        ended_at,
    };

    info!(
        loop_count,
        allocated_bytes = result.allocated_bytes,
        write_gbps = result.write_gbps(),
        read_gbps = result.read_gbps(),
        total_gbps = result.total_gbps(),
        checksum = format_args!("{:#010X}", result.checksum),
        "benchmark run finished"
    );

    result
}

//! Sustained RAM read/write bandwidth benchmark.
//!
//! Allocates a buffer sized near total physical memory, then loops
//! full-buffer write and checksum-read passes for a fixed duration,
//! reporting instantaneous and average GiB/s. Allocating near 100% of
//! physical memory can force the OS to page; that is an intentional part
//! of the design, not a bug.
//!
//! ## Modules
//!
//! - [`probe`]: physical memory and process RSS snapshots from /proc
//! - [`plan`]: allocation sizing policy (near-total RAM with fixed reserve)
//! - [`engine`]: the timed write/read/checksum loop and result record
//! - [`run`]: worker thread spawn, progress/result channel, cancellation
//! - [`report`]: display-ready formatting over results and snapshots
//! - [`checksum`]: Adler-32 running fold used by the read phase
//! - [`logging`]: tracing initialization for binaries and tests

#![forbid(unsafe_code)]

pub mod checksum;
pub mod engine;
pub mod error;
pub mod logging;
pub mod plan;
pub mod probe;
pub mod report;
pub mod run;

pub use engine::{run_benchmark, BenchmarkResult, CancelToken, ProgressSnapshot, RunConfig};
pub use error::RunError;
pub use logging::{init_logging, LogConfig, LogFormat, LoggingGuards};
pub use plan::{plan_allocation, AllocationPlan};
pub use probe::{probe_memory, process_rss, MemoryInfo};
pub use report::{format_bytes, format_mmss, render_progress_line, render_summary};
pub use run::{start_run, RunEvent, RunHandle};

//! RAM bandwidth benchmark CLI.
#![forbid(unsafe_code)]

use anyhow::{bail, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::io::{IsTerminal, Write};
use std::time::Duration;

use ramspeed::{
    format_bytes, init_logging, plan_allocation, probe_memory, process_rss, render_progress_line,
    render_summary, AllocationPlan, BenchmarkResult, CancelToken, LogConfig, MemoryInfo, RunEvent,
};

/// Cadence of the controller's channel poll; comfortably faster than the
/// engine's 5 Hz emission cap.
const POLL_INTERVAL: Duration = Duration::from_millis(120);

const CLEAR_LINE: &str = "\r\x1b[2K";

#[derive(Parser)]
#[command(
    name = "ramspeed",
    about = "Sustained RAM read/write bandwidth benchmark"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show memory info and the allocation plan a run would use
    Info {
        /// Output format (json or pretty)
        #[arg(long, default_value = "pretty")]
        format: OutputFormat,
    },
    /// Run the benchmark
    Run {
        /// Test duration in minutes
        #[arg(long, default_value_t = 1.0)]
        minutes: f64,

        /// Override the allocation size in bytes (default: near-total RAM plan)
        #[arg(long)]
        bytes: Option<u64>,

        /// Output format for the final result (json or pretty)
        #[arg(long, default_value = "pretty")]
        format: OutputFormat,

        /// Suppress the live progress line
        #[arg(long)]
        quiet: bool,
    },
}

#[derive(ValueEnum, Clone, Copy)]
enum OutputFormat {
    Json,
    Pretty,
}

#[derive(Serialize)]
struct InfoReport {
    memory: MemoryInfo,
    plan: AllocationPlan,
    process_rss_bytes: u64,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut log_config = LogConfig::from_env("warn").with_stderr();
    if cli.verbose {
        log_config = log_config.with_level("debug");
    }
    let _logging_guards = init_logging(&log_config)?;

    match cli.command {
        Commands::Info { format } => cmd_info(format),
        Commands::Run {
            minutes,
            bytes,
            format,
            quiet,
        } => cmd_run(minutes, bytes, format, quiet),
    }
}

fn cmd_info(format: OutputFormat) -> Result<()> {
    let memory = probe_memory();
    let plan = plan_allocation(&memory);
    let report = InfoReport {
        memory,
        plan,
        process_rss_bytes: process_rss(),
    };

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Pretty => {
            println!("RAM Total    : {}", format_bytes(memory.total));
            println!(
                "RAM Used     : {} ({:.1}%)",
                format_bytes(memory.used),
                memory.percent_used
            );
            println!("RAM Available: {}", format_bytes(memory.available));
            println!(
                "Plan         : {} (near-100% allocation target)",
                format_bytes(plan.target_bytes)
            );
            println!("Process RSS  : {}", format_bytes(report.process_rss_bytes));
        }
    }
    Ok(())
}

fn cmd_run(minutes: f64, bytes: Option<u64>, format: OutputFormat, quiet: bool) -> Result<()> {
    if !minutes.is_finite() || minutes <= 0.0 {
        bail!("duration must be a positive number of minutes");
    }

    let memory = probe_memory();
    let target_bytes = bytes.unwrap_or_else(|| plan_allocation(&memory).target_bytes);
    let duration = Duration::from_secs_f64(minutes * 60.0);

    if matches!(format, OutputFormat::Pretty) {
        println!(
            "Target allocation (near 100%): {}",
            format_bytes(target_bytes)
        );
        println!(
            "System RAM total: {} | available: {}",
            format_bytes(memory.total),
            format_bytes(memory.available)
        );
        println!("Duration: {:.2} minutes", minutes);
    }

    let handle = ramspeed::start_run(target_bytes, duration)?;
    spawn_cancel_on_interrupt(handle.cancel_token());

    let progress_tty = !quiet && std::io::stderr().is_terminal();
    let result = poll_until_done(&handle, progress_tty);

    if progress_tty {
        let mut stderr = std::io::stderr();
        let _ = stderr.write_all(CLEAR_LINE.as_bytes());
        let _ = stderr.flush();
    }

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        OutputFormat::Pretty => {
            print!("{}", render_summary(&result));
            let after = probe_memory();
            println!(
                "System RAM used: {:.1}% | available: {}",
                after.percent_used,
                format_bytes(after.available)
            );
            println!("Process RSS: {}", format_bytes(process_rss()));
        }
    }

    if !result.ok {
        std::process::exit(1);
    }
    Ok(())
}

/// Drain the event channel at a fixed cadence until the terminal result
/// arrives, rendering a single rewriting progress line on stderr.
fn poll_until_done(handle: &ramspeed::RunHandle, progress_tty: bool) -> BenchmarkResult {
    loop {
        let mut done = None;
        for event in handle.poll() {
            match event {
                RunEvent::Progress(snapshot) => {
                    if progress_tty {
                        let mut stderr = std::io::stderr();
                        let _ = write!(
                            stderr,
                            "{}{}",
                            CLEAR_LINE,
                            render_progress_line(&snapshot)
                        );
                        let _ = stderr.flush();
                    }
                }
                RunEvent::Done(result) => done = Some(result),
            }
        }
        if let Some(result) = done {
            return result;
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

/// Cancel the run cooperatively on Ctrl-C. The run still finishes its
/// current phase and reports a result.
fn spawn_cancel_on_interrupt(cancel: CancelToken) {
    std::thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build();
        let Ok(runtime) = runtime else {
            return;
        };

        runtime.block_on(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupt received; cancelling benchmark run");
                cancel.cancel();
            }
        });
    });
}

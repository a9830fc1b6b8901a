//! Run lifecycle: worker thread, progress/result channel, cancellation.
//!
//! The engine executes on exactly one dedicated worker thread per run; the
//! controlling context communicates with it only through the event channel
//! and the cancellation token. The producer side never blocks: events go
//! over an unbounded mpsc sender, and the consumer drains with a
//! non-blocking poll. Exactly one terminal [`RunEvent::Done`] is sent per
//! run, always last.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::debug;

use crate::engine::{run_benchmark, BenchmarkResult, CancelToken, ProgressSnapshot, RunConfig};
use crate::error::RunError;

/// At most one benchmark run may be in flight per process; ownership of the
/// single large buffer cannot be shared.
static RUN_ACTIVE: AtomicBool = AtomicBool::new(false);

struct ActiveRunGuard;

impl ActiveRunGuard {
    fn acquire() -> Option<Self> {
        // Constructing the guard only after a successful exchange matters:
        // a guard value dropped on the failure path would release the
        // active run's slot.
        if RUN_ACTIVE
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            Some(Self)
        } else {
            None
        }
    }
}

impl Drop for ActiveRunGuard {
    fn drop(&mut self) {
        RUN_ACTIVE.store(false, Ordering::SeqCst);
    }
}

/// Message pushed from the worker to the controller.
#[derive(Debug, Clone)]
pub enum RunEvent {
    /// Advisory periodic progress; safe to discard.
    Progress(ProgressSnapshot),
    /// Authoritative terminal outcome; sent exactly once, always last.
    Done(BenchmarkResult),
}

/// Controller-side handle to an in-flight benchmark run.
pub struct RunHandle {
    rx: Receiver<RunEvent>,
    cancel: CancelToken,
    worker: Option<JoinHandle<()>>,
}

impl RunHandle {
    /// Drain all pending events without blocking. Returns an empty vector
    /// when nothing is queued.
    pub fn poll(&self) -> Vec<RunEvent> {
        let mut events = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        events
    }

    /// Request cooperative cancellation. Idempotent; the run still ends
    /// with a single terminal result.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// A clone of the run's cancellation token, e.g. for a signal handler.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Whether the worker thread has exited.
    pub fn is_finished(&self) -> bool {
        self.worker.as_ref().map_or(true, |worker| worker.is_finished())
    }

    /// Wait for the worker to exit and return the terminal result, unless
    /// it was already consumed by an earlier [`RunHandle::poll`].
    pub fn join(mut self) -> Option<BenchmarkResult> {
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        let mut result = None;
        for event in self.poll() {
            if let RunEvent::Done(done) = event {
                result = Some(done);
            }
        }
        result
    }
}

/// Spawn a benchmark run on a dedicated worker thread.
///
/// Non-blocking: returns a [`RunHandle`] immediately. A second start request
/// while a run is active is rejected with [`RunError::AlreadyRunning`].
pub fn start_run(target_bytes: u64, duration: Duration) -> Result<RunHandle, RunError> {
    let guard = ActiveRunGuard::acquire().ok_or(RunError::AlreadyRunning)?;

    let config = RunConfig::new(target_bytes, duration);
    let cancel = CancelToken::new();
    let worker_cancel = cancel.clone();
    let (tx, rx) = mpsc::channel();

    let worker = thread::Builder::new()
        .name("ramspeed-bench".to_string())
        .spawn(move || {
            // Guard lives for the whole run, panic included.
            let _guard = guard;

            let progress_tx = tx.clone();
            let mut emit = |snapshot: ProgressSnapshot| {
                // A missing receiver means the controller stopped listening;
                // progress is advisory, so drop it silently.
                let _ = progress_tx.send(RunEvent::Progress(snapshot));
            };

            let result = run_benchmark(&config, &worker_cancel, Some(&mut emit));
            if tx.send(RunEvent::Done(result)).is_err() {
                debug!("run finished with no consumer for the terminal result");
            }
        })
        .map_err(|err| RunError::Spawn(err.to_string()))?;

    Ok(RunHandle {
        rx,
        cancel,
        worker: Some(worker),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Runs share the process-wide RUN_ACTIVE guard; serialize the tests
    // that start one.
    static TEST_LOCK: Mutex<()> = Mutex::new(());

    const SMALL_BUFFER: u64 = 4 * 1024 * 1024;

    #[test]
    fn poll_is_nonblocking_before_any_event() {
        let _lock = TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner());

        let handle =
            start_run(SMALL_BUFFER, Duration::from_secs(1)).expect("run should start");
        // Immediately after spawn there may be nothing queued yet; either
        // way the call must return at once.
        let _ = handle.poll();
        handle.cancel();
        let result = handle.join().expect("terminal result");
        assert!(result.ok);
    }

    #[test]
    fn second_start_is_rejected_while_active() {
        let _lock = TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner());

        let first = start_run(SMALL_BUFFER, Duration::from_secs(2)).expect("first run");
        let second = start_run(SMALL_BUFFER, Duration::from_secs(1));
        assert!(matches!(second, Err(RunError::AlreadyRunning)));

        first.cancel();
        assert!(first.join().is_some());

        // Guard released: a new run can start.
        let third = start_run(SMALL_BUFFER, Duration::from_secs(1)).expect("third run");
        third.cancel();
        assert!(third.join().is_some());
    }

    #[test]
    fn cancel_is_idempotent_with_single_terminal_event() {
        let _lock = TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner());

        let handle =
            start_run(SMALL_BUFFER, Duration::from_secs(5)).expect("run should start");
        handle.cancel();
        handle.cancel();

        while !handle.is_finished() {
            thread::sleep(Duration::from_millis(10));
        }

        let done_count = handle
            .poll()
            .iter()
            .filter(|event| matches!(event, RunEvent::Done(_)))
            .count();
        assert_eq!(done_count, 1);
    }
}

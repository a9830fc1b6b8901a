//! Error kinds surfaced by benchmark runs.
//!
//! Every failure site in the core is expected and converted into the
//! terminal result record; there is no unhandled-fault path. Errors are
//! never retried automatically: retrying a failed huge allocation is
//! unlikely to succeed, and silently retrying a faulted memory operation
//! would corrupt measurement validity.

use serde::{Deserialize, Serialize};

/// Errors that can end a benchmark run or reject a start request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum RunError {
    /// The requested buffer could not be reserved. The run ends immediately
    /// with zeroed counters; the buffer is never touched.
    #[error("memory allocation of {requested} bytes failed: {reason}")]
    Allocation { requested: u64, reason: String },

    /// An operation on the buffer faulted during the write phase. Partial
    /// counters accumulated before the fault are preserved in the result.
    #[error("write phase failed: {0}")]
    WritePhase(String),

    /// An operation on the buffer faulted during the read phase. Partial
    /// counters accumulated before the fault are preserved in the result.
    #[error("read phase failed: {0}")]
    ReadPhase(String),

    /// A run is already in flight; the single large buffer cannot be shared.
    #[error("a benchmark run is already in progress")]
    AlreadyRunning,

    /// The worker thread could not be spawned.
    #[error("failed to spawn benchmark worker: {0}")]
    Spawn(String),
}

impl RunError {
    /// Whether the counters in a result carrying this error reflect real
    /// partial progress (phase faults) rather than nothing at all.
    pub fn preserves_partial_counters(&self) -> bool {
        matches!(self, Self::WritePhase(_) | Self::ReadPhase(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        let err = RunError::Allocation {
            requested: 1024,
            reason: "out of memory".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "memory allocation of 1024 bytes failed: out of memory"
        );
        assert_eq!(
            RunError::AlreadyRunning.to_string(),
            "a benchmark run is already in progress"
        );
    }

    #[test]
    fn partial_counter_semantics() {
        assert!(RunError::WritePhase("fault".into()).preserves_partial_counters());
        assert!(RunError::ReadPhase("fault".into()).preserves_partial_counters());
        assert!(!RunError::Allocation {
            requested: 0,
            reason: String::new()
        }
        .preserves_partial_counters());
        assert!(!RunError::AlreadyRunning.preserves_partial_counters());
    }

    #[test]
    fn serde_roundtrip() {
        let err = RunError::ReadPhase("bus error".to_string());
        let json = serde_json::to_string(&err).expect("serialize");
        let back: RunError = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(err, back);
    }
}

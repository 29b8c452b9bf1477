//! Error taxonomy for the triage engine.
//!
//! Stage-level external failures are absorbed into the pipeline state and
//! never surface through these types; only ingestion-time validation and
//! review-time state violations reach callers synchronously.

use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by the triage engine.
#[derive(Debug, Error)]
pub enum TriageError {
    /// Malformed alert rejected at ingestion. Never enters the pipeline.
    #[error("invalid alert: {0}")]
    Validation(String),

    /// The ingestion queue is at capacity. The producer must retry or
    /// reject the submission upstream.
    #[error("ingestion queue full ({capacity} events buffered)")]
    Backpressure {
        /// Configured queue capacity
        capacity: usize,
    },

    /// A stage dependency timed out or errored. Recorded per-stage,
    /// non-fatal to the overall pipeline.
    #[error("external dependency unavailable: {0}")]
    ExternalUnavailable(String),

    /// The remediation plan names an action outside the whitelist.
    #[error("action not in whitelist: {0}")]
    InvalidAction(String),

    /// Versioned write lost a race on approve/reject. The caller should
    /// re-read and retry.
    #[error("concurrent modification of triage {0}")]
    ConcurrentModification(Uuid),

    /// Approve/reject called on a record that is not awaiting review.
    #[error("invalid state for triage {id}: {reason}")]
    InvalidState {
        /// Record identifier
        id: Uuid,
        /// Why the transition is not allowed
        reason: String,
    },

    /// Unknown triage id.
    #[error("triage {0} not found")]
    NotFound(Uuid),

    /// Processing aborted by a cancellation signal between stages.
    #[error("triage cancelled")]
    Cancelled,

    /// Persistent store I/O failure.
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Persistent store (de)serialization failure.
    #[error("store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, TriageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TriageError::Backpressure { capacity: 64 };
        assert!(err.to_string().contains("64"));

        let id = Uuid::new_v4();
        let err = TriageError::NotFound(id);
        assert!(err.to_string().contains(&id.to_string()));
    }
}

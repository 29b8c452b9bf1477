//! Observability port for stage-level spans.
//!
//! Each pipeline stage reports a span through this port at completion.
//! The sink is fire-and-forget: failures never propagate to the pipeline.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::sync::Mutex;
use tracing::info;
use uuid::Uuid;

/// One recorded stage execution.
#[derive(Debug, Clone, Serialize)]
pub struct StageSpan {
    /// Triage session the stage ran in
    pub triage_id: Uuid,
    /// Stage name (gather_context, analyze_logs, ...)
    pub stage: &'static str,
    /// Stage start
    pub started_at: DateTime<Utc>,
    /// Stage end
    pub ended_at: DateTime<Utc>,
    /// Whether the stage reached a usable result
    pub success: bool,
    /// Free-form stage metadata
    pub metadata: Value,
}

impl StageSpan {
    /// Wall-clock duration in milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> i64 {
        (self.ended_at - self.started_at).num_milliseconds()
    }
}

/// Event sink for stage spans.
pub trait ObservabilitySink: Send + Sync {
    /// Record a completed stage span. Must not fail or block.
    fn record(&self, span: StageSpan);
}

/// Default sink: structured log lines via `tracing`.
#[derive(Debug, Default)]
pub struct TracingSink;

impl ObservabilitySink for TracingSink {
    fn record(&self, span: StageSpan) {
        info!(
            triage_id = %span.triage_id,
            stage = span.stage,
            duration_ms = span.duration_ms(),
            success = span.success,
            metadata = %span.metadata,
            "stage complete"
        );
    }
}

/// Test sink that retains every span in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    spans: Mutex<Vec<StageSpan>>,
}

impl RecordingSink {
    /// Create an empty recording sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of recorded spans, in arrival order.
    pub fn spans(&self) -> Vec<StageSpan> {
        self.spans.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl ObservabilitySink for RecordingSink {
    fn record(&self, span: StageSpan) {
        if let Ok(mut spans) = self.spans.lock() {
            spans.push(span);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_sink_accumulates() {
        let sink = RecordingSink::new();
        let now = Utc::now();
        sink.record(StageSpan {
            triage_id: Uuid::new_v4(),
            stage: "gather_context",
            started_at: now,
            ended_at: now,
            success: true,
            metadata: serde_json::json!({ "logs": 3 }),
        });
        assert_eq!(sink.spans().len(), 1);
        assert_eq!(sink.spans()[0].stage, "gather_context");
    }
}

//! Fixed-order triage pipeline.
//!
//! Stage order is not configurable: gather feeds the fan-out of log
//! analysis, metric detection and incident retrieval, whose outputs feed
//! planning, whose output feeds validation. Stage failures degrade the
//! state instead of aborting it; the only aborts are cancellation checks
//! between stage boundaries.

use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::analyzer::LogAnalyzer;
use crate::detector::MetricAnomalyDetector;
use crate::error::TriageError;
use crate::gather::ContextGatherer;
use crate::observe::{ObservabilitySink, StageSpan};
use crate::planner::RemediationPlanner;
use crate::retriever::IncidentRetriever;
use crate::state::{finalize, StageStatus, TriageResult, TriageState, TriageStatus};
use crate::validator::SafetyValidator;

/// Runs one alert through every stage and freezes the outcome.
pub struct TriagePipeline {
    gatherer: ContextGatherer,
    analyzer: LogAnalyzer,
    detector: MetricAnomalyDetector,
    retriever: IncidentRetriever,
    planner: RemediationPlanner,
    validator: SafetyValidator,
    sink: Arc<dyn ObservabilitySink>,
}

impl TriagePipeline {
    /// Assemble a pipeline from its stages.
    #[must_use]
    pub fn new(
        gatherer: ContextGatherer,
        analyzer: LogAnalyzer,
        detector: MetricAnomalyDetector,
        retriever: IncidentRetriever,
        planner: RemediationPlanner,
        validator: SafetyValidator,
        sink: Arc<dyn ObservabilitySink>,
    ) -> Self {
        Self {
            gatherer,
            analyzer,
            detector,
            retriever,
            planner,
            validator,
            sink,
        }
    }

    /// Process one alert to a terminal result.
    ///
    /// Never returns an error: external failures are captured per-stage in
    /// the state, and cancellation produces a failed result with partial
    /// stage outputs intact.
    pub async fn run(&self, state: &mut TriageState, cancel: &CancellationToken) -> TriageResult {
        let alert = state.alert.clone();
        if let Err(e) = state.advance(TriageStatus::InProgress) {
            warn!(triage_id = %state.id, "refusing to reprocess state: {e}");
            return finalize(state.clone());
        }

        if self.abort_if_cancelled(state, cancel, "gather_context") {
            return finalize(state.clone());
        }

        // Stage 1: context. Degrades to empty on timeout, never aborts.
        let started = Utc::now();
        let context = self.gatherer.gather(&alert).await;
        self.sink.record(StageSpan {
            triage_id: state.id,
            stage: "gather_context",
            started_at: started,
            ended_at: Utc::now(),
            success: !context.degraded,
            metadata: json!({
                "logs": context.logs.len(),
                "metrics": context.metric_history.len(),
                "degraded": context.degraded,
            }),
        });

        if self.abort_if_cancelled(state, cancel, "analysis fan-out") {
            return finalize(state.clone());
        }

        // Stage 2: independent analyses run concurrently. Each fails in
        // isolation; a timeout in one leaves the others' outputs intact.
        let fan_out_started = Utc::now();
        let (log_analysis, metric_analysis, incident_matches) = tokio::join!(
            self.analyzer.analyze(&context.logs, &alert),
            async { self.detector.evaluate(&alert) },
            self.retriever.retrieve(&alert),
        );
        let fan_out_ended = Utc::now();

        self.sink.record(StageSpan {
            triage_id: state.id,
            stage: "analyze_logs",
            started_at: fan_out_started,
            ended_at: fan_out_ended,
            success: log_analysis.status == StageStatus::Succeeded,
            metadata: json!({ "hypothesis": &log_analysis.hypothesis }),
        });
        self.sink.record(StageSpan {
            triage_id: state.id,
            stage: "analyze_metrics",
            started_at: fan_out_started,
            ended_at: fan_out_ended,
            success: metric_analysis.status != StageStatus::Failed,
            metadata: json!({
                "z_score": metric_analysis.z_score,
                "anomaly_detected": metric_analysis.anomaly_detected,
            }),
        });
        self.sink.record(StageSpan {
            triage_id: state.id,
            stage: "retrieve_incidents",
            started_at: fan_out_started,
            ended_at: fan_out_ended,
            success: true,
            metadata: json!({ "matches": incident_matches.len() }),
        });

        state.log_analysis = Some(log_analysis);
        state.metric_analysis = Some(metric_analysis);
        state.incident_matches = incident_matches;
        state.updated_at = Utc::now();

        if self.abort_if_cancelled(state, cancel, "plan_remediation") {
            return finalize(state.clone());
        }

        // Stage 3: plan from whatever evidence survived the fan-out.
        let started = Utc::now();
        let plan = self.planner.plan(state);
        self.sink.record(StageSpan {
            triage_id: state.id,
            stage: "plan_remediation",
            started_at: started,
            ended_at: Utc::now(),
            success: true,
            metadata: json!({
                "action": &plan.action,
                "confidence": plan.confidence,
                "blast_radius": plan.blast_radius,
            }),
        });
        state.remediation_plan = Some(plan.clone());

        if self.abort_if_cancelled(state, cancel, "validate_action") {
            return finalize(state.clone());
        }

        // Stage 4: the safety gate always runs when a plan exists.
        let started = Utc::now();
        let validation = self.validator.validate(&plan, &alert);
        self.sink.record(StageSpan {
            triage_id: state.id,
            stage: "validate_action",
            started_at: started,
            ended_at: Utc::now(),
            success: true,
            metadata: json!({ "decision": validation.decision }),
        });

        info!(
            triage_id = %state.id,
            service = alert.service,
            action = plan.action,
            decision = ?validation.decision,
            "triage complete"
        );

        state.validation_result = Some(validation);
        if let Err(e) = state.advance(TriageStatus::Completed) {
            warn!(triage_id = %state.id, "completion transition failed: {e}");
        }
        finalize(state.clone())
    }

    /// Check the token between stages. On cancellation the state moves to
    /// failed with partial stage outputs preserved.
    fn abort_if_cancelled(
        &self,
        state: &mut TriageState,
        cancel: &CancellationToken,
        next_stage: &str,
    ) -> bool {
        if !cancel.is_cancelled() {
            return false;
        }
        warn!(triage_id = %state.id, next_stage, "triage cancelled between stages");
        if state.status == TriageStatus::InProgress {
            let _ = state.advance(TriageStatus::Failed);
        }
        state.failure_reason = Some(TriageError::Cancelled.to_string());
        true
    }
}

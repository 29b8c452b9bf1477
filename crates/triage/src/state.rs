//! Per-alert triage state and the persisted result projection.
//!
//! A `TriageState` is owned exclusively by the worker processing one alert
//! and is never shared across workers. `Finalizer` freezes it into a
//! `TriageResult`, after which only the human-review fields may change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::alert::AlertEvent;
use crate::error::{Result, TriageError};

/// Terminal sub-state of one analysis stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Stage produced a usable result
    Succeeded,
    /// Stage dependency timed out or errored; result is null
    Failed,
    /// Stage ran but could not reach a verdict (e.g. zero baseline)
    Indeterminate,
}

/// Output of the log analysis stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogAnalysis {
    /// Root-cause hypothesis text, null when the stage failed
    pub hypothesis: Option<String>,
    /// Stage outcome
    pub status: StageStatus,
}

/// Output of the metric anomaly detection stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricAnalysis {
    /// Largest absolute z-score across the snapshot, null when no metric
    /// had a usable baseline
    pub z_score: Option<f64>,
    /// Whether any metric crossed the anomaly threshold
    pub anomaly_detected: bool,
    /// Per-metric deviations that crossed the threshold, for the reviewer
    pub anomalies: Vec<String>,
    /// Stage outcome
    pub status: StageStatus,
}

/// A historical incident surfaced by similarity search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentMatch {
    /// Incident identifier (e.g. INC-2025-1234)
    pub id: String,
    /// Service the incident occurred in
    pub service: String,
    /// Alert type of the incident
    pub alert_type: String,
    /// Free-text description of how it was resolved
    pub resolution: String,
    /// Cosine similarity to the current alert, in [0, 1]
    pub similarity: f64,
}

/// Remediation actions eligible for automated execution consideration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemediationAction {
    /// Scale replicas up
    Scale,
    /// Restart affected instances
    Restart,
    /// Apply rate limiting upstream
    RateLimit,
    /// No automated action proposed
    NoAction,
}

impl RemediationAction {
    /// Parse an action name against the whitelist.
    #[must_use]
    pub fn parse(action: &str) -> Option<Self> {
        match action {
            "scale" => Some(Self::Scale),
            "restart" => Some(Self::Restart),
            "rate-limit" => Some(Self::RateLimit),
            "no_action" => Some(Self::NoAction),
            _ => None,
        }
    }

    /// Canonical action name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scale => "scale",
            Self::Restart => "restart",
            Self::RateLimit => "rate-limit",
            Self::NoAction => "no_action",
        }
    }
}

impl std::fmt::Display for RemediationAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An action proposal synthesized from the analysis stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemediationPlan {
    /// Proposed action name. Validated against the whitelist by the
    /// safety gate, so free-form values are representable here.
    pub action: String,
    /// Planner confidence in [0, 1]
    pub confidence: f64,
    /// Root-cause hypothesis and supporting evidence
    pub rationale: String,
    /// Estimated number of instances affected if the action executes
    pub blast_radius: u32,
}

/// Safety gate decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// Eligible for execution without human review
    AutoApproved,
    /// Blocked pending explicit human approve/reject
    RequiresApproval,
    /// Blocked outright by policy
    Rejected,
}

/// Output of the safety validation stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// The gate decision
    pub decision: Decision,
    /// Rules that fired, in evaluation order
    pub reasons: Vec<String>,
}

/// Overall triage lifecycle status. Monotonic:
/// pending -> in_progress -> {completed | failed}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriageStatus {
    /// Queued, not yet picked up by a worker
    Pending,
    /// A worker owns the state and is running the pipeline
    InProgress,
    /// Pipeline reached the validation stage
    Completed,
    /// Unrecoverable error before validation, or cancelled
    Failed,
}

impl TriageStatus {
    /// Whether `next` is a legal forward transition from `self`.
    #[must_use]
    pub fn can_transition(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::InProgress)
                | (Self::InProgress, Self::Completed | Self::Failed)
        )
    }
}

/// Human review decision on a triage awaiting approval.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HumanDecision {
    /// No reviewer has acted yet
    #[default]
    None,
    /// Reviewer approved execution
    Approved,
    /// Reviewer rejected the proposal
    Rejected,
}

/// Mutable per-alert pipeline state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriageState {
    /// Correlation id (same as the alert id)
    pub id: Uuid,
    /// The triggering alert
    pub alert: AlertEvent,
    /// Log analysis output, populated after the fan-out stage
    pub log_analysis: Option<LogAnalysis>,
    /// Metric anomaly output, populated after the fan-out stage
    pub metric_analysis: Option<MetricAnalysis>,
    /// Similar past incidents, similarity descending, possibly empty
    pub incident_matches: Vec<IncidentMatch>,
    /// Remediation proposal
    pub remediation_plan: Option<RemediationPlan>,
    /// Safety gate output
    pub validation_result: Option<ValidationResult>,
    /// Lifecycle status
    pub status: TriageStatus,
    /// Why the triage failed, when `status = failed`
    pub failure_reason: Option<String>,
    /// When the state was created
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp
    pub updated_at: DateTime<Utc>,
}

impl TriageState {
    /// Create a fresh state for an alert picked up by a worker.
    #[must_use]
    pub fn new(alert: AlertEvent) -> Self {
        let now = Utc::now();
        Self {
            id: alert.id,
            alert,
            log_analysis: None,
            metric_analysis: None,
            incident_matches: Vec::new(),
            remediation_plan: None,
            validation_result: None,
            status: TriageStatus::Pending,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Advance the lifecycle status.
    ///
    /// # Errors
    /// Returns `InvalidState` on a reverse or skip transition, preserving
    /// the monotonicity invariant.
    pub fn advance(&mut self, next: TriageStatus) -> Result<()> {
        if !self.status.can_transition(next) {
            return Err(TriageError::InvalidState {
                id: self.id,
                reason: format!("illegal status transition {:?} -> {next:?}", self.status),
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// Persisted projection of a completed (or failed) triage.
///
/// All analysis fields are frozen at finalize time; only `human_decision`,
/// `reviewer` and `feedback` may change afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriageResult {
    /// Correlation id
    pub id: Uuid,
    /// The triggering alert
    pub alert: AlertEvent,
    /// Frozen log analysis output
    pub log_analysis: Option<LogAnalysis>,
    /// Frozen metric analysis output
    pub metric_analysis: Option<MetricAnalysis>,
    /// Frozen incident matches
    pub incident_matches: Vec<IncidentMatch>,
    /// Frozen remediation proposal
    pub remediation_plan: Option<RemediationPlan>,
    /// Frozen safety gate output
    pub validation_result: Option<ValidationResult>,
    /// Lifecycle status at finalize time
    pub status: TriageStatus,
    /// Failure reason, when `status = failed`
    pub failure_reason: Option<String>,
    /// Reviewer decision, mutable only while awaiting approval
    #[serde(default)]
    pub human_decision: HumanDecision,
    /// Who approved/rejected
    #[serde(default)]
    pub reviewer: Option<String>,
    /// Reviewer feedback, required on reject
    #[serde(default)]
    pub feedback: Option<String>,
    /// When the state was created
    pub created_at: DateTime<Utc>,
    /// When the result was finalized
    pub completed_at: Option<DateTime<Utc>>,
}

impl TriageResult {
    /// Placeholder record written at ingestion so the triage is queryable
    /// while queued. Replaced wholesale by the finalized projection.
    #[must_use]
    pub fn queued(alert: AlertEvent) -> Self {
        Self {
            id: alert.id,
            alert,
            log_analysis: None,
            metric_analysis: None,
            incident_matches: Vec::new(),
            remediation_plan: None,
            validation_result: None,
            status: TriageStatus::Pending,
            failure_reason: None,
            human_decision: HumanDecision::None,
            reviewer: None,
            feedback: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Whether this record is awaiting human review.
    #[must_use]
    pub fn awaiting_review(&self) -> bool {
        self.status == TriageStatus::Completed
            && self.human_decision == HumanDecision::None
            && self
                .validation_result
                .as_ref()
                .is_some_and(|v| v.decision == Decision::RequiresApproval)
    }

    /// Apply a human review decision.
    ///
    /// # Errors
    /// Returns `InvalidState` unless the record is completed, gated on
    /// approval, and no reviewer has acted yet. Approved/rejected are
    /// terminal.
    pub fn apply_human_decision(
        &mut self,
        decision: HumanDecision,
        actor: &str,
        feedback: Option<String>,
    ) -> Result<()> {
        if decision == HumanDecision::None {
            return Err(TriageError::Validation(
                "cannot clear a human decision".into(),
            ));
        }
        if !self.awaiting_review() {
            let reason = if self.human_decision != HumanDecision::None {
                format!("already {:?}", self.human_decision)
            } else {
                "not awaiting review".to_string()
            };
            return Err(TriageError::InvalidState {
                id: self.id,
                reason,
            });
        }
        self.human_decision = decision;
        self.reviewer = Some(actor.to_string());
        self.feedback = feedback;
        Ok(())
    }
}

/// Freeze a pipeline state into its persisted projection.
///
/// Partial failure never discards prior stage results: whatever fields the
/// pipeline populated are carried over verbatim.
#[must_use]
pub fn finalize(state: TriageState) -> TriageResult {
    TriageResult {
        id: state.id,
        alert: state.alert,
        log_analysis: state.log_analysis,
        metric_analysis: state.metric_analysis,
        incident_matches: state.incident_matches,
        remediation_plan: state.remediation_plan,
        validation_result: state.validation_result,
        status: state.status,
        failure_reason: state.failure_reason,
        human_decision: HumanDecision::None,
        reviewer: None,
        feedback: None,
        created_at: state.created_at,
        completed_at: Some(Utc::now()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::Severity;

    fn sample_alert() -> AlertEvent {
        AlertEvent {
            id: Uuid::new_v4(),
            service: "auth-service".to_string(),
            severity: Severity::Warning,
            alert_type: "latency_spike".to_string(),
            detector: "threshold".to_string(),
            timestamp: Utc::now(),
            metric_snapshot: std::collections::BTreeMap::new(),
            context: crate::alert::AlertContext::default(),
        }
    }

    #[test]
    fn test_status_is_monotonic() {
        let mut state = TriageState::new(sample_alert());
        assert!(state.advance(TriageStatus::Completed).is_err());
        state.advance(TriageStatus::InProgress).unwrap();
        assert!(state.advance(TriageStatus::Pending).is_err());
        state.advance(TriageStatus::Completed).unwrap();
        assert!(state.advance(TriageStatus::Failed).is_err());
    }

    #[test]
    fn test_action_whitelist_roundtrip() {
        for action in ["scale", "restart", "rate-limit", "no_action"] {
            assert_eq!(RemediationAction::parse(action).unwrap().as_str(), action);
        }
        assert!(RemediationAction::parse("delete-database").is_none());
    }

    #[test]
    fn test_human_decision_requires_pending_review() {
        let state = TriageState::new(sample_alert());
        let mut result = finalize(state);
        // Not completed: decision must be refused.
        let err = result.apply_human_decision(HumanDecision::Approved, "alice", None);
        assert!(matches!(err, Err(TriageError::InvalidState { .. })));
    }

    #[test]
    fn test_human_decision_is_terminal() {
        let mut state = TriageState::new(sample_alert());
        state.advance(TriageStatus::InProgress).unwrap();
        state.validation_result = Some(ValidationResult {
            decision: Decision::RequiresApproval,
            reasons: vec!["critical severity".to_string()],
        });
        state.advance(TriageStatus::Completed).unwrap();
        let mut result = finalize(state);

        result
            .apply_human_decision(HumanDecision::Approved, "alice", None)
            .unwrap();
        assert_eq!(result.human_decision, HumanDecision::Approved);
        assert_eq!(result.reviewer.as_deref(), Some("alice"));

        let second = result.apply_human_decision(HumanDecision::Rejected, "bob", None);
        assert!(matches!(second, Err(TriageError::InvalidState { .. })));
        // First decision unchanged.
        assert_eq!(result.human_decision, HumanDecision::Approved);
    }

    #[test]
    fn test_finalize_preserves_partial_fields() {
        let mut state = TriageState::new(sample_alert());
        state.advance(TriageStatus::InProgress).unwrap();
        state.metric_analysis = Some(MetricAnalysis {
            z_score: Some(3.2),
            anomaly_detected: true,
            anomalies: vec!["latency_p95_ms: z=3.20".to_string()],
            status: StageStatus::Succeeded,
        });
        state.log_analysis = Some(LogAnalysis {
            hypothesis: None,
            status: StageStatus::Failed,
        });
        state.advance(TriageStatus::Failed).unwrap();
        state.failure_reason = Some("no usable plan".to_string());

        let result = finalize(state);
        assert_eq!(result.status, TriageStatus::Failed);
        assert!(result.metric_analysis.is_some());
        assert_eq!(
            result.log_analysis.unwrap().status,
            StageStatus::Failed
        );
    }
}

//! Remediation planning: synthesize the three analyses into one proposal.

use tracing::debug;

use crate::config::PlannerConfig;
use crate::state::{RemediationAction, RemediationPlan, StageStatus, TriageState};

/// Synthesizes an action proposal with a confidence score.
pub struct RemediationPlanner {
    config: PlannerConfig,
}

impl RemediationPlanner {
    /// Create a planner.
    #[must_use]
    pub fn new(config: PlannerConfig) -> Self {
        Self { config }
    }

    /// Plan a remediation from the joined analysis outputs.
    ///
    /// Without decisive evidence (no anomaly, no hypothesis, no incident
    /// match) the proposal is `no_action` with confidence capped at the
    /// configured low ceiling.
    #[must_use]
    pub fn plan(&self, state: &TriageState) -> RemediationPlan {
        let anomaly = state
            .metric_analysis
            .as_ref()
            .is_some_and(|m| m.anomaly_detected);
        let hypothesis = state
            .log_analysis
            .as_ref()
            .and_then(|l| l.hypothesis.as_deref());
        let best_incident = state
            .incident_matches
            .first()
            .filter(|m| m.similarity >= self.config.incident_similarity_floor);

        if !anomaly && hypothesis.is_none() && best_incident.is_none() {
            let confidence = self.config.low_confidence_ceiling.min(0.1);
            debug!(
                triage_id = %state.id,
                "no decisive evidence, proposing no_action"
            );
            return RemediationPlan {
                action: RemediationAction::NoAction.as_str().to_string(),
                confidence,
                rationale: "No decisive evidence: metrics nominal, no log hypothesis, \
                            no similar past incident."
                    .to_string(),
                blast_radius: 0,
            };
        }

        let action = best_incident
            .and_then(|m| action_from_resolution(&m.resolution))
            .unwrap_or_else(|| action_from_alert_type(&state.alert.alert_type));

        let mut confidence: f64 = 0.3;
        if anomaly {
            confidence += 0.25;
        }
        if hypothesis.is_some() {
            confidence += 0.2;
        }
        if let Some(incident) = best_incident {
            confidence += 0.25 * incident.similarity;
        }
        let confidence = confidence.clamp(0.0, 1.0);

        let mut rationale = Vec::new();
        if let Some(hypothesis) = hypothesis {
            rationale.push(format!("Hypothesis: {hypothesis}"));
        }
        if let Some(metric) = &state.metric_analysis {
            if metric.anomaly_detected {
                rationale.push(format!(
                    "Metric anomalies: {}",
                    metric.anomalies.join(", ")
                ));
            } else if metric.status == StageStatus::Indeterminate {
                rationale.push("Metric analysis indeterminate (no usable baseline)".to_string());
            }
        }
        if let Some(incident) = best_incident {
            rationale.push(format!(
                "Precedent {} ({:.0}% similar): {}",
                incident.id,
                incident.similarity * 100.0,
                incident.resolution
            ));
        }

        RemediationPlan {
            action: action.as_str().to_string(),
            confidence,
            rationale: rationale.join(". "),
            blast_radius: blast_radius_for(action),
        }
    }
}

/// Map a past incident's resolution text to a whitelisted action.
fn action_from_resolution(resolution: &str) -> Option<RemediationAction> {
    let lower = resolution.to_lowercase();
    if lower.contains("rate limit") || lower.contains("rate-limit") {
        Some(RemediationAction::RateLimit)
    } else if lower.contains("scale") {
        Some(RemediationAction::Scale)
    } else if lower.contains("restart") {
        Some(RemediationAction::Restart)
    } else {
        None
    }
}

/// Default action per alert type when no precedent applies.
fn action_from_alert_type(alert_type: &str) -> RemediationAction {
    match alert_type {
        "error_rate_spike" => RemediationAction::Restart,
        "latency_spike" | "cpu_anomaly" | "memory_anomaly" => RemediationAction::Scale,
        _ => RemediationAction::Restart,
    }
}

/// Estimated instances affected if the action executes.
fn blast_radius_for(action: RemediationAction) -> u32 {
    match action {
        RemediationAction::NoAction => 0,
        RemediationAction::RateLimit => 1,
        RemediationAction::Scale => 2,
        RemediationAction::Restart => 3,
    }
}

//! Safety validation rule engine.
//!
//! Deterministic, order-sensitive gating: the first matching rule wins.
//! The decision is a pure function of the plan, the alert, and the
//! configured policy constants; the validator never infers thresholds.

use crate::alert::AlertEvent;
use crate::config::SafetyPolicy;
use crate::state::{Decision, RemediationAction, RemediationPlan, ValidationResult};

/// Safety gate for proposed remediations.
pub struct SafetyValidator {
    policy: SafetyPolicy,
}

impl SafetyValidator {
    /// Create a validator with the given policy constants.
    #[must_use]
    pub fn new(policy: SafetyPolicy) -> Self {
        Self { policy }
    }

    /// Gate a remediation plan. Rule order, first match wins:
    ///
    /// 1. action outside the whitelist -> rejected
    /// 2. critical severity -> requires approval, regardless of confidence
    /// 3. service on the critical-services list -> requires approval
    /// 4. blast radius above the policy maximum -> requires approval
    /// 5. confident plan for a non-critical alert -> auto-approved
    /// 6. otherwise -> requires approval
    #[must_use]
    pub fn validate(&self, plan: &RemediationPlan, alert: &AlertEvent) -> ValidationResult {
        if RemediationAction::parse(&plan.action).is_none() {
            return ValidationResult {
                decision: Decision::Rejected,
                reasons: vec![format!(
                    "InvalidAction: '{}' is not in the remediation whitelist",
                    plan.action
                )],
            };
        }

        if alert.severity.is_critical() {
            return ValidationResult {
                decision: Decision::RequiresApproval,
                reasons: vec!["critical severity never auto-executes".to_string()],
            };
        }

        if self.policy.critical_services.iter().any(|s| s == &alert.service) {
            return ValidationResult {
                decision: Decision::RequiresApproval,
                reasons: vec![format!(
                    "service '{}' requires approval for any action",
                    alert.service
                )],
            };
        }

        if plan.blast_radius > self.policy.max_blast_radius {
            return ValidationResult {
                decision: Decision::RequiresApproval,
                reasons: vec![format!(
                    "blast radius {} exceeds policy maximum {}",
                    plan.blast_radius, self.policy.max_blast_radius
                )],
            };
        }

        if plan.confidence >= self.policy.auto_approve_threshold {
            return ValidationResult {
                decision: Decision::AutoApproved,
                reasons: vec![format!(
                    "confidence {:.2} meets auto-approve threshold {:.2}",
                    plan.confidence, self.policy.auto_approve_threshold
                )],
            };
        }

        ValidationResult {
            decision: Decision::RequiresApproval,
            reasons: vec![format!(
                "confidence {:.2} below auto-approve threshold {:.2}",
                plan.confidence, self.policy.auto_approve_threshold
            )],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::{AlertContext, Severity};
    use chrono::Utc;
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn alert(service: &str, severity: Severity) -> AlertEvent {
        AlertEvent {
            id: Uuid::new_v4(),
            service: service.to_string(),
            severity,
            alert_type: "latency_spike".to_string(),
            detector: "threshold".to_string(),
            timestamp: Utc::now(),
            metric_snapshot: BTreeMap::new(),
            context: AlertContext::default(),
        }
    }

    fn plan(action: &str, confidence: f64, blast_radius: u32) -> RemediationPlan {
        RemediationPlan {
            action: action.to_string(),
            confidence,
            rationale: "test".to_string(),
            blast_radius,
        }
    }

    fn validator() -> SafetyValidator {
        SafetyValidator::new(SafetyPolicy::default())
    }

    #[test]
    fn test_non_whitelisted_action_rejected() {
        // Rejection regardless of confidence or severity.
        for severity in [Severity::Info, Severity::Warning, Severity::Critical] {
            let result = validator().validate(
                &plan("delete-database", 0.99, 1),
                &alert("auth-service", severity),
            );
            assert_eq!(result.decision, Decision::Rejected);
            assert!(result.reasons[0].contains("InvalidAction"));
        }
    }

    #[test]
    fn test_critical_severity_never_auto_approves() {
        for action in ["scale", "restart", "rate-limit", "no_action"] {
            let result = validator().validate(
                &plan(action, 0.99, 1),
                &alert("auth-service", Severity::Critical),
            );
            assert_eq!(result.decision, Decision::RequiresApproval);
        }
    }

    #[test]
    fn test_critical_service_requires_approval() {
        let policy = SafetyPolicy {
            critical_services: vec!["payment-service".to_string()],
            ..SafetyPolicy::default()
        };
        let validator = SafetyValidator::new(policy);
        let result = validator.validate(
            &plan("scale", 0.99, 1),
            &alert("payment-service", Severity::Info),
        );
        assert_eq!(result.decision, Decision::RequiresApproval);
        assert!(result.reasons[0].contains("payment-service"));
    }

    #[test]
    fn test_blast_radius_gate() {
        let result = validator().validate(
            &plan("scale", 0.99, 50),
            &alert("auth-service", Severity::Warning),
        );
        assert_eq!(result.decision, Decision::RequiresApproval);
        assert!(result.reasons[0].contains("blast radius"));
    }

    #[test]
    fn test_confident_non_critical_auto_approves() {
        for severity in [Severity::Info, Severity::Warning] {
            let result =
                validator().validate(&plan("scale", 0.85, 2), &alert("auth-service", severity));
            assert_eq!(result.decision, Decision::AutoApproved);
        }
    }

    #[test]
    fn test_low_confidence_requires_approval() {
        let result = validator().validate(
            &plan("restart", 0.4, 2),
            &alert("auth-service", Severity::Warning),
        );
        assert_eq!(result.decision, Decision::RequiresApproval);
        assert!(result.reasons[0].contains("below auto-approve"));
    }

    #[test]
    fn test_validation_is_deterministic() {
        let plan = plan("scale", 0.72, 2);
        let alert = alert("auth-service", Severity::Warning);
        let first = validator().validate(&plan, &alert);
        for _ in 0..10 {
            assert_eq!(validator().validate(&plan, &alert), first);
        }
    }
}

//! Alert event types and ingestion-time validation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::error::{Result, TriageError};

/// Alert priority level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Informational, no urgency
    Info,
    /// Degradation worth attention
    Warning,
    /// Critical path impact
    Critical,
}

impl Severity {
    /// Critical alerts never auto-execute remediations.
    #[must_use]
    pub fn is_critical(self) -> bool {
        matches!(self, Self::Critical)
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// A single metric observation attached to an alert.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricReading {
    /// Value at alert time
    pub current: f64,
    /// Historical baseline, if the detector that fired supplied one
    #[serde(default)]
    pub baseline: Option<f64>,
}

/// Additional context attached by the monitoring system.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertContext {
    /// Identifiers of log lines correlated with the alert
    #[serde(default)]
    pub recent_log_ids: Vec<String>,
    /// Region the alert fired in
    #[serde(default)]
    pub region: Option<String>,
}

/// Alert payload received from monitoring systems.
///
/// Immutable once submitted. The `id` is the correlation id for the whole
/// triage session; a second submission with the same id is rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    /// Correlation id, caller-supplied or generated at ingestion
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    /// Source service (auth-service, payment-service, ...)
    pub service: String,
    /// Alert priority
    pub severity: Severity,
    /// Type of anomaly detected (latency_spike, error_rate_spike, ...)
    pub alert_type: String,
    /// Detection method that fired (threshold, zscore, ...)
    pub detector: String,
    /// When the alert fired
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    /// Metric values at alert time, keyed by metric name.
    ///
    /// BTreeMap keeps snapshot iteration deterministic across runs.
    #[serde(default)]
    pub metric_snapshot: BTreeMap<String, MetricReading>,
    /// Correlated context
    #[serde(default)]
    pub context: AlertContext,
}

impl AlertEvent {
    /// Validate an incoming alert before it enters the pipeline.
    ///
    /// # Errors
    /// Returns `TriageError::Validation` for malformed payloads. These are
    /// rejected at ingestion and never queued.
    pub fn validate(&self) -> Result<()> {
        if self.service.trim().is_empty() {
            return Err(TriageError::Validation("service must not be empty".into()));
        }
        if self.alert_type.trim().is_empty() {
            return Err(TriageError::Validation(
                "alert_type must not be empty".into(),
            ));
        }
        if self.detector.trim().is_empty() {
            return Err(TriageError::Validation("detector must not be empty".into()));
        }
        for (name, reading) in &self.metric_snapshot {
            if !reading.current.is_finite() {
                return Err(TriageError::Validation(format!(
                    "metric {name} has non-finite current value"
                )));
            }
            if let Some(baseline) = reading.baseline {
                if !baseline.is_finite() {
                    return Err(TriageError::Validation(format!(
                        "metric {name} has non-finite baseline"
                    )));
                }
            }
        }
        Ok(())
    }
}

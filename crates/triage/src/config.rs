//! Explicit configuration for the triage engine.
//!
//! Every policy constant is passed into component constructors from these
//! structs; nothing reads ambient global state. Numeric defaults live here,
//! at the composition root, and are overridable via CLI flags.

use std::time::Duration;

/// Anomaly detection policy.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Baseline scaling factor used as the denominator spread. Must be > 0.
    pub std_factor: f64,
    /// Absolute z-score above which a metric is anomalous. Must be > 0.
    pub threshold: f64,
    /// Sliding-window length per (service, metric) pair for the fallback
    /// baseline.
    pub window_size: usize,
    /// Minimum window samples before the fallback baseline is usable.
    pub min_samples: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            std_factor: 0.1,
            threshold: 2.5,
            window_size: 100,
            min_samples: 10,
        }
    }
}

/// Safety gate policy constants. The validator never infers these.
#[derive(Debug, Clone)]
pub struct SafetyPolicy {
    /// Minimum confidence for auto-approval of non-critical alerts.
    pub auto_approve_threshold: f64,
    /// Maximum estimated blast radius eligible for auto-approval.
    pub max_blast_radius: u32,
    /// Services that always require approval regardless of confidence.
    pub critical_services: Vec<String>,
}

impl Default for SafetyPolicy {
    fn default() -> Self {
        Self {
            auto_approve_threshold: 0.7,
            max_blast_radius: 5,
            critical_services: Vec::new(),
        }
    }
}

/// Remediation planner policy.
#[derive(Debug, Clone)]
pub struct PlannerConfig {
    /// Confidence ceiling when no decisive evidence exists.
    pub low_confidence_ceiling: f64,
    /// Incident similarity above which a past resolution is trusted.
    pub incident_similarity_floor: f64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            low_confidence_ceiling: 0.2,
            incident_similarity_floor: 0.6,
        }
    }
}

/// Per-stage timeouts for external dependencies.
#[derive(Debug, Clone)]
pub struct StageTimeouts {
    /// Log/metric snapshot fetch
    pub gather: Duration,
    /// Reasoning capability call
    pub reasoning: Duration,
    /// Similarity search
    pub retrieval: Duration,
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self {
            gather: Duration::from_secs(10),
            reasoning: Duration::from_secs(30),
            retrieval: Duration::from_secs(5),
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone)]
pub struct TriageConfig {
    /// Bounded ingestion queue capacity.
    pub queue_capacity: usize,
    /// Number of worker loops pulling from the shared queue.
    pub workers: usize,
    /// Incident matches to retain, similarity descending.
    pub incident_top_k: usize,
    /// Lookback window for context gathering.
    pub context_lookback: Duration,
    /// Per-stage timeouts.
    pub timeouts: StageTimeouts,
    /// Anomaly detection policy.
    pub detector: DetectorConfig,
    /// Safety gate policy.
    pub safety: SafetyPolicy,
    /// Planner policy.
    pub planner: PlannerConfig,
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            workers: 2,
            incident_top_k: 5,
            context_lookback: Duration::from_secs(600),
            timeouts: StageTimeouts::default(),
            detector: DetectorConfig::default(),
            safety: SafetyPolicy::default(),
            planner: PlannerConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_positive() {
        let config = TriageConfig::default();
        assert!(config.detector.std_factor > 0.0);
        assert!(config.detector.threshold > 0.0);
        assert!(config.safety.auto_approve_threshold > 0.0);
        assert!(config.queue_capacity > 0);
        assert!(config.workers > 0);
    }
}

//! Synthetic alert generation for demos and load exercises.
//!
//! Draws from a small fixed service registry with per-metric baselines and
//! skews the current value according to the alert type, so generated
//! alerts look plausible to every downstream stage.

use chrono::Utc;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::alert::{AlertContext, AlertEvent, MetricReading, Severity};

/// A service the generator can raise alerts for.
struct ServiceProfile {
    name: &'static str,
    region: &'static str,
    /// Metric name with its steady-state baseline
    metrics: &'static [(&'static str, f64)],
}

const SERVICES: &[ServiceProfile] = &[
    ServiceProfile {
        name: "auth-service",
        region: "us-east-1",
        metrics: &[("latency_p95_ms", 120.0), ("error_rate", 0.02)],
    },
    ServiceProfile {
        name: "checkout",
        region: "us-east-1",
        metrics: &[("latency_p95_ms", 240.0), ("error_rate", 0.01)],
    },
    ServiceProfile {
        name: "search-api",
        region: "eu-west-1",
        metrics: &[("latency_p95_ms", 85.0), ("cpu_percent", 40.0)],
    },
    ServiceProfile {
        name: "payments-gateway",
        region: "us-east-1",
        metrics: &[("error_rate", 0.005), ("latency_p95_ms", 310.0)],
    },
    ServiceProfile {
        name: "notifications",
        region: "eu-west-1",
        metrics: &[("memory_mb", 512.0), ("cpu_percent", 25.0)],
    },
];

const ALERT_TYPES: &[&str] = &[
    "latency_spike",
    "error_rate_spike",
    "cpu_saturation",
    "memory_leak",
];

/// Generates plausible alerts against the fixed service registry.
#[derive(Debug, Default)]
pub struct SyntheticAlertGenerator;

impl SyntheticAlertGenerator {
    /// Create a generator.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Generate one alert with a random service and type.
    #[must_use]
    pub fn generate(&self) -> AlertEvent {
        self.generate_with(None, None)
    }

    /// Generate one alert, pinning the service and/or type when given.
    /// Unknown names fall back to a random registry entry.
    #[must_use]
    pub fn generate_with(&self, service: Option<&str>, alert_type: Option<&str>) -> AlertEvent {
        let mut rng = rand::thread_rng();

        let profile = service
            .and_then(|name| SERVICES.iter().find(|p| p.name == name))
            .or_else(|| SERVICES.choose(&mut rng))
            .unwrap_or(&SERVICES[0]);
        let alert_type = alert_type
            .filter(|t| ALERT_TYPES.contains(t))
            .unwrap_or_else(|| {
                ALERT_TYPES
                    .choose(&mut rng)
                    .copied()
                    .unwrap_or("latency_spike")
            });

        let mut snapshot = BTreeMap::new();
        for (metric, baseline) in profile.metrics {
            let multiplier = multiplier_for(alert_type, metric, &mut rng);
            snapshot.insert(
                (*metric).to_string(),
                MetricReading {
                    current: baseline * multiplier,
                    baseline: Some(*baseline),
                },
            );
        }

        let severity = match rng.gen_range(0..10) {
            0..=1 => Severity::Critical,
            2..=6 => Severity::Warning,
            _ => Severity::Info,
        };

        AlertEvent {
            id: Uuid::new_v4(),
            service: profile.name.to_string(),
            severity,
            alert_type: alert_type.to_string(),
            detector: "synthetic".to_string(),
            timestamp: Utc::now(),
            metric_snapshot: snapshot,
            context: AlertContext {
                recent_log_ids: Vec::new(),
                region: Some(profile.region.to_string()),
            },
        }
    }
}

/// Skew factor for one metric under one alert type. Metrics the alert
/// type implicates move far from baseline; the rest jitter around it.
fn multiplier_for(alert_type: &str, metric: &str, rng: &mut impl Rng) -> f64 {
    let implicated = matches!(
        (alert_type, metric),
        ("latency_spike", "latency_p95_ms")
            | ("error_rate_spike", "error_rate")
            | ("cpu_saturation", "cpu_percent")
            | ("memory_leak", "memory_mb")
    );
    if implicated {
        rng.gen_range(4.0..12.0)
    } else {
        rng.gen_range(0.8..1.3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_alerts_pass_validation() {
        let generator = SyntheticAlertGenerator::new();
        for _ in 0..100 {
            let alert = generator.generate();
            alert.validate().unwrap();
        }
    }

    #[test]
    fn test_pinned_service_and_type_respected() {
        let generator = SyntheticAlertGenerator::new();
        let alert = generator.generate_with(Some("checkout"), Some("latency_spike"));
        assert_eq!(alert.service, "checkout");
        assert_eq!(alert.alert_type, "latency_spike");

        let latency = alert.metric_snapshot.get("latency_p95_ms").unwrap();
        let baseline = latency.baseline.unwrap();
        assert!(latency.current > baseline * 3.0);
    }

    #[test]
    fn test_unknown_service_falls_back_to_registry() {
        let generator = SyntheticAlertGenerator::new();
        let alert = generator.generate_with(Some("no-such-service"), None);
        assert!(SERVICES.iter().any(|p| p.name == alert.service));
    }
}

//! Deterministic metric anomaly scoring.
//!
//! Scores each metric in the alert snapshot against its baseline:
//! `z = (current - baseline) / (baseline * std_factor)`. When the event
//! carries no baseline, a per-(service, metric) sliding window of recent
//! observations supplies one as the window mean. A zero baseline makes the
//! division undefined, so scoring returns an indeterminate sentinel rather
//! than an error.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tracing::debug;

use crate::alert::AlertEvent;
use crate::config::DetectorConfig;
use crate::error::{Result, TriageError};
use crate::state::{MetricAnalysis, StageStatus};

/// Score for a single metric.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricScore {
    /// Normalized deviation, `None` when the baseline is unusable
    pub z_score: Option<f64>,
    /// Whether the deviation crossed the threshold
    pub anomaly_detected: bool,
}

/// Pure scoring function.
///
/// `std_factor` and `threshold` are policy constants, not derived from
/// data. `baseline = 0` yields the indeterminate sentinel.
#[must_use]
pub fn score(current: f64, baseline: f64, std_factor: f64, threshold: f64) -> MetricScore {
    if baseline == 0.0 {
        return MetricScore {
            z_score: None,
            anomaly_detected: false,
        };
    }
    let z = (current - baseline) / (baseline * std_factor);
    MetricScore {
        z_score: Some(z),
        anomaly_detected: z.abs() > threshold,
    }
}

/// Stateful detector holding the sliding-window fallback baselines.
///
/// The windows are the only mutable state and are keyed and locked per
/// detector instance; everything else is read-only policy.
pub struct MetricAnomalyDetector {
    config: DetectorConfig,
    /// Observed values per (service, metric), newest last
    windows: Mutex<HashMap<(String, String), VecDeque<f64>>>,
}

impl MetricAnomalyDetector {
    /// Create a detector.
    ///
    /// # Errors
    /// Returns `Validation` when `std_factor` or `threshold` is not
    /// strictly positive.
    pub fn new(config: DetectorConfig) -> Result<Self> {
        if config.std_factor <= 0.0 {
            return Err(TriageError::Validation(
                "detector std_factor must be > 0".into(),
            ));
        }
        if config.threshold <= 0.0 {
            return Err(TriageError::Validation(
                "detector threshold must be > 0".into(),
            ));
        }
        Ok(Self {
            config,
            windows: Mutex::new(HashMap::new()),
        })
    }

    /// Record an observation into the sliding window for (service, metric).
    pub fn observe(&self, service: &str, metric: &str, value: f64) {
        if !value.is_finite() {
            return;
        }
        let Ok(mut windows) = self.windows.lock() else {
            return;
        };
        let window = windows
            .entry((service.to_string(), metric.to_string()))
            .or_default();
        if window.len() >= self.config.window_size {
            window.pop_front();
        }
        window.push_back(value);
    }

    /// Fallback baseline: window mean, once enough samples exist.
    fn window_baseline(&self, service: &str, metric: &str) -> Option<f64> {
        let windows = self.windows.lock().ok()?;
        let window = windows.get(&(service.to_string(), metric.to_string()))?;
        if window.len() < self.config.min_samples {
            return None;
        }
        Some(window.iter().sum::<f64>() / window.len() as f64)
    }

    /// Evaluate every metric in the alert snapshot.
    ///
    /// Metrics without a usable baseline are indeterminate. The aggregate
    /// `z_score` is the largest absolute deviation; the stage status is
    /// `Indeterminate` only when no metric could be scored.
    #[must_use]
    pub fn evaluate(&self, alert: &AlertEvent) -> MetricAnalysis {
        let mut max_z: Option<f64> = None;
        let mut anomaly_detected = false;
        let mut anomalies = Vec::new();
        let mut scored_any = false;

        for (name, reading) in &alert.metric_snapshot {
            let baseline = reading
                .baseline
                .or_else(|| self.window_baseline(&alert.service, name));

            // The current value feeds the window either way, so baselines
            // warm up even from events without one.
            self.observe(&alert.service, name, reading.current);

            let Some(baseline) = baseline else {
                debug!(
                    service = alert.service,
                    metric = name,
                    "no baseline available, indeterminate"
                );
                continue;
            };

            let result = score(
                reading.current,
                baseline,
                self.config.std_factor,
                self.config.threshold,
            );
            let Some(z) = result.z_score else {
                // Zero baseline: indeterminate for this metric.
                continue;
            };
            scored_any = true;

            if max_z.is_none_or(|m| z.abs() > m.abs()) {
                max_z = Some(z);
            }
            if result.anomaly_detected {
                anomaly_detected = true;
                anomalies.push(format!("{name}: z={z:.2}"));
            }
        }

        MetricAnalysis {
            z_score: max_z,
            anomaly_detected,
            anomalies,
            status: if scored_any {
                StageStatus::Succeeded
            } else {
                StageStatus::Indeterminate
            },
        }
    }
}

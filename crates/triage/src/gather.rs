//! Context gathering: log and metric snapshots for an alert's window.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::alert::AlertEvent;
use crate::error::{Result, TriageError};

/// A single log line from the telemetry backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Log line identifier
    pub id: String,
    /// When the line was emitted
    pub timestamp: DateTime<Utc>,
    /// Raw log text
    pub line: String,
}

/// One historical metric observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricPoint {
    /// When the value was observed
    pub timestamp: DateTime<Utc>,
    /// Observed value
    pub value: f64,
}

/// Time range for a telemetry query.
#[derive(Debug, Clone, Copy)]
pub struct TimeRange {
    /// Range start (inclusive)
    pub start: DateTime<Utc>,
    /// Range end (exclusive)
    pub end: DateTime<Utc>,
}

/// Telemetry fetched for one alert.
#[derive(Debug, Clone, Default)]
pub struct Telemetry {
    /// Log lines within the window
    pub logs: Vec<LogEntry>,
    /// Metric history per metric name
    pub metrics: HashMap<String, Vec<MetricPoint>>,
}

/// Port to the log/metric data source.
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    /// Fetch logs and metric history for a service within a time range.
    async fn fetch(&self, service: &str, range: TimeRange) -> Result<Telemetry>;
}

/// Context gathered for the downstream analysis stages.
#[derive(Debug, Clone, Default)]
pub struct GatheredContext {
    /// Bounded log window, alert-referenced lines first
    pub logs: Vec<LogEntry>,
    /// Metric history per metric name
    pub metric_history: HashMap<String, Vec<MetricPoint>>,
    /// True when the fetch timed out or errored and the context is
    /// empty/partial. A degraded context is still a valid stage input.
    pub degraded: bool,
}

/// Fetches bounded-size context for an alert's window.
pub struct ContextGatherer {
    source: std::sync::Arc<dyn TelemetrySource>,
    fetch_timeout: Duration,
    lookback: Duration,
    max_log_lines: usize,
}

impl ContextGatherer {
    /// Create a gatherer over a telemetry source.
    #[must_use]
    pub fn new(
        source: std::sync::Arc<dyn TelemetrySource>,
        fetch_timeout: Duration,
        lookback: Duration,
    ) -> Self {
        Self {
            source,
            fetch_timeout,
            lookback,
            max_log_lines: 500,
        }
    }

    /// Gather logs and metric history for the alert's window.
    ///
    /// A timeout or source error degrades to an empty context instead of
    /// failing the pipeline; the caller treats `degraded` as advisory.
    pub async fn gather(&self, alert: &AlertEvent) -> GatheredContext {
        let lookback = ChronoDuration::from_std(self.lookback)
            .unwrap_or_else(|_| ChronoDuration::minutes(10));
        let range = TimeRange {
            start: alert.timestamp - lookback,
            end: Utc::now(),
        };

        let fetched = timeout(self.fetch_timeout, self.source.fetch(&alert.service, range)).await;

        let telemetry = match fetched {
            Ok(Ok(telemetry)) => telemetry,
            Ok(Err(e)) => {
                warn!(service = alert.service, "context fetch failed: {e}");
                return GatheredContext {
                    degraded: true,
                    ..GatheredContext::default()
                };
            }
            Err(_) => {
                warn!(
                    service = alert.service,
                    timeout_ms = self.fetch_timeout.as_millis(),
                    "context fetch timed out"
                );
                return GatheredContext {
                    degraded: true,
                    ..GatheredContext::default()
                };
            }
        };

        // Lines named by the alert lead the window so the analyzer sees
        // them even after truncation.
        let mut logs: Vec<LogEntry> = Vec::new();
        for log_id in &alert.context.recent_log_ids {
            if let Some(entry) = telemetry.logs.iter().find(|l| &l.id == log_id) {
                logs.push(entry.clone());
            }
        }
        for entry in &telemetry.logs {
            if logs.len() >= self.max_log_lines {
                break;
            }
            if !logs.iter().any(|l| l.id == entry.id) {
                logs.push(entry.clone());
            }
        }

        debug!(
            service = alert.service,
            logs = logs.len(),
            metrics = telemetry.metrics.len(),
            "gathered alert context"
        );

        GatheredContext {
            logs,
            metric_history: telemetry.metrics,
            degraded: false,
        }
    }
}

/// In-memory telemetry source seeded per service. Used by tests and the
/// demo composition root; production wires a real backend behind the same
/// trait.
#[derive(Default)]
pub struct StaticTelemetrySource {
    data: RwLock<HashMap<String, Telemetry>>,
}

impl StaticTelemetrySource {
    /// Create an empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed telemetry for a service.
    pub fn seed(&self, service: &str, telemetry: Telemetry) {
        if let Ok(mut data) = self.data.write() {
            data.insert(service.to_string(), telemetry);
        }
    }
}

#[async_trait]
impl TelemetrySource for StaticTelemetrySource {
    async fn fetch(&self, service: &str, _range: TimeRange) -> Result<Telemetry> {
        let data = self
            .data
            .read()
            .map_err(|_| TriageError::ExternalUnavailable("telemetry store poisoned".into()))?;
        Ok(data.get(service).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::{AlertContext, Severity};
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use uuid::Uuid;

    fn alert(service: &str, log_ids: Vec<String>) -> AlertEvent {
        AlertEvent {
            id: Uuid::new_v4(),
            service: service.to_string(),
            severity: Severity::Warning,
            alert_type: "latency_spike".to_string(),
            detector: "threshold".to_string(),
            timestamp: Utc::now(),
            metric_snapshot: BTreeMap::new(),
            context: AlertContext {
                recent_log_ids: log_ids,
                region: None,
            },
        }
    }

    fn entry(id: &str, line: &str) -> LogEntry {
        LogEntry {
            id: id.to_string(),
            timestamp: Utc::now(),
            line: line.to_string(),
        }
    }

    struct FailingSource;

    #[async_trait]
    impl TelemetrySource for FailingSource {
        async fn fetch(&self, _service: &str, _range: TimeRange) -> Result<Telemetry> {
            Err(TriageError::ExternalUnavailable("backend down".into()))
        }
    }

    struct SlowSource;

    #[async_trait]
    impl TelemetrySource for SlowSource {
        async fn fetch(&self, _service: &str, _range: TimeRange) -> Result<Telemetry> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Telemetry::default())
        }
    }

    #[tokio::test]
    async fn test_referenced_logs_lead_window() {
        let source = Arc::new(StaticTelemetrySource::new());
        source.seed(
            "auth-service",
            Telemetry {
                logs: vec![
                    entry("log-001", "connection pool exhausted"),
                    entry("log-002", "timeout contacting upstream"),
                    entry("log-003", "request ok"),
                ],
                metrics: HashMap::new(),
            },
        );
        let gatherer = ContextGatherer::new(
            source,
            Duration::from_secs(1),
            Duration::from_secs(600),
        );

        let context = gatherer
            .gather(&alert("auth-service", vec!["log-002".to_string()]))
            .await;
        assert!(!context.degraded);
        assert_eq!(context.logs[0].id, "log-002");
        assert_eq!(context.logs.len(), 3);
    }

    #[tokio::test]
    async fn test_source_error_degrades() {
        let gatherer = ContextGatherer::new(
            Arc::new(FailingSource),
            Duration::from_secs(1),
            Duration::from_secs(600),
        );
        let context = gatherer.gather(&alert("auth-service", vec![])).await;
        assert!(context.degraded);
        assert!(context.logs.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_degrades() {
        let gatherer = ContextGatherer::new(
            Arc::new(SlowSource),
            Duration::from_millis(100),
            Duration::from_secs(600),
        );
        let context = gatherer.gather(&alert("auth-service", vec![])).await;
        assert!(context.degraded);
    }
}

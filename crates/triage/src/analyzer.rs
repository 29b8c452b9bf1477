//! Log analysis through an injected text-reasoning capability.
//!
//! The capability is a black box (prompt in, text out) with a bounded
//! timeout. On timeout or capability error the stage result is null and
//! the status is failed; the pipeline continues regardless.

use async_trait::async_trait;
use regex::Regex;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tokio::time::timeout;
use tracing::warn;

use crate::alert::AlertEvent;
use crate::error::{Result, TriageError};
use crate::gather::LogEntry;
use crate::state::{LogAnalysis, StageStatus};

/// Port to the text-reasoning capability.
#[async_trait]
pub trait ReasoningCapability: Send + Sync {
    /// Produce a completion for a prompt. Bounded latency, may fail.
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Log analysis stage.
pub struct LogAnalyzer {
    capability: Arc<dyn ReasoningCapability>,
    call_timeout: Duration,
    max_prompt_log_chars: usize,
}

impl LogAnalyzer {
    /// Create an analyzer over a reasoning capability.
    #[must_use]
    pub fn new(capability: Arc<dyn ReasoningCapability>, call_timeout: Duration) -> Self {
        Self {
            capability,
            call_timeout,
            max_prompt_log_chars: 8000,
        }
    }

    /// Produce a root-cause hypothesis from the gathered logs.
    pub async fn analyze(&self, logs: &[LogEntry], alert: &AlertEvent) -> LogAnalysis {
        let prompt = self.build_prompt(logs, alert);

        match timeout(self.call_timeout, self.capability.complete(&prompt)).await {
            Ok(Ok(hypothesis)) if !hypothesis.trim().is_empty() => LogAnalysis {
                hypothesis: Some(hypothesis.trim().to_string()),
                status: StageStatus::Succeeded,
            },
            Ok(Ok(_)) => {
                warn!(service = alert.service, "reasoning returned empty hypothesis");
                LogAnalysis {
                    hypothesis: None,
                    status: StageStatus::Failed,
                }
            }
            Ok(Err(e)) => {
                warn!(service = alert.service, "log analysis failed: {e}");
                LogAnalysis {
                    hypothesis: None,
                    status: StageStatus::Failed,
                }
            }
            Err(_) => {
                warn!(
                    service = alert.service,
                    timeout_ms = self.call_timeout.as_millis(),
                    "log analysis timed out"
                );
                LogAnalysis {
                    hypothesis: None,
                    status: StageStatus::Failed,
                }
            }
        }
    }

    /// Build the analysis prompt.
    #[allow(clippy::format_push_string)]
    fn build_prompt(&self, logs: &[LogEntry], alert: &AlertEvent) -> String {
        let mut prompt = String::new();

        prompt.push_str(&format!(
            "# Alert Triage: {} ({})\n\n",
            alert.alert_type, alert.service
        ));
        prompt.push_str("You are an SRE analyzing logs for an infrastructure alert.\n\n");

        prompt.push_str("## Alert Details\n\n");
        prompt.push_str(&format!("- **Service**: {}\n", alert.service));
        prompt.push_str(&format!("- **Severity**: {}\n", alert.severity));
        prompt.push_str(&format!("- **Type**: {}\n", alert.alert_type));
        prompt.push_str(&format!("- **Detector**: {}\n", alert.detector));
        prompt.push_str(&format!("- **Fired at**: {}\n", alert.timestamp));
        if let Some(region) = &alert.context.region {
            prompt.push_str(&format!("- **Region**: {region}\n"));
        }

        prompt.push_str("\n## Recent Logs\n\n```\n");
        if logs.is_empty() {
            prompt.push_str("No logs available\n");
        } else {
            let mut written = 0usize;
            for entry in logs {
                let line = format!(
                    "[{}] {}\n",
                    entry.timestamp.format("%H:%M:%S%.3f"),
                    entry.line
                );
                if written + line.len() > self.max_prompt_log_chars {
                    prompt.push_str("... (truncated)\n");
                    break;
                }
                written += line.len();
                prompt.push_str(&line);
            }
        }
        prompt.push_str("```\n\n");

        prompt.push_str("## Your Task\n\n");
        prompt.push_str("State the most likely root cause in one or two sentences.\n");
        prompt.push_str("Focus on error patterns, not symptoms.\n");

        prompt
    }
}

/// Regex patterns for the heuristic fallback reasoner.
static OOM_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"(?i)out\s+of\s+memory").unwrap(),
        Regex::new(r"(?i)OOMKilled").unwrap(),
        Regex::new(r"(?i)allocation\s+failed").unwrap(),
    ]
});

static CONNECTIVITY_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"(?i)connection\s+(refused|reset|timed?\s*out)").unwrap(),
        Regex::new(r"(?i)no\s+route\s+to\s+host").unwrap(),
        Regex::new(r"(?i)dns\s+(error|failure|lookup)").unwrap(),
    ]
});

static SATURATION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"(?i)pool\s+exhausted").unwrap(),
        Regex::new(r"(?i)too\s+many\s+(open\s+files|connections|requests)").unwrap(),
        Regex::new(r"(?i)queue\s+full").unwrap(),
        Regex::new(r"(?i)429|rate.?limit").unwrap(),
    ]
});

static CRASH_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"(?i)panic|segfault|segmentation\s+fault").unwrap(),
        Regex::new(r"(?i)fatal\s+error").unwrap(),
        Regex::new(r"(?i)stack\s*trace").unwrap(),
    ]
});

/// Deterministic pattern-matching reasoner.
///
/// Stands in for an LLM in tests and offline demos; implements the same
/// port so swapping in a real capability touches only the composition
/// root.
#[derive(Debug, Default)]
pub struct HeuristicReasoner;

impl HeuristicReasoner {
    /// Create a heuristic reasoner.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ReasoningCapability for HeuristicReasoner {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let mut findings = Vec::new();

        if OOM_PATTERNS.iter().any(|p| p.is_match(prompt)) {
            findings.push("memory exhaustion in the service process");
        }
        if SATURATION_PATTERNS.iter().any(|p| p.is_match(prompt)) {
            findings.push("resource saturation (connection/request limits reached)");
        }
        if CONNECTIVITY_PATTERNS.iter().any(|p| p.is_match(prompt)) {
            findings.push("upstream connectivity failures");
        }
        if CRASH_PATTERNS.iter().any(|p| p.is_match(prompt)) {
            findings.push("process crashes in the log window");
        }

        if findings.is_empty() {
            return Err(TriageError::ExternalUnavailable(
                "no recognizable failure pattern in logs".into(),
            ));
        }

        Ok(format!(
            "Logs indicate {}; the alert is most likely a downstream symptom of this.",
            findings.join(" and ")
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::{AlertContext, Severity};
    use chrono::Utc;
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn alert() -> AlertEvent {
        AlertEvent {
            id: Uuid::new_v4(),
            service: "auth-service".to_string(),
            severity: Severity::Critical,
            alert_type: "latency_spike".to_string(),
            detector: "threshold".to_string(),
            timestamp: Utc::now(),
            metric_snapshot: BTreeMap::new(),
            context: AlertContext::default(),
        }
    }

    fn log(line: &str) -> LogEntry {
        LogEntry {
            id: "log-001".to_string(),
            timestamp: Utc::now(),
            line: line.to_string(),
        }
    }

    mockall::mock! {
        Reasoner {}

        #[async_trait]
        impl ReasoningCapability for Reasoner {
            async fn complete(&self, prompt: &str) -> Result<String>;
        }
    }

    struct SlowCapability;

    #[async_trait]
    impl ReasoningCapability for SlowCapability {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok("too late".to_string())
        }
    }

    #[tokio::test]
    async fn test_heuristic_hypothesis() {
        let analyzer = LogAnalyzer::new(
            Arc::new(HeuristicReasoner::new()),
            Duration::from_secs(1),
        );
        let logs = vec![log("ERROR connection refused to db-primary:5432")];
        let analysis = analyzer.analyze(&logs, &alert()).await;

        assert_eq!(analysis.status, StageStatus::Succeeded);
        assert!(analysis.hypothesis.unwrap().contains("connectivity"));
    }

    #[tokio::test]
    async fn test_unrecognized_logs_fail_stage() {
        let analyzer = LogAnalyzer::new(
            Arc::new(HeuristicReasoner::new()),
            Duration::from_secs(1),
        );
        let logs = vec![log("request served in 12ms")];
        let analysis = analyzer.analyze(&logs, &alert()).await;

        assert_eq!(analysis.status, StageStatus::Failed);
        assert!(analysis.hypothesis.is_none());
    }

    #[tokio::test]
    async fn test_capability_error_fails_stage() {
        let mut capability = MockReasoner::new();
        capability
            .expect_complete()
            .returning(|_| Err(TriageError::ExternalUnavailable("model offline".into())));
        let analyzer = LogAnalyzer::new(Arc::new(capability), Duration::from_secs(1));

        let analysis = analyzer.analyze(&[log("pool exhausted")], &alert()).await;
        assert_eq!(analysis.status, StageStatus::Failed);
        assert!(analysis.hypothesis.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_fails_stage() {
        let analyzer = LogAnalyzer::new(Arc::new(SlowCapability), Duration::from_millis(50));
        let analysis = analyzer.analyze(&[], &alert()).await;

        assert_eq!(analysis.status, StageStatus::Failed);
        assert!(analysis.hypothesis.is_none());
    }

    #[test]
    fn test_prompt_contains_alert_fields() {
        let analyzer = LogAnalyzer::new(
            Arc::new(HeuristicReasoner::new()),
            Duration::from_secs(1),
        );
        let prompt = analyzer.build_prompt(&[log("pool exhausted")], &alert());
        assert!(prompt.contains("auth-service"));
        assert!(prompt.contains("latency_spike"));
        assert!(prompt.contains("pool exhausted"));
    }
}

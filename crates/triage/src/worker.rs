//! Ingestion front door and the worker loops that drain the queue.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::alert::AlertEvent;
use crate::error::{Result, TriageError};
use crate::pipeline::TriagePipeline;
use crate::queue::AlertQueue;
use crate::state::{TriageResult, TriageState};
use crate::store::TriageStore;

/// Validates and admits alerts into the triage queue.
///
/// A placeholder record is created before enqueueing so the triage is
/// queryable while it waits for a worker. If the queue rejects the event
/// the placeholder is unwound, leaving no trace of the failed submission.
pub struct Ingestor {
    queue: Arc<dyn AlertQueue>,
    store: Arc<dyn TriageStore>,
}

impl Ingestor {
    /// Create an ingestor over a queue and store.
    #[must_use]
    pub fn new(queue: Arc<dyn AlertQueue>, store: Arc<dyn TriageStore>) -> Self {
        Self { queue, store }
    }

    /// Admit one alert.
    ///
    /// # Errors
    /// `Validation` for malformed alerts or a duplicate alert id,
    /// `Backpressure` when the queue is at capacity.
    pub async fn submit(&self, alert: AlertEvent) -> Result<Uuid> {
        alert.validate()?;
        let id = alert.id;

        self.store.create(TriageResult::queued(alert.clone())).await?;
        if let Err(e) = self.queue.enqueue(alert).await {
            // Roll back the placeholder so a later retry can resubmit
            // under the same id.
            if let Err(cleanup) = self.store.remove(id).await {
                warn!(triage_id = %id, "failed to unwind queued record: {cleanup}");
            }
            return Err(e);
        }

        info!(triage_id = %id, "alert admitted for triage");
        Ok(id)
    }
}

/// One worker loop: dequeue, run the pipeline, persist the result.
pub struct TriageWorker {
    queue: Arc<dyn AlertQueue>,
    store: Arc<dyn TriageStore>,
    pipeline: Arc<TriagePipeline>,
    shutdown: CancellationToken,
}

impl TriageWorker {
    /// Create a worker bound to a shutdown token.
    #[must_use]
    pub fn new(
        queue: Arc<dyn AlertQueue>,
        store: Arc<dyn TriageStore>,
        pipeline: Arc<TriagePipeline>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            queue,
            store,
            pipeline,
            shutdown,
        }
    }

    /// Drain the queue until shutdown. An event already dequeued when the
    /// token fires still runs; the pipeline's own cancellation checks cut
    /// it short between stages.
    pub async fn run(self, worker_id: usize) {
        info!(worker_id, "triage worker started");
        loop {
            let alert = tokio::select! {
                () = self.shutdown.cancelled() => break,
                next = self.queue.dequeue() => match next {
                    Some(alert) => alert,
                    None => break,
                },
            };
            self.process(alert).await;
        }
        info!(worker_id, "triage worker stopped");
    }

    async fn process(&self, alert: AlertEvent) {
        let id = alert.id;
        debug!(triage_id = %id, service = alert.service, "worker picked up alert");

        let mut state = TriageState::new(alert);
        let result = self.pipeline.run(&mut state, &self.shutdown).await;
        self.persist(id, result).await;
    }

    /// Replace the placeholder with the finalized result, preserving any
    /// review fields a concurrent approve/reject managed to write.
    async fn persist(&self, id: Uuid, mut result: TriageResult) {
        for _ in 0..3 {
            let current = match self.store.get(id).await {
                Ok(current) => current,
                Err(TriageError::NotFound(_)) => {
                    // Placeholder was unwound; keep the result anyway so
                    // the outcome is not lost.
                    if let Err(e) = self.store.create(result.clone()).await {
                        error!(triage_id = %id, "failed to persist triage result: {e}");
                    }
                    return;
                }
                Err(e) => {
                    error!(triage_id = %id, "failed to load triage record: {e}");
                    return;
                }
            };

            result.human_decision = current.result.human_decision;
            result.reviewer = current.result.reviewer.clone();
            result.feedback = current.result.feedback.clone();

            match self.store.update(id, current.version, result.clone()).await {
                Ok(_) => return,
                Err(TriageError::ConcurrentModification(_)) => {
                    debug!(triage_id = %id, "result write lost a version race, retrying");
                }
                Err(e) => {
                    error!(triage_id = %id, "failed to persist triage result: {e}");
                    return;
                }
            }
        }
        error!(triage_id = %id, "gave up persisting triage result after version races");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::{AlertContext, MetricReading, Severity};
    use crate::analyzer::{HeuristicReasoner, LogAnalyzer};
    use crate::config::TriageConfig;
    use crate::detector::MetricAnomalyDetector;
    use crate::gather::{ContextGatherer, StaticTelemetrySource};
    use crate::observe::TracingSink;
    use crate::planner::RemediationPlanner;
    use crate::queue::InMemoryQueue;
    use crate::retriever::{IncidentRetriever, InMemoryIncidentIndex};
    use crate::state::TriageStatus;
    use crate::store::InMemoryStore;
    use crate::validator::SafetyValidator;
    use chrono::Utc;
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn test_pipeline() -> Arc<TriagePipeline> {
        let config = TriageConfig::default();
        Arc::new(TriagePipeline::new(
            ContextGatherer::new(
                Arc::new(StaticTelemetrySource::new()),
                Duration::from_secs(1),
                Duration::from_secs(600),
            ),
            LogAnalyzer::new(Arc::new(HeuristicReasoner::new()), Duration::from_secs(1)),
            MetricAnomalyDetector::new(config.detector).unwrap(),
            IncidentRetriever::new(
                Arc::new(InMemoryIncidentIndex::with_seed_corpus()),
                config.incident_top_k,
                Duration::from_secs(1),
            ),
            RemediationPlanner::new(config.planner),
            SafetyValidator::new(config.safety),
            Arc::new(TracingSink),
        ))
    }

    fn sample_alert() -> AlertEvent {
        let mut snapshot = BTreeMap::new();
        snapshot.insert(
            "error_rate".to_string(),
            MetricReading {
                current: 0.35,
                baseline: Some(0.02),
            },
        );
        AlertEvent {
            id: Uuid::new_v4(),
            service: "checkout".to_string(),
            severity: Severity::Warning,
            alert_type: "error_rate_spike".to_string(),
            detector: "threshold".to_string(),
            timestamp: Utc::now(),
            metric_snapshot: snapshot,
            context: AlertContext::default(),
        }
    }

    #[tokio::test]
    async fn test_submit_creates_queryable_record() {
        let queue = Arc::new(InMemoryQueue::new(8));
        let store = Arc::new(InMemoryStore::new());
        let ingestor = Ingestor::new(queue, Arc::clone(&store) as Arc<dyn TriageStore>);

        let id = ingestor.submit(sample_alert()).await.unwrap();
        let record = store.get(id).await.unwrap().result;
        assert_eq!(record.status, TriageStatus::Pending);
    }

    #[tokio::test]
    async fn test_duplicate_submission_rejected() {
        let queue = Arc::new(InMemoryQueue::new(8));
        let store = Arc::new(InMemoryStore::new());
        let ingestor = Ingestor::new(queue, store);

        let alert = sample_alert();
        ingestor.submit(alert.clone()).await.unwrap();
        assert!(matches!(
            ingestor.submit(alert).await,
            Err(TriageError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_backpressure_unwinds_placeholder() {
        let queue = Arc::new(InMemoryQueue::new(1));
        let store = Arc::new(InMemoryStore::new());
        let ingestor = Ingestor::new(queue, Arc::clone(&store) as Arc<dyn TriageStore>);

        ingestor.submit(sample_alert()).await.unwrap();
        let rejected = sample_alert();
        let id = rejected.id;
        assert!(matches!(
            ingestor.submit(rejected).await,
            Err(TriageError::Backpressure { .. })
        ));
        // The rejected submission left no record behind.
        assert!(matches!(
            store.get(id).await,
            Err(TriageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_worker_processes_submitted_alert() {
        let queue: Arc<dyn AlertQueue> = Arc::new(InMemoryQueue::new(8));
        let store: Arc<dyn TriageStore> = Arc::new(InMemoryStore::new());
        let ingestor = Ingestor::new(Arc::clone(&queue), Arc::clone(&store));
        let shutdown = CancellationToken::new();

        let worker = TriageWorker::new(
            Arc::clone(&queue),
            Arc::clone(&store),
            test_pipeline(),
            shutdown.clone(),
        );
        let handle = tokio::spawn(worker.run(0));

        let id = ingestor.submit(sample_alert()).await.unwrap();

        // Poll until the worker replaces the placeholder.
        let mut status = TriageStatus::Pending;
        for _ in 0..50 {
            status = store.get(id).await.unwrap().result.status;
            if status != TriageStatus::Pending {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(status, TriageStatus::Completed);

        shutdown.cancel();
        handle.await.unwrap();
    }
}

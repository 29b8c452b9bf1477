//! Historical incident retrieval by embedding similarity.
//!
//! Alerts and incidents are embedded into a fixed-dimension vector by
//! feature-hashing their descriptive tokens; retrieval ranks the corpus
//! by cosine similarity. The search backend sits behind a port so a real
//! vector database can replace the in-memory index without touching the
//! pipeline.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::alert::AlertEvent;
use crate::error::{Result, TriageError};
use crate::state::IncidentMatch;

/// Embedding dimension for the feature-hashed vectors.
pub const EMBEDDING_DIM: usize = 64;

/// A past incident in the reference corpus. Read-only to this core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentRecord {
    /// Incident identifier
    pub id: String,
    /// Service the incident occurred in
    pub service: String,
    /// Alert type of the incident
    pub alert_type: String,
    /// Free-text resolution description
    pub resolution: String,
    /// Embedding vector
    pub embedding: Vec<f32>,
}

impl IncidentRecord {
    /// Build a record, embedding it from its descriptive fields.
    #[must_use]
    pub fn new(id: &str, service: &str, alert_type: &str, resolution: &str) -> Self {
        let embedding = embed(&[service, alert_type, resolution]);
        Self {
            id: id.to_string(),
            service: service.to_string(),
            alert_type: alert_type.to_string(),
            resolution: resolution.to_string(),
            embedding,
        }
    }
}

/// Feature-hash whitespace tokens of the given fields into a unit vector.
#[must_use]
pub fn embed(fields: &[&str]) -> Vec<f32> {
    let mut vector = vec![0.0f32; EMBEDDING_DIM];
    for field in fields {
        for token in field.split(|c: char| !c.is_alphanumeric()) {
            if token.is_empty() {
                continue;
            }
            // FNV-1a over the lowercased token
            let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
            for byte in token.to_lowercase().bytes() {
                hash ^= u64::from(byte);
                hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
            }
            let bucket = (hash % EMBEDDING_DIM as u64) as usize;
            // Sign bit from the hash keeps buckets from only accumulating.
            let sign = if hash & (1 << 63) == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }
    }
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in &mut vector {
            *v /= norm;
        }
    }
    vector
}

/// Embed an alert for corpus lookup.
#[must_use]
pub fn embed_alert(alert: &AlertEvent) -> Vec<f32> {
    let region = alert.context.region.as_deref().unwrap_or_default();
    embed(&[&alert.service, &alert.alert_type, region])
}

fn cosine(a: &[f32], b: &[f32]) -> f64 {
    // Both sides are unit vectors, so the dot product is the cosine.
    f64::from(a.iter().zip(b).map(|(x, y)| x * y).sum::<f32>())
}

/// Port to the similarity search backend.
#[async_trait]
pub trait SimilaritySearch: Send + Sync {
    /// Rank the corpus against a query embedding, best first, at most `k`.
    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<IncidentMatch>>;
}

/// In-memory incident index with exact cosine ranking.
#[derive(Default)]
pub struct InMemoryIncidentIndex {
    corpus: RwLock<Vec<IncidentRecord>>,
}

impl InMemoryIncidentIndex {
    /// Create an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an index seeded with a small reference corpus.
    #[must_use]
    pub fn with_seed_corpus() -> Self {
        let index = Self::new();
        for record in [
            IncidentRecord::new(
                "INC-2025-1234",
                "auth-service",
                "latency_spike",
                "Scaled up replicas from 3 to 5",
            ),
            IncidentRecord::new(
                "INC-2025-1100",
                "api-gateway",
                "latency_spike",
                "Applied rate limiting to upstream",
            ),
            IncidentRecord::new(
                "INC-2025-0971",
                "payment-service",
                "error_rate_spike",
                "Restarted pods after connection pool leak",
            ),
            IncidentRecord::new(
                "INC-2025-0804",
                "checkout-service",
                "memory_anomaly",
                "Scaled horizontally and reduced batch size",
            ),
            IncidentRecord::new(
                "INC-2024-2310",
                "auth-service",
                "error_rate_spike",
                "Restarted instances with stale DNS cache",
            ),
        ] {
            index.insert(record);
        }
        index
    }

    /// Add a record to the corpus.
    pub fn insert(&self, record: IncidentRecord) {
        if let Ok(mut corpus) = self.corpus.write() {
            corpus.push(record);
        }
    }
}

#[async_trait]
impl SimilaritySearch for InMemoryIncidentIndex {
    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<IncidentMatch>> {
        let corpus = self
            .corpus
            .read()
            .map_err(|_| TriageError::ExternalUnavailable("incident index poisoned".into()))?;

        let mut matches: Vec<IncidentMatch> = corpus
            .iter()
            .map(|record| IncidentMatch {
                id: record.id.clone(),
                service: record.service.clone(),
                alert_type: record.alert_type.clone(),
                resolution: record.resolution.clone(),
                similarity: cosine(query, &record.embedding).clamp(0.0, 1.0),
            })
            .collect();

        matches.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(k);
        Ok(matches)
    }
}

/// Incident retrieval stage.
pub struct IncidentRetriever {
    search: Arc<dyn SimilaritySearch>,
    top_k: usize,
    call_timeout: Duration,
}

impl IncidentRetriever {
    /// Create a retriever over a search backend.
    #[must_use]
    pub fn new(search: Arc<dyn SimilaritySearch>, top_k: usize, call_timeout: Duration) -> Self {
        Self {
            search,
            top_k,
            call_timeout,
        }
    }

    /// Retrieve similar past incidents, similarity descending.
    ///
    /// An empty result is valid; a backend timeout or error also degrades
    /// to empty rather than failing the pipeline.
    pub async fn retrieve(&self, alert: &AlertEvent) -> Vec<IncidentMatch> {
        let query = embed_alert(alert);

        match timeout(self.call_timeout, self.search.search(&query, self.top_k)).await {
            Ok(Ok(matches)) => {
                debug!(
                    service = alert.service,
                    matches = matches.len(),
                    "incident retrieval complete"
                );
                matches
            }
            Ok(Err(e)) => {
                warn!(service = alert.service, "incident retrieval failed: {e}");
                Vec::new()
            }
            Err(_) => {
                warn!(
                    service = alert.service,
                    timeout_ms = self.call_timeout.as_millis(),
                    "incident retrieval timed out"
                );
                Vec::new()
            }
        }
    }
}

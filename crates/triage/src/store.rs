//! Triage result persistence and the human-review state machine.
//!
//! Two implementations behind one trait: an in-memory map and a
//! file-backed store. Writes to a single record use per-id optimistic
//! versioning; the losing side of a race gets `ConcurrentModification`
//! instead of silently overwriting. Approve/reject are provided on the
//! trait itself so review semantics are identical for every backend.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{Result, TriageError};
use crate::state::{HumanDecision, TriageResult};

/// A stored record with its optimistic-concurrency version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Versioned {
    /// Monotonic per-record version, bumped on every write
    pub version: u64,
    /// The stored projection
    pub result: TriageResult,
}

/// Persistence port for triage results.
#[async_trait]
pub trait TriageStore: Send + Sync {
    /// Insert a new record.
    ///
    /// Fails with `Validation` when the id already exists — a second
    /// submission with the same correlation id is rejected, not merged.
    async fn create(&self, result: TriageResult) -> Result<()>;

    /// Fetch a record with its version.
    async fn get(&self, id: Uuid) -> Result<Versioned>;

    /// All records. Order unspecified.
    async fn list(&self) -> Result<Vec<TriageResult>>;

    /// Versioned upsert: replaces the record only when `expected_version`
    /// still matches, returning the new version.
    async fn update(&self, id: Uuid, expected_version: u64, result: TriageResult) -> Result<u64>;

    /// Remove a record (used to unwind ingestion on backpressure).
    async fn remove(&self, id: Uuid) -> Result<()>;

    /// Approve a triage awaiting review.
    ///
    /// # Errors
    /// `NotFound` for unknown ids, `InvalidState` when the record is not
    /// awaiting review, `ConcurrentModification` when a concurrent write
    /// wins the version race.
    async fn approve(&self, id: Uuid, actor: &str) -> Result<TriageResult> {
        let Versioned {
            version,
            mut result,
        } = self.get(id).await?;
        result.apply_human_decision(HumanDecision::Approved, actor, None)?;
        self.update(id, version, result.clone()).await?;
        info!(triage_id = %id, actor, "triage approved");
        Ok(result)
    }

    /// Reject a triage awaiting review. Feedback is required non-empty.
    ///
    /// # Errors
    /// As [`TriageStore::approve`], plus `Validation` for empty feedback.
    async fn reject(&self, id: Uuid, actor: &str, feedback: &str) -> Result<TriageResult> {
        if feedback.trim().is_empty() {
            return Err(TriageError::Validation(
                "reject requires non-empty feedback".into(),
            ));
        }
        let Versioned {
            version,
            mut result,
        } = self.get(id).await?;
        result.apply_human_decision(
            HumanDecision::Rejected,
            actor,
            Some(feedback.trim().to_string()),
        )?;
        self.update(id, version, result.clone()).await?;
        info!(triage_id = %id, actor, "triage rejected");
        Ok(result)
    }
}

/// In-memory store.
#[derive(Default)]
pub struct InMemoryStore {
    records: RwLock<HashMap<Uuid, Versioned>>,
}

impl InMemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TriageStore for InMemoryStore {
    async fn create(&self, result: TriageResult) -> Result<()> {
        let mut records = self.records.write().await;
        if records.contains_key(&result.id) {
            return Err(TriageError::Validation(format!(
                "triage {} already exists",
                result.id
            )));
        }
        records.insert(result.id, Versioned { version: 1, result });
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Versioned> {
        let records = self.records.read().await;
        records.get(&id).cloned().ok_or(TriageError::NotFound(id))
    }

    async fn list(&self) -> Result<Vec<TriageResult>> {
        let records = self.records.read().await;
        Ok(records.values().map(|v| v.result.clone()).collect())
    }

    async fn update(&self, id: Uuid, expected_version: u64, result: TriageResult) -> Result<u64> {
        let mut records = self.records.write().await;
        let entry = records.get_mut(&id).ok_or(TriageError::NotFound(id))?;
        if entry.version != expected_version {
            return Err(TriageError::ConcurrentModification(id));
        }
        entry.version += 1;
        entry.result = result;
        Ok(entry.version)
    }

    async fn remove(&self, id: Uuid) -> Result<()> {
        let mut records = self.records.write().await;
        records.remove(&id).ok_or(TriageError::NotFound(id))?;
        Ok(())
    }
}

/// File-backed store: the whole record map as one JSON document,
/// rewritten on every mutation.
pub struct FileStore {
    results_file: PathBuf,
    records: RwLock<HashMap<Uuid, Versioned>>,
}

impl FileStore {
    /// Open (or create) a store under `dir`.
    ///
    /// # Errors
    /// Returns an error if the backing file exists but cannot be read or
    /// parsed.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).await?;
        let results_file = dir.join("results.json");

        let records = match fs::read_to_string(&results_file).await {
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };

        debug!(
            records = records.len(),
            path = %results_file.display(),
            "opened file-backed store"
        );

        Ok(Self {
            results_file,
            records: RwLock::new(records),
        })
    }

    async fn flush(&self, records: &HashMap<Uuid, Versioned>) -> Result<()> {
        let content = serde_json::to_string_pretty(records)?;
        fs::write(&self.results_file, content).await?;
        Ok(())
    }
}

#[async_trait]
impl TriageStore for FileStore {
    async fn create(&self, result: TriageResult) -> Result<()> {
        let mut records = self.records.write().await;
        if records.contains_key(&result.id) {
            return Err(TriageError::Validation(format!(
                "triage {} already exists",
                result.id
            )));
        }
        records.insert(result.id, Versioned { version: 1, result });
        self.flush(&records).await
    }

    async fn get(&self, id: Uuid) -> Result<Versioned> {
        let records = self.records.read().await;
        records.get(&id).cloned().ok_or(TriageError::NotFound(id))
    }

    async fn list(&self) -> Result<Vec<TriageResult>> {
        let records = self.records.read().await;
        Ok(records.values().map(|v| v.result.clone()).collect())
    }

    async fn update(&self, id: Uuid, expected_version: u64, result: TriageResult) -> Result<u64> {
        let mut records = self.records.write().await;
        let entry = records.get_mut(&id).ok_or(TriageError::NotFound(id))?;
        if entry.version != expected_version {
            return Err(TriageError::ConcurrentModification(id));
        }
        entry.version += 1;
        entry.result = result;
        let version = entry.version;
        self.flush(&records).await?;
        Ok(version)
    }

    async fn remove(&self, id: Uuid) -> Result<()> {
        let mut records = self.records.write().await;
        records.remove(&id).ok_or(TriageError::NotFound(id))?;
        self.flush(&records).await
    }
}

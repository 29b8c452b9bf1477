//! Alert ingestion queue.
//!
//! Decouples the submission API from the worker loops. Two implementations
//! behind one trait: a bounded in-memory channel, and a file-backed queue
//! that survives restarts. The pipeline is identical regardless of which
//! one the composition root wires in.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, Mutex, Notify};
use tracing::{debug, warn};

use crate::alert::AlertEvent;
use crate::error::{Result, TriageError};

/// Ingestion queue contract.
///
/// `enqueue` buffers and returns immediately; when the queue is full it
/// fails with `Backpressure` instead of growing unboundedly. `dequeue`
/// blocks the calling worker until an event is available and returns
/// events in FIFO order relative to enqueue calls observed by this
/// instance. No ordering guarantee exists across instances.
#[async_trait]
pub trait AlertQueue: Send + Sync {
    /// Buffer an event for processing.
    async fn enqueue(&self, event: AlertEvent) -> Result<()>;

    /// Wait for the next event. Returns `None` once the queue is closed
    /// and drained.
    async fn dequeue(&self) -> Option<AlertEvent>;
}

/// Bounded in-memory queue backed by a tokio channel.
pub struct InMemoryQueue {
    tx: mpsc::Sender<AlertEvent>,
    rx: Mutex<mpsc::Receiver<AlertEvent>>,
    capacity: usize,
}

impl InMemoryQueue {
    /// Create a queue with the given capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            tx,
            rx: Mutex::new(rx),
            capacity,
        }
    }
}

#[async_trait]
impl AlertQueue for InMemoryQueue {
    async fn enqueue(&self, event: AlertEvent) -> Result<()> {
        match self.tx.try_send(event) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!(
                    alert_id = %event.id,
                    capacity = self.capacity,
                    "ingestion queue full, rejecting submission"
                );
                Err(TriageError::Backpressure {
                    capacity: self.capacity,
                })
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(TriageError::Validation(
                "ingestion queue is shut down".into(),
            )),
        }
    }

    async fn dequeue(&self) -> Option<AlertEvent> {
        let mut rx = self.rx.lock().await;
        rx.recv().await
    }
}

/// File-backed queue: appends events to a JSONL file and tracks the
/// consumer offset in a sidecar file, so a restart resumes where the
/// workers left off.
pub struct FileQueue {
    inner: Mutex<FileQueueInner>,
    notify: Notify,
    capacity: usize,
}

struct FileQueueInner {
    events_file: PathBuf,
    offset_file: PathBuf,
    /// Events appended but not yet consumed
    pending: VecDeque<AlertEvent>,
    /// Count of lines already consumed from the events file
    offset: u64,
}

impl FileQueue {
    /// Open (or create) a queue under `dir`.
    ///
    /// # Errors
    /// Returns an error if the backing files cannot be read.
    pub async fn open(dir: impl AsRef<Path>, capacity: usize) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).await?;
        let events_file = dir.join("queue.jsonl");
        let offset_file = dir.join("queue.offset");

        let offset = match fs::read_to_string(&offset_file).await {
            Ok(content) => content.trim().parse::<u64>().unwrap_or(0),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(e) => return Err(e.into()),
        };

        let mut pending = VecDeque::new();
        match fs::read_to_string(&events_file).await {
            Ok(content) => {
                for line in content.lines().skip(offset as usize) {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<AlertEvent>(line) {
                        Ok(event) => pending.push_back(event),
                        Err(e) => warn!("skipping corrupt queue entry: {e}"),
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        debug!(
            pending = pending.len(),
            offset, "opened file-backed queue"
        );

        Ok(Self {
            inner: Mutex::new(FileQueueInner {
                events_file,
                offset_file,
                pending,
                offset,
            }),
            notify: Notify::new(),
            capacity,
        })
    }
}

#[async_trait]
impl AlertQueue for FileQueue {
    async fn enqueue(&self, event: AlertEvent) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.pending.len() >= self.capacity {
            return Err(TriageError::Backpressure {
                capacity: self.capacity,
            });
        }

        let mut line = serde_json::to_string(&event)?;
        line.push('\n');
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&inner.events_file)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        inner.pending.push_back(event);
        drop(inner);
        self.notify.notify_one();
        Ok(())
    }

    async fn dequeue(&self) -> Option<AlertEvent> {
        loop {
            let notified = self.notify.notified();
            {
                let mut inner = self.inner.lock().await;
                if let Some(event) = inner.pending.pop_front() {
                    inner.offset += 1;
                    let offset = inner.offset.to_string();
                    if let Err(e) = fs::write(&inner.offset_file, offset).await {
                        warn!("failed to persist queue offset: {e}");
                    }
                    return Some(event);
                }
            }
            notified.await;
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

    fn alert(service: &str) -> AlertEvent {
        AlertEvent {
            id: Uuid::new_v4(),
            service: service.to_string(),
            severity: Severity::Warning,
            alert_type: "latency_spike".to_string(),
            detector: "threshold".to_string(),
            timestamp: Utc::now(),
            metric_snapshot: BTreeMap::new(),
            context: AlertContext::default(),
        }
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = InMemoryQueue::new(16);
        queue.enqueue(alert("a")).await.unwrap();
        queue.enqueue(alert("b")).await.unwrap();
        queue.enqueue(alert("c")).await.unwrap();

        assert_eq!(queue.dequeue().await.unwrap().service, "a");
        assert_eq!(queue.dequeue().await.unwrap().service, "b");
        assert_eq!(queue.dequeue().await.unwrap().service, "c");
    }

    #[tokio::test]
    async fn test_backpressure_when_full() {
        let queue = InMemoryQueue::new(2);
        queue.enqueue(alert("a")).await.unwrap();
        queue.enqueue(alert("b")).await.unwrap();

        let err = queue.enqueue(alert("c")).await.unwrap_err();
        assert!(matches!(err, TriageError::Backpressure { capacity: 2 }));

        // Buffered events are neither dropped nor reordered.
        assert_eq!(queue.dequeue().await.unwrap().service, "a");
        assert_eq!(queue.dequeue().await.unwrap().service, "b");
    }

    #[tokio::test]
    async fn test_file_queue_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let queue = FileQueue::open(dir.path(), 16).await.unwrap();
            queue.enqueue(alert("a")).await.unwrap();
            queue.enqueue(alert("b")).await.unwrap();
            assert_eq!(queue.dequeue().await.unwrap().service, "a");
        }
        // Reopen: "a" was consumed, "b" is still pending.
        let queue = FileQueue::open(dir.path(), 16).await.unwrap();
        assert_eq!(queue.dequeue().await.unwrap().service, "b");
    }

    #[tokio::test]
    async fn test_file_queue_backpressure() {
        let dir = tempfile::tempdir().unwrap();
        let queue = FileQueue::open(dir.path(), 1).await.unwrap();
        queue.enqueue(alert("a")).await.unwrap();
        let err = queue.enqueue(alert("b")).await.unwrap_err();
        assert!(matches!(err, TriageError::Backpressure { .. }));
    }
}

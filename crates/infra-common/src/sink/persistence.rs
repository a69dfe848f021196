use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::errors::{Error, Result};
use crate::events::{bounded, EventReceiver, EventSender};

/// One record bound for a time-partitioned collection
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    /// Target collection, e.g. `sip_transaction_20240131`
    pub collection: String,
    /// Record body
    pub body: serde_json::Value,
}

impl Document {
    /// Build a document from any serializable record
    pub fn from_record<R: Serialize>(collection: String, record: &R) -> Result<Self> {
        let body = serde_json::to_value(record).map_err(|e| {
            Error::Internal(format!("failed to serialize record for {}: {}", collection, e))
        })?;
        Ok(Self { collection, body })
    }
}

/// Destination for terminal records
///
/// Implementations must not block: the caller is a correlation worker.
pub trait PersistenceSink: Send + Sync {
    /// Hand a document over for storage
    fn write(&self, document: Document);
}

/// Render `pattern` (chrono strftime syntax) for `time`
///
/// Returns `None` for patterns chrono cannot render.
pub fn render_time_suffix(pattern: &str, time: DateTime<Utc>) -> Option<String> {
    let mut rendered = String::new();
    write!(rendered, "{}", time.format(pattern)).ok()?;
    Some(rendered)
}

/// Collection name: fixed prefix plus a date suffix derived from `created_at`
pub fn collection_name(prefix: &str, created_at: DateTime<Utc>, time_suffix: &str) -> String {
    match render_time_suffix(time_suffix, created_at) {
        Some(suffix) => format!("{}_{}", prefix, suffix),
        None => prefix.to_string(),
    }
}

/// Storage backend behind [`QueuedPersistence`]
#[async_trait]
pub trait DocumentWriter: Send + Sync {
    /// Store a batch of documents
    async fn write_batch(&self, documents: Vec<Document>) -> Result<()>;
}

/// Backend that emits every document as a JSON log line
#[derive(Debug, Clone, Copy, Default)]
pub struct LogWriter;

#[async_trait]
impl DocumentWriter for LogWriter {
    async fn write_batch(&self, documents: Vec<Document>) -> Result<()> {
        for document in documents {
            tracing::info!(
                target: "voipmon::persistence",
                collection = %document.collection,
                body = %document.body,
                "record"
            );
        }
        Ok(())
    }
}

/// Persistence front-end that queues documents for a background writer
///
/// Overflow drops the oldest pending documents; writer failures are logged and the
/// batch is discarded.
#[derive(Debug, Clone)]
pub struct QueuedPersistence {
    sender: EventSender<Document>,
}

impl QueuedPersistence {
    /// Maximum documents handed to the writer at once
    pub const BATCH_SIZE: usize = 256;

    /// Start the writer task
    pub fn spawn(writer: Arc<dyn DocumentWriter>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = bounded("persistence", capacity);
        let handle = tokio::spawn(Self::run(writer, receiver));
        (Self { sender }, handle)
    }

    /// Documents discarded because the writer fell behind
    pub fn dropped(&self) -> u64 {
        self.sender.dropped()
    }

    async fn run(writer: Arc<dyn DocumentWriter>, mut receiver: EventReceiver<Document>) {
        while let Some(first) = receiver.recv().await {
            let mut batch = vec![first];
            while batch.len() < Self::BATCH_SIZE {
                match receiver.try_recv() {
                    Some(document) => batch.push(document),
                    None => break,
                }
            }

            let size = batch.len();
            if let Err(e) = writer.write_batch(batch).await {
                warn!("Failed to write {} documents: {}", size, e);
            }
        }
        debug!("Persistence writer stopped");
    }
}

impl PersistenceSink for QueuedPersistence {
    fn write(&self, document: Document) {
        self.sender.send(document);
    }
}

/// In-process sink keeping every document
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    documents: Mutex<Vec<Document>>,
}

impl MemoryPersistence {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything written so far
    pub fn documents(&self) -> Vec<Document> {
        self.documents.lock().clone()
    }

    /// Documents whose collection starts with `prefix`
    pub fn with_prefix(&self, prefix: &str) -> Vec<Document> {
        self.documents
            .lock()
            .iter()
            .filter(|d| d.collection.starts_with(prefix))
            .cloned()
            .collect()
    }

    /// Number of documents written
    pub fn len(&self) -> usize {
        self.documents.lock().len()
    }
}

impl PersistenceSink for MemoryPersistence {
    fn write(&self, document: Document) {
        self.documents.lock().push(document);
    }
}

impl<S: PersistenceSink + ?Sized> PersistenceSink for Arc<S> {
    fn write(&self, document: Document) {
        (**self).write(document)
    }
}

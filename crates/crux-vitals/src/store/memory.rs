//! In-process document store

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;
use tracing::trace;

use super::{Document, DocumentPath, DocumentStore, WriteMode};
use crate::error::StoreError;

/// Document store backed by a map, assigning server timestamps from the
/// local clock
#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: Mutex<BTreeMap<DocumentPath, Map<String, Value>>>,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, path: &DocumentPath) -> Option<Map<String, Value>> {
        self.documents.lock().await.get(path).cloned()
    }

    /// Paths of all stored documents, sorted
    pub async fn paths(&self) -> Vec<String> {
        self.documents
            .lock()
            .await
            .keys()
            .map(ToString::to_string)
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.documents.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Number of successful writes, including overwrites
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn write(
        &self,
        path: &DocumentPath,
        document: Document,
        mode: WriteMode,
    ) -> Result<(), StoreError> {
        let Document {
            mut fields,
            server_timestamps,
        } = document;

        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        for field in server_timestamps {
            fields.insert(field, Value::String(now.clone()));
        }

        let mut documents = self.documents.lock().await;
        match mode {
            WriteMode::Replace => {
                documents.insert(path.clone(), fields);
            }
            WriteMode::Merge => {
                documents.entry(path.clone()).or_default().extend(fields);
            }
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        trace!(%path, ?mode, "Stored document");
        Ok(())
    }
}

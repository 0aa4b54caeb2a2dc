//! Persisted snapshot shape and writer
//!
//! A snapshot is keyed only by inputs that are stable across retries (the
//! window's end date and the form factor), and every write replaces the
//! whole document. Re-ingesting a window therefore overwrites it with the
//! same content instead of adding a duplicate; only `fetchedAt` changes.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use tracing::{debug, instrument};

use crate::classify::{classify, Shares};
use crate::error::StoreError;
use crate::record::{CollectionPeriod, FormFactor, MetricRecord};
use crate::store::{Document, DocumentPath, DocumentStore, WriteMode};

/// Field the store fills with its own write time
pub const FETCHED_AT_FIELD: &str = "fetchedAt";

/// Where a snapshot's data came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SnapshotSource {
    #[serde(rename = "crux_api")]
    LatestWindow,
    #[serde(rename = "crux_history_api")]
    History,
}

/// One metric inside a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSnapshot {
    #[serde(flatten)]
    pub record: MetricRecord,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shares: Option<Shares>,
}

impl MetricSnapshot {
    /// Wrap a record, classifying its histogram when asked to
    ///
    /// Metrics without a histogram (categorical fractions) are never
    /// classified.
    pub fn new(name: &str, record: MetricRecord, with_shares: bool) -> Self {
        let shares = (with_shares && !record.histogram.is_empty())
            .then(|| classify(name, &record.histogram));
        Self { record, shares }
    }
}

/// Point-in-time field data for one origin, form factor and window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// The resolved origin
    pub url: String,
    pub form_factor: FormFactor,
    pub w_start: String,
    pub w_end: String,
    pub collection_period: CollectionPeriod,
    pub metrics: BTreeMap<String, MetricSnapshot>,
    pub source: SnapshotSource,
}

impl Snapshot {
    pub fn new(
        url: impl Into<String>,
        form_factor: FormFactor,
        period: CollectionPeriod,
        metrics: BTreeMap<String, MetricSnapshot>,
        source: SnapshotSource,
    ) -> Self {
        Self {
            url: url.into(),
            form_factor,
            w_start: period.first_date.to_string(),
            w_end: period.last_date.to_string(),
            collection_period: period,
            metrics,
            source,
        }
    }

    /// Deterministic id: `<window end>_<form factor>`
    pub fn document_id(&self) -> String {
        document_id(&self.collection_period, self.form_factor)
    }
}

/// Document id for a window and form factor, e.g. `2024-05-04_desktop`
pub fn document_id(period: &CollectionPeriod, form_factor: FormFactor) -> String {
    format!("{}_{}", period.last_date, form_factor.suffix())
}

/// Writes snapshots below a root document
pub struct SnapshotWriter<'a, D: DocumentStore + ?Sized> {
    store: &'a D,
    root: DocumentPath,
}

impl<'a, D: DocumentStore + ?Sized> SnapshotWriter<'a, D> {
    /// `root` is the target document, e.g. `metrics/<id>`
    pub fn new(store: &'a D, root: DocumentPath) -> Self {
        Self { store, root }
    }

    pub fn root(&self) -> &DocumentPath {
        &self.root
    }

    /// Fully replace `<root>/<collection>/<document_id>` with the snapshot
    #[instrument(skip(self, snapshot), fields(root = %self.root))]
    pub async fn write(
        &self,
        collection: &str,
        document_id: &str,
        snapshot: &Snapshot,
    ) -> Result<DocumentPath, StoreError> {
        let path = self.root.child(collection, document_id)?;
        let document =
            Document::from_serializable(snapshot)?.with_server_timestamp(FETCHED_AT_FIELD);
        self.store.write(&path, document, WriteMode::Replace).await?;
        debug!(%path, "Snapshot written");
        Ok(path)
    }

    /// Record which origin variant was resolved on the root document
    pub async fn write_origin_metadata(&self, url: &str) -> Result<(), StoreError> {
        let document = Document::from_serializable(&json!({ "origin": true, "url": url }))?;
        self.store
            .write(&self.root, document, WriteMode::Merge)
            .await
    }
}

//! Scripted field-data source and failing store

use async_trait::async_trait;
use crux_vitals::error::{CruxError, StoreError};
use crux_vitals::record::{FieldRecord, FormFactor, HistoryRecord};
use crux_vitals::store::{Document, DocumentPath, DocumentStore, WriteMode};
use crux_vitals::FieldDataSource;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Mutex;

/// What the fake answers for one (origin, form factor) pair
#[derive(Debug, Clone)]
pub enum Reply {
    Record(FieldRecord),
    History(HistoryRecord),
    /// HTTP error status; 404 becomes `NotFound`
    Status(u16),
}

/// Answers queries from a table; unscripted pairs are `NotFound`
#[derive(Default)]
pub struct FakeSource {
    replies: HashMap<(String, FormFactor), Reply>,
    calls: Mutex<Vec<(String, FormFactor)>>,
}

#[allow(dead_code)]
impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(mut self, origin: &str, form_factor: FormFactor, reply: Reply) -> Self {
        self.replies.insert((origin.to_string(), form_factor), reply);
        self
    }

    /// Every query issued so far, in order
    pub fn calls(&self) -> Vec<(String, FormFactor)> {
        self.calls.lock().unwrap().clone()
    }

    fn lookup(&self, origin: &str, form_factor: FormFactor) -> Result<Reply, CruxError> {
        self.calls
            .lock()
            .unwrap()
            .push((origin.to_string(), form_factor));

        match self.replies.get(&(origin.to_string(), form_factor)) {
            None | Some(Reply::Status(404)) => Err(CruxError::NotFound {
                origin: origin.to_string(),
                form_factor: form_factor.to_string(),
            }),
            Some(Reply::Status(status)) => Err(CruxError::Api {
                status: *status,
                body: "scripted failure".to_string(),
            }),
            Some(reply) => Ok(reply.clone()),
        }
    }
}

#[async_trait]
impl FieldDataSource for FakeSource {
    async fn query_record(
        &self,
        origin: &str,
        form_factor: FormFactor,
        _metrics: Option<&[String]>,
    ) -> Result<FieldRecord, CruxError> {
        match self.lookup(origin, form_factor)? {
            Reply::Record(record) => Ok(record),
            other => panic!("expected a record reply, scripted {:?}", other),
        }
    }

    async fn query_history(
        &self,
        origin: &str,
        form_factor: FormFactor,
        _metrics: &[String],
        _window_count: u32,
    ) -> Result<HistoryRecord, CruxError> {
        match self.lookup(origin, form_factor)? {
            Reply::History(history) => Ok(history),
            other => panic!("expected a history reply, scripted {:?}", other),
        }
    }
}

/// Store that rejects every write
pub struct RejectingStore;

#[async_trait]
impl DocumentStore for RejectingStore {
    async fn write(
        &self,
        path: &DocumentPath,
        _document: Document,
        _mode: WriteMode,
    ) -> Result<(), StoreError> {
        Err(StoreError::Rejected {
            path: path.to_string(),
            status: 403,
            body: "permission denied".to_string(),
        })
    }
}

/// A latest-window record ending on the given day of May 2024
#[allow(dead_code)]
pub fn record(end_day: u32, lcp_bins: Value) -> FieldRecord {
    serde_json::from_value(json!({
        "key": { "origin": "https://example.com" },
        "metrics": {
            "largest_contentful_paint": {
                "histogram": lcp_bins,
                "percentiles": { "p75": 1800 }
            },
            "cumulative_layout_shift": {
                "histogram": [
                    { "start": "0.00", "end": "0.10", "density": 0.9 },
                    { "start": "0.10", "end": "0.25", "density": 0.06 },
                    { "start": "0.25", "density": 0.04 }
                ],
                "percentiles": { "p75": "0.05" }
            },
            "navigation_types": {
                "fractions": { "navigate": 0.8, "reload": 0.2 }
            }
        },
        "collectionPeriod": {
            "firstDate": { "year": 2024, "month": 4, "day": end_day },
            "lastDate": { "year": 2024, "month": 5, "day": end_day }
        }
    }))
    .unwrap()
}

/// A history record with `periods` weekly windows and `p75s` values
#[allow(dead_code)]
pub fn history(periods: u32, p75s: usize) -> HistoryRecord {
    let collection_periods: Vec<Value> = (0..periods)
        .map(|i| {
            json!({
                "firstDate": { "year": 2024, "month": 1, "day": 1 + i },
                "lastDate": { "year": 2024, "month": 2, "day": 1 + i }
            })
        })
        .collect();

    serde_json::from_value(json!({
        "key": { "origin": "https://example.com" },
        "metrics": {
            "largest_contentful_paint": {
                "histogramTimeseries": [
                    { "start": 0, "end": 2500, "densities": vec![0.7; p75s] },
                    { "start": 2500, "end": 4000, "densities": vec![0.2; p75s] },
                    { "start": 4000, "densities": vec![0.1; p75s] }
                ],
                "percentilesTimeseries": { "p75s": vec![2100; p75s] }
            }
        },
        "collectionPeriods": collection_periods
    }))
    .unwrap()
}

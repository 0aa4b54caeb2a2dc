//! Ingestion orchestration
//!
//! One run walks a fixed sequence of stages:
//!
//! ```text
//! Init -> ResolvingOrigin -> (Fetching -> Classifying -> Writing)* -> Done
//!                 \______________________|____________________/
//!                                     Failed
//! ```
//!
//! The origin is resolved once by probing both `www.` variants, then every
//! item (form factor, or history window) becomes one snapshot. Items the
//! source has no data for are skipped in every mode; other request failures
//! are skipped in [`IngestMode::Daily`] and [`IngestMode::History`] but abort
//! an [`IngestMode::Latest`] run. Store failures always abort.
//!
//! Requests are strictly sequential. The writes of one history response are
//! the only place work fans out: they are independent documents and are
//! issued together, then joined before the run completes.
//!
//! # Example
//!
//! ```no_run
//! use crux_vitals::{CruxClient, Ingestor, IngestMode, JobConfig, MemoryStore};
//! use std::time::Duration;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let client = CruxClient::new("api-key", Duration::from_secs(30))?;
//! let store = MemoryStore::new();
//! let job = JobConfig::new("target-doc", "gant.com", IngestMode::History);
//!
//! let report = Ingestor::new(&client, &store, &job).run().await?;
//! println!("wrote {} snapshots for {}", report.written.len(), report.origin);
//! # Ok(())
//! # }
//! ```

use chrono::{SecondsFormat, Utc};
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use crate::config::{IngestMode, JobConfig};
use crate::crux::FieldDataSource;
use crate::error::{CruxError, IngestError, Result};
use crate::origin::{self, OriginCandidates};
use crate::record::{FieldRecord, FormFactor, HistoryRecord};
use crate::snapshot::{MetricSnapshot, Snapshot, SnapshotSource, SnapshotWriter};
use crate::store::{DocumentPath, DocumentStore};

const DEFAULT_ROOT_COLLECTION: &str = "metrics";

/// Stage of an ingestion run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStage {
    Init,
    ResolvingOrigin,
    Fetching,
    Classifying,
    Writing,
    Done,
    Failed,
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunStage::Init => "init",
            RunStage::ResolvingOrigin => "resolving_origin",
            RunStage::Fetching => "fetching",
            RunStage::Classifying => "classifying",
            RunStage::Writing => "writing",
            RunStage::Done => "done",
            RunStage::Failed => "failed",
        })
    }
}

/// An item that produced no snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedItem {
    pub form_factor: FormFactor,
    /// Window id, when the window was known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window: Option<String>,
    pub reason: String,
}

/// Outcome of a successful run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestReport {
    pub mode: IngestMode,
    /// The resolved origin
    pub origin: String,
    /// Path of the target document
    pub target: String,
    pub collection: String,
    /// Ids of the snapshots written, in write order
    pub written: Vec<String>,
    pub skipped: Vec<SkippedItem>,
    pub started_at: String,
    pub duration_ms: u64,
}

/// Mutable bookkeeping of one run
struct RunState {
    stage: RunStage,
    origin: Option<String>,
    written: Vec<String>,
    skipped: Vec<SkippedItem>,
}

impl RunState {
    fn new() -> Self {
        Self {
            stage: RunStage::Init,
            origin: None,
            written: Vec::new(),
            skipped: Vec::new(),
        }
    }

    fn enter(&mut self, stage: RunStage) {
        if self.stage != stage {
            debug!(from = %self.stage, to = %stage, "Stage transition");
            self.stage = stage;
        }
    }

    fn skip(&mut self, form_factor: FormFactor, window: Option<String>, reason: impl Into<String>) {
        self.skipped.push(SkippedItem {
            form_factor,
            window,
            reason: reason.into(),
        });
    }
}

/// Runs one ingestion job against injected source and store handles
pub struct Ingestor<'a, S: ?Sized, D: ?Sized> {
    source: &'a S,
    store: &'a D,
    job: &'a JobConfig,
    root_collection: String,
}

impl<'a, S, D> Ingestor<'a, S, D>
where
    S: FieldDataSource + ?Sized,
    D: DocumentStore + ?Sized,
{
    pub fn new(source: &'a S, store: &'a D, job: &'a JobConfig) -> Self {
        Self {
            source,
            store,
            job,
            root_collection: DEFAULT_ROOT_COLLECTION.to_string(),
        }
    }

    /// Override the root collection (defaults to `metrics`)
    pub fn with_root_collection(mut self, collection: impl Into<String>) -> Self {
        self.root_collection = collection.into();
        self
    }

    /// Execute the job to completion
    #[instrument(skip(self), fields(mode = %self.job.mode, base = %self.job.origin))]
    pub async fn run(&self) -> Result<IngestReport> {
        let started = Instant::now();
        let started_at = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        let mut state = RunState::new();

        let result = self.execute(&mut state).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(target) => {
                state.enter(RunStage::Done);
                info!(
                    written = state.written.len(),
                    skipped = state.skipped.len(),
                    duration_ms,
                    "Ingestion finished"
                );
                Ok(IngestReport {
                    mode: self.job.mode,
                    origin: state.origin.unwrap_or_default(),
                    target: target.to_string(),
                    collection: self.job.collection().to_string(),
                    written: state.written,
                    skipped: state.skipped,
                    started_at,
                    duration_ms,
                })
            }
            Err(e) => {
                error!(stage = %state.stage, error = %e, "Ingestion failed");
                state.enter(RunStage::Failed);
                Err(e)
            }
        }
    }

    async fn execute(&self, state: &mut RunState) -> Result<DocumentPath> {
        self.job.validate()?;
        let candidates = origin::candidates(&self.job.origin)?;
        let root = DocumentPath::new(&self.root_collection, &self.job.target_doc_id)
            .map_err(|e| IngestError::Config(e.to_string()))?;
        let writer = SnapshotWriter::new(self.store, root.clone());

        match self.job.mode {
            IngestMode::Daily | IngestMode::Latest => {
                self.ingest_latest(state, &candidates, &writer).await?
            }
            IngestMode::History => self.ingest_history(state, &candidates, &writer).await?,
        }
        Ok(root)
    }

    /// Try candidates in order until one has data
    ///
    /// `NotFound` moves on to the next candidate, anything else is fatal.
    /// The resolving response is handed back so it can be reused.
    async fn resolve<T, F, Fut>(
        &self,
        state: &mut RunState,
        candidates: &OriginCandidates,
        mut lookup: F,
    ) -> Result<(String, T)>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = std::result::Result<T, CruxError>>,
    {
        state.enter(RunStage::ResolvingOrigin);

        for candidate in candidates.iter() {
            match lookup(candidate.to_string()).await {
                Ok(response) => {
                    info!(origin = candidate, "Resolved origin");
                    state.origin = Some(candidate.to_string());
                    return Ok((candidate.to_string(), response));
                }
                Err(e) if e.is_not_found() => {
                    debug!(origin = candidate, "No field data for candidate, trying next");
                }
                Err(e) => return Err(IngestError::Fetch(e)),
            }
        }

        Err(IngestError::OriginUnresolved {
            base: self.job.origin.clone(),
            tried: candidates.to_vec(),
        })
    }

    async fn ingest_latest(
        &self,
        state: &mut RunState,
        candidates: &OriginCandidates,
        writer: &SnapshotWriter<'_, D>,
    ) -> Result<()> {
        let metrics = self.job.metrics();
        let metrics = metrics.as_deref();
        let source = self.source;

        let (origin, resolving) = self
            .resolve(state, candidates, move |candidate| async move {
                source
                    .query_record(&candidate, FormFactor::All, metrics)
                    .await
            })
            .await?;
        writer.write_origin_metadata(&origin).await?;

        let mut resolving = Some(resolving);
        for form_factor in self.job.form_factors() {
            state.enter(RunStage::Fetching);
            let fetched = match (form_factor, resolving.take()) {
                (FormFactor::All, Some(record)) => Ok(record),
                (_, unused) => {
                    resolving = unused;
                    self.source
                        .query_record(&origin, form_factor, metrics)
                        .await
                }
            };

            let record = match fetched {
                Ok(record) => record,
                Err(e) if e.is_not_found() => {
                    info!(%origin, %form_factor, "No field data, skipping");
                    state.skip(form_factor, None, e.to_string());
                    continue;
                }
                Err(e) if self.job.mode == IngestMode::Daily => {
                    warn!(%origin, %form_factor, error = %e, "Fetch failed, skipping");
                    state.skip(form_factor, None, e.to_string());
                    continue;
                }
                Err(e) => return Err(IngestError::Fetch(e)),
            };

            state.enter(RunStage::Classifying);
            let snapshot = latest_snapshot(&origin, form_factor, record, self.job.classify);

            state.enter(RunStage::Writing);
            let id = snapshot.document_id();
            writer.write(self.job.collection(), &id, &snapshot).await?;
            info!(%origin, %form_factor, window = %id, "Snapshot stored");
            state.written.push(id);
        }

        Ok(())
    }

    async fn ingest_history(
        &self,
        state: &mut RunState,
        candidates: &OriginCandidates,
        writer: &SnapshotWriter<'_, D>,
    ) -> Result<()> {
        let metrics = self.job.metrics().unwrap_or_default();
        let metric_names = metrics.as_slice();
        let windows = self.job.history_windows;
        let source = self.source;

        let (origin, resolving) = self
            .resolve(state, candidates, move |candidate| async move {
                source
                    .query_history(&candidate, FormFactor::All, metric_names, windows)
                    .await
            })
            .await?;
        writer.write_origin_metadata(&origin).await?;

        let mut resolving = Some(resolving);
        for form_factor in self.job.form_factors() {
            state.enter(RunStage::Fetching);
            let fetched = match (form_factor, resolving.take()) {
                (FormFactor::All, Some(history)) => Ok(history),
                (_, unused) => {
                    resolving = unused;
                    self.source
                        .query_history(&origin, form_factor, metric_names, windows)
                        .await
                }
            };

            let history = match fetched {
                Ok(history) => history,
                Err(e) => {
                    if e.is_not_found() {
                        info!(%origin, %form_factor, "No history, skipping");
                    } else {
                        warn!(%origin, %form_factor, error = %e, "History fetch failed, skipping");
                    }
                    state.skip(form_factor, None, e.to_string());
                    continue;
                }
            };

            if history.metrics.is_empty() {
                info!(%origin, %form_factor, "History has none of the requested metrics, skipping");
                state.skip(form_factor, None, "no requested metric in history");
                continue;
            }

            state.enter(RunStage::Classifying);
            let snapshots = history_snapshots(&origin, form_factor, &history, self.job.classify);

            state.enter(RunStage::Writing);
            let collection = self.job.collection();
            let writes = snapshots.iter().map(|snapshot| async move {
                let id = snapshot.document_id();
                writer.write(collection, &id, snapshot).await?;
                Ok::<_, IngestError>(id)
            });
            let ids = try_join_all(writes).await?;
            info!(%origin, %form_factor, count = ids.len(), "History snapshots stored");
            state.written.extend(ids);
        }

        Ok(())
    }
}

/// Build the snapshot of a latest-window record
pub fn latest_snapshot(
    origin: &str,
    form_factor: FormFactor,
    record: FieldRecord,
    classify: bool,
) -> Snapshot {
    let metrics: BTreeMap<String, MetricSnapshot> = record
        .metrics
        .into_iter()
        .map(|(name, metric)| {
            let snapshot = MetricSnapshot::new(&name, metric, classify);
            (name, snapshot)
        })
        .collect();

    Snapshot::new(
        origin,
        form_factor,
        record.collection_period,
        metrics,
        SnapshotSource::LatestWindow,
    )
}

/// Build one snapshot per window of a history record
///
/// Windows are taken from the common prefix of all parallel arrays; a longer
/// array is truncated, never an error.
pub fn history_snapshots(
    origin: &str,
    form_factor: FormFactor,
    history: &HistoryRecord,
    classify: bool,
) -> Vec<Snapshot> {
    let windows = history.aligned_len();
    let longest = history
        .metrics
        .values()
        .filter_map(|series| series.series_len())
        .fold(history.collection_periods.len(), usize::max);
    if windows < longest {
        warn!(
            %origin,
            %form_factor,
            periods = history.collection_periods.len(),
            windows,
            "History arrays differ in length, truncating to common prefix"
        );
    }

    history
        .collection_periods
        .iter()
        .take(windows)
        .enumerate()
        .map(|(index, period)| {
            let metrics = history
                .metrics
                .iter()
                .map(|(name, series)| {
                    (
                        name.clone(),
                        MetricSnapshot::new(name, series.at(index), classify),
                    )
                })
                .collect();
            Snapshot::new(
                origin,
                form_factor,
                *period,
                metrics,
                SnapshotSource::History,
            )
        })
        .collect()
}

//! Chrome UX Report field-data ingestion
//!
//! This crate pulls real-user Core Web Vitals for a site from the Chrome UX
//! Report (CrUX) API and persists them as immutable, idempotently keyed
//! snapshots in a document store.
//!
//! # Features
//!
//! - **Origin resolution**: Tries the `www.` and bare variants of a site and
//!   keeps whichever one has field data
//! - **Latest and history**: Ingests the latest collection window per form
//!   factor, or up to 40 trailing weekly windows
//! - **Classification**: Splits histograms into good / needs-improvement /
//!   poor shares using the Core Web Vitals thresholds
//! - **Idempotent persistence**: Snapshot ids derive from the window end date
//!   and form factor, so re-runs overwrite instead of duplicating
//!
//! # Example
//!
//! ```no_run
//! use crux_vitals::{Config, CruxClient, FirestoreStore, Ingestor};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = Config::load()?;
//! config.validate()?;
//!
//! let client = CruxClient::new(config.api.key.expose(), config.api.timeout())?;
//! let store = FirestoreStore::new(
//!     config.store.project_id.as_deref().unwrap_or_default(),
//!     config.store.access_token.clone().unwrap_or_default().expose(),
//!     config.api.timeout(),
//! )?;
//!
//! let report = Ingestor::new(&client, &store, &config.job).run().await?;
//! println!("{}", serde_json::to_string_pretty(&report)?);
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! Jobs are configured through environment variables, optionally layered on
//! a TOML file named by `CRUX_INGEST_CONFIG`:
//!
//! ```toml
//! [job]
//! target_doc_id = "shop-42"
//! origin = "gant.com"
//! mode = "daily"
//!
//! [api]
//! key = "..."
//! timeout_secs = 30
//!
//! [store]
//! backend = "firestore"
//! project_id = "my-project"
//! ```

pub mod classify;
pub mod config;
pub mod crux;
pub mod error;
pub mod ingest;
pub mod origin;
pub mod record;
pub mod snapshot;
pub mod store;

pub use classify::{classify, Shares, Thresholds};
pub use config::{Config, IngestMode, JobConfig, StoreBackend};
pub use crux::{CruxClient, FieldDataSource};
pub use error::{ClassifyError, CruxError, IngestError, Result, StoreError};
pub use ingest::{IngestReport, Ingestor, RunStage, SkippedItem};
pub use origin::{candidates, OriginCandidates};
pub use record::{CollectionPeriod, FieldRecord, FormFactor, HistogramBin, HistoryRecord};
pub use snapshot::{Snapshot, SnapshotWriter};
pub use store::{DocumentPath, DocumentStore, FirestoreStore, MemoryStore};

//! Job configuration
//!
//! A job is described by an optional TOML file overlaid with environment
//! variables. Secrets (API key, store token) are normally only supplied
//! through the environment.
//!
//! ```toml
//! [job]
//! target_doc_id = "kBrk5tvWYTrQ8sBM3e87"
//! origin = "https://gant.com"
//! mode = "history"
//! metrics = ["largest_contentful_paint", "cumulative_layout_shift"]
//! history_windows = 40
//!
//! [api]
//! timeout_secs = 30
//!
//! [store]
//! backend = "firestore"
//! root_collection = "metrics"
//! ```

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::classify::LARGEST_CONTENTFUL_PAINT;
use crate::crux::{DEFAULT_ENDPOINT, MAX_HISTORY_WINDOWS};
use crate::error::IngestError;
use crate::origin;
use crate::record::FormFactor;

/// Environment variable naming the TOML job file
pub const CONFIG_PATH_ENV: &str = "CRUX_INGEST_CONFIG";

/// Complete configuration for one ingestion run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub job: JobConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

impl Config {
    /// Load the file named by `CRUX_INGEST_CONFIG` (if any) and overlay the
    /// process environment
    pub fn load() -> anyhow::Result<Self> {
        let mut config = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) if !path.trim().is_empty() => Self::from_file(path.trim())?,
            _ => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_str(&content)
    }

    pub fn from_str(s: &str) -> anyhow::Result<Self> {
        toml::from_str(s).context("Failed to parse TOML configuration")
    }

    /// Overlay values from an environment lookup; blank values are ignored
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("CRUX_TARGET_DOC_ID") {
            self.job.target_doc_id = v;
        }
        if let Some(v) = get("CRUX_ORIGIN") {
            self.job.origin = v;
        }
        if let Some(v) = get("CRUX_MODE") {
            match v.parse() {
                Ok(mode) => self.job.mode = mode,
                // surfaced by validate()
                Err(_) => self.job.invalid_mode = Some(v),
            }
        }
        if let Some(v) = get("CRUX_HISTORY_WINDOWS") {
            self.job.history_windows = v.trim().parse().unwrap_or(0);
        }
        if let Some(v) = get("CRUX_API_KEY") {
            self.api.key = Secret::new(v);
        }
        if let Some(v) = get("CRUX_ENDPOINT") {
            self.api.endpoint = v;
        }
        if let Some(v) = get("CRUX_STORE") {
            match v.parse() {
                Ok(backend) => self.store.backend = backend,
                Err(_) => self.store.invalid_backend = Some(v),
            }
        }
        if let Some(v) = get("FIRESTORE_PROJECT_ID") {
            self.store.project_id = Some(v);
        }
        if let Some(v) = get("FIRESTORE_ACCESS_TOKEN") {
            self.store.access_token = Some(Secret::new(v));
        }
    }

    /// Check every required value before any network call is made
    pub fn validate(&self) -> Result<(), IngestError> {
        self.job.validate()?;

        if self.api.key.is_empty() {
            return Err(config_error("CRUX_API_KEY is required"));
        }
        if self.api.endpoint.trim().is_empty() {
            return Err(config_error("api.endpoint must not be empty"));
        }
        if self.api.timeout_secs == 0 {
            return Err(config_error("api.timeout_secs must be at least 1"));
        }

        self.store.validate()
    }
}

fn config_error(message: impl Into<String>) -> IngestError {
    IngestError::Config(message.into())
}

fn validate_segment(name: &str, value: &str) -> Result<(), IngestError> {
    if value.trim().is_empty() {
        return Err(config_error(format!("{} is required", name)));
    }
    if value.contains('/') {
        return Err(config_error(format!("{} must not contain '/'", name)));
    }
    Ok(())
}

/// Which windows are ingested and how failures are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestMode {
    /// Latest window per form factor; failing form factors are skipped
    #[default]
    Daily,
    /// Latest window, all metrics; any request failure aborts the run
    Latest,
    /// Up to `history_windows` trailing windows
    History,
}

impl FromStr for IngestMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" => Ok(IngestMode::Daily),
            "latest" => Ok(IngestMode::Latest),
            "history" | "weekly" => Ok(IngestMode::History),
            other => Err(format!("unknown ingestion mode '{}'", other)),
        }
    }
}

impl fmt::Display for IngestMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IngestMode::Daily => "daily",
            IngestMode::Latest => "latest",
            IngestMode::History => "history",
        })
    }
}

/// What to ingest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    /// Document below the root collection that receives the snapshots
    #[serde(default)]
    pub target_doc_id: String,
    /// Base origin; the `www.` variant is tried automatically
    #[serde(default)]
    pub origin: String,
    #[serde(default)]
    pub mode: IngestMode,
    /// Defaults: every form factor for daily, `all` otherwise
    #[serde(default)]
    pub form_factors: Option<Vec<FormFactor>>,
    /// Defaults: everything for daily/latest, LCP for history
    #[serde(default)]
    pub metrics: Option<Vec<String>>,
    #[serde(default = "default_history_windows")]
    pub history_windows: u32,
    /// Attach good/ok/poor shares to every histogram metric
    #[serde(default = "default_classify")]
    pub classify: bool,
    /// Sub-collection override; defaults to `daily-crux` / `weekly-crux`
    #[serde(default)]
    pub collection: Option<String>,
    #[serde(skip)]
    invalid_mode: Option<String>,
}

fn default_history_windows() -> u32 {
    MAX_HISTORY_WINDOWS
}

fn default_classify() -> bool {
    true
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            target_doc_id: String::new(),
            origin: String::new(),
            mode: IngestMode::default(),
            form_factors: None,
            metrics: None,
            history_windows: default_history_windows(),
            classify: default_classify(),
            collection: None,
            invalid_mode: None,
        }
    }
}

impl JobConfig {
    pub fn new(target_doc_id: impl Into<String>, origin: impl Into<String>, mode: IngestMode) -> Self {
        Self {
            target_doc_id: target_doc_id.into(),
            origin: origin.into(),
            mode,
            ..Self::default()
        }
    }

    /// Form factors to ingest, in order
    pub fn form_factors(&self) -> Vec<FormFactor> {
        match (&self.form_factors, self.mode) {
            (Some(list), _) => list.clone(),
            (None, IngestMode::Daily) => FormFactor::ALL_VARIANTS.to_vec(),
            (None, _) => vec![FormFactor::All],
        }
    }

    /// Metric names to request; `None` asks for everything
    pub fn metrics(&self) -> Option<Vec<String>> {
        match (&self.metrics, self.mode) {
            (Some(list), _) => Some(list.clone()),
            (None, IngestMode::History) => Some(vec![LARGEST_CONTENTFUL_PAINT.to_string()]),
            (None, _) => None,
        }
    }

    /// Sub-collection the snapshots go to
    pub fn collection(&self) -> &str {
        match (&self.collection, self.mode) {
            (Some(name), _) => name,
            (None, IngestMode::History) => "weekly-crux",
            (None, _) => "daily-crux",
        }
    }

    pub fn validate(&self) -> Result<(), IngestError> {
        if let Some(mode) = &self.invalid_mode {
            return Err(config_error(format!("unknown ingestion mode '{}'", mode)));
        }
        validate_segment("target_doc_id (CRUX_TARGET_DOC_ID)", &self.target_doc_id)?;
        if self.origin.trim().is_empty() {
            return Err(config_error("origin (CRUX_ORIGIN) is required"));
        }
        origin::candidates(&self.origin)?;
        validate_segment("collection", self.collection())?;

        if self.form_factors().is_empty() {
            return Err(config_error("form_factors must not be empty"));
        }
        if let Some(metrics) = self.metrics() {
            if metrics.is_empty() || metrics.iter().any(|m| m.trim().is_empty()) {
                return Err(config_error("metrics must be a non-empty list of names"));
            }
        }
        if self.mode == IngestMode::History
            && !(1..=MAX_HISTORY_WINDOWS).contains(&self.history_windows)
        {
            return Err(config_error(format!(
                "history_windows must be between 1 and {}",
                MAX_HISTORY_WINDOWS
            )));
        }
        Ok(())
    }
}

/// CrUX API access
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default)]
    pub key: Secret,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            key: Secret::default(),
            endpoint: default_endpoint(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Firestore,
    /// Keep documents in memory only (dry run)
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "firestore" => Ok(StoreBackend::Firestore),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(format!("unknown store backend '{}'", other)),
        }
    }
}

/// Where snapshots are persisted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    #[serde(default = "default_root_collection")]
    pub root_collection: String,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub access_token: Option<Secret>,
    #[serde(skip)]
    invalid_backend: Option<String>,
}

fn default_root_collection() -> String {
    "metrics".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            root_collection: default_root_collection(),
            project_id: None,
            access_token: None,
            invalid_backend: None,
        }
    }
}

impl StoreConfig {
    pub fn validate(&self) -> Result<(), IngestError> {
        if let Some(backend) = &self.invalid_backend {
            return Err(config_error(format!("unknown store backend '{}'", backend)));
        }
        validate_segment("store.root_collection", &self.root_collection)?;

        if self.backend == StoreBackend::Firestore {
            if self.project_id.as_deref().map_or(true, |p| p.trim().is_empty()) {
                return Err(config_error("FIRESTORE_PROJECT_ID is required"));
            }
            if self.access_token.as_ref().map_or(true, Secret::is_empty) {
                return Err(config_error("FIRESTORE_ACCESS_TOKEN is required"));
            }
        }
        Ok(())
    }
}

/// A credential that never shows up in `Debug` output, logs or serialized
/// config
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("Secret(<empty>)")
        } else {
            f.write_str("Secret(***)")
        }
    }
}

/// Serializes as `"***"`, or `""` when unset
impl Serialize for Secret {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(if self.0.is_empty() { "" } else { "***" })
    }
}

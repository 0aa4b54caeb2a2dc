//! Error types for field-data ingestion

use thiserror::Error;

/// Failures talking to the Chrome UX Report API
#[derive(Debug, Error)]
pub enum CruxError {
    /// The API has no data for this origin / form factor / metric set
    #[error("no field data for {origin} ({form_factor})")]
    NotFound { origin: String, form_factor: String },

    /// Any other non-success response
    #[error("CrUX API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("CrUX request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Failed to decode CrUX response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl CruxError {
    /// Whether the source simply has no data, as opposed to failing
    pub fn is_not_found(&self) -> bool {
        matches!(self, CruxError::NotFound { .. })
    }

    /// HTTP status of the failed response, if there was one
    pub fn status(&self) -> Option<u16> {
        match self {
            CruxError::NotFound { .. } => Some(404),
            CruxError::Api { status, .. } => Some(*status),
            CruxError::Transport(e) => e.status().map(|s| s.as_u16()),
            CruxError::Decode(_) => None,
        }
    }
}

/// Failures writing to the document store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Invalid document path '{0}'")]
    InvalidPath(String),

    #[error("Document store rejected write to {path} with {status}: {body}")]
    Rejected {
        path: String,
        status: u16,
        body: String,
    },

    #[error("Document store request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Failed to encode document: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClassifyError {
    #[error("No thresholds defined for metric '{0}'")]
    UnknownMetric(String),
}

/// Errors that abort an ingestion run
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid origin '{input}': {reason}")]
    InvalidOrigin { input: String, reason: String },

    #[error("No field data for any variant of {base} (tried {tried:?})")]
    OriginUnresolved { base: String, tried: Vec<String> },

    #[error("Fetching field data failed")]
    Fetch(#[source] CruxError),

    #[error("Persisting snapshot failed")]
    Persistence(#[from] StoreError),
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;

//! Chrome UX Report API client
//!
//! Two request shapes exist: `queryRecord` returns the latest collection
//! window, `queryHistoryRecord` returns up to 40 trailing windows as parallel
//! arrays. They are kept separate so the latest-window path does not pay for
//! history it never reads.
//!
//! The orchestrator only depends on [`FieldDataSource`]; [`CruxClient`] is
//! the production implementation.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::error::CruxError;
use crate::record::{FieldRecord, FormFactor, HistoryRecord, HistoryResponse, RecordResponse};

/// Public CrUX records endpoint
pub const DEFAULT_ENDPOINT: &str = "https://chromeuxreport.googleapis.com/v1/records";

/// Upper limit the API accepts for `collectionPeriodCount`
pub const MAX_HISTORY_WINDOWS: u32 = 40;

/// Source of field data for one origin
#[async_trait]
pub trait FieldDataSource: Send + Sync {
    /// Fetch the latest collection window
    ///
    /// `metrics: None` asks for every metric the source has.
    async fn query_record(
        &self,
        origin: &str,
        form_factor: FormFactor,
        metrics: Option<&[String]>,
    ) -> Result<FieldRecord, CruxError>;

    /// Fetch up to `window_count` trailing collection windows
    async fn query_history(
        &self,
        origin: &str,
        form_factor: FormFactor,
        metrics: &[String],
        window_count: u32,
    ) -> Result<HistoryRecord, CruxError>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryBody<'a> {
    origin: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    form_factor: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    metrics: Option<&'a [String]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    collection_period_count: Option<u32>,
}

/// HTTP client for the CrUX API
#[derive(Debug, Clone)]
pub struct CruxClient {
    http: Client,
    endpoint: String,
    api_key: String,
}

impl CruxClient {
    /// Create a client against the public endpoint
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self, CruxError> {
        Self::with_endpoint(DEFAULT_ENDPOINT, api_key, timeout)
    }

    /// Create a client against a custom endpoint (proxies, tests)
    pub fn with_endpoint(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, CruxError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn post(
        &self,
        method: &str,
        body: &QueryBody<'_>,
        form_factor: FormFactor,
    ) -> Result<String, CruxError> {
        let url = format!("{}:{}", self.endpoint, method);
        debug!(%url, origin = body.origin, %form_factor, "Querying CrUX");

        let response = self
            .http
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .header(reqwest::header::ACCEPT, "application/json")
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if status == StatusCode::NOT_FOUND {
            debug!(origin = body.origin, %form_factor, "CrUX has no data");
            return Err(CruxError::NotFound {
                origin: body.origin.to_string(),
                form_factor: form_factor.to_string(),
            });
        }
        if !status.is_success() {
            warn!(status = status.as_u16(), origin = body.origin, %form_factor, "CrUX request failed");
            return Err(CruxError::Api {
                status: status.as_u16(),
                body: text,
            });
        }

        Ok(text)
    }
}

#[async_trait]
impl FieldDataSource for CruxClient {
    #[instrument(skip_all, fields(origin = %origin, form_factor = %form_factor))]
    async fn query_record(
        &self,
        origin: &str,
        form_factor: FormFactor,
        metrics: Option<&[String]>,
    ) -> Result<FieldRecord, CruxError> {
        let body = QueryBody {
            origin,
            form_factor: form_factor.request_value(),
            metrics,
            collection_period_count: None,
        };
        let text = self.post("queryRecord", &body, form_factor).await?;
        let response: RecordResponse = serde_json::from_str(&text)?;
        Ok(response.record)
    }

    #[instrument(skip_all, fields(origin = %origin, form_factor = %form_factor))]
    async fn query_history(
        &self,
        origin: &str,
        form_factor: FormFactor,
        metrics: &[String],
        window_count: u32,
    ) -> Result<HistoryRecord, CruxError> {
        let body = QueryBody {
            origin,
            form_factor: form_factor.request_value(),
            metrics: Some(metrics),
            collection_period_count: Some(window_count.clamp(1, MAX_HISTORY_WINDOWS)),
        };
        let text = self.post("queryHistoryRecord", &body, form_factor).await?;
        let response: HistoryResponse = serde_json::from_str(&text)?;
        Ok(response.record)
    }
}

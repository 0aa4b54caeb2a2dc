//! Firestore REST backend
//!
//! Every write is a single `documents:commit` call, so a snapshot is either
//! stored completely or not at all. Replace writes carry no `updateMask`,
//! merge writes list their top-level keys in it. Server timestamps are
//! `REQUEST_TIME` field transforms applied in the same commit.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::{debug, instrument, warn};

use super::{Document, DocumentPath, DocumentStore, WriteMode};
use crate::error::StoreError;

pub const DEFAULT_BASE_URL: &str = "https://firestore.googleapis.com/v1";

/// Firestore client authenticated with an OAuth access token
#[derive(Debug, Clone)]
pub struct FirestoreStore {
    http: Client,
    base_url: String,
    database: String,
    access_token: String,
}

impl FirestoreStore {
    pub fn new(
        project_id: &str,
        access_token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, StoreError> {
        Self::with_base_url(DEFAULT_BASE_URL, project_id, access_token, timeout)
    }

    /// Target a custom base URL (emulator, tests)
    pub fn with_base_url(
        base_url: impl Into<String>,
        project_id: &str,
        access_token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, StoreError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            database: format!("projects/{}/databases/(default)", project_id),
            access_token: access_token.into(),
        })
    }

    /// Fully-qualified resource name of a document
    pub fn document_name(&self, path: &DocumentPath) -> String {
        format!("{}/documents/{}", self.database, path)
    }

    fn commit_body(&self, path: &DocumentPath, document: &Document, mode: WriteMode) -> Value {
        let mut write = Map::new();
        write.insert(
            "update".to_string(),
            json!({
                "name": self.document_name(path),
                "fields": encode_fields(&document.fields),
            }),
        );

        if mode == WriteMode::Merge {
            let field_paths: Vec<String> =
                document.fields.keys().map(|k| quote_field_path(k)).collect();
            write.insert("updateMask".to_string(), json!({ "fieldPaths": field_paths }));
        }

        if !document.server_timestamps.is_empty() {
            let transforms: Vec<Value> = document
                .server_timestamps
                .iter()
                .map(|field| {
                    json!({
                        "fieldPath": quote_field_path(field),
                        "setToServerValue": "REQUEST_TIME",
                    })
                })
                .collect();
            write.insert("updateTransforms".to_string(), Value::Array(transforms));
        }

        json!({ "writes": [Value::Object(write)] })
    }
}

#[async_trait]
impl DocumentStore for FirestoreStore {
    #[instrument(skip_all, fields(path = %path, mode = ?mode))]
    async fn write(
        &self,
        path: &DocumentPath,
        document: Document,
        mode: WriteMode,
    ) -> Result<(), StoreError> {
        let url = format!("{}/{}/documents:commit", self.base_url, self.database);
        let body = self.commit_body(path, &document, mode);

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "Firestore commit rejected");
            return Err(StoreError::Rejected {
                path: path.to_string(),
                status: status.as_u16(),
                body: text,
            });
        }

        debug!("Firestore commit succeeded");
        Ok(())
    }
}

/// Encode a JSON object as Firestore `fields`
pub fn encode_fields(fields: &Map<String, Value>) -> Value {
    Value::Object(
        fields
            .iter()
            .map(|(k, v)| (k.clone(), encode_value(v)))
            .collect(),
    )
}

/// Encode a JSON value as a Firestore typed `Value`
pub fn encode_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                json!({ "integerValue": i.to_string() })
            } else if let Some(u) = n.as_u64() {
                json!({ "integerValue": u.to_string() })
            } else {
                json!({ "doubleValue": n.as_f64().unwrap_or(0.0) })
            }
        }
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => {
            let values: Vec<Value> = items.iter().map(encode_value).collect();
            if values.is_empty() {
                json!({ "arrayValue": {} })
            } else {
                json!({ "arrayValue": { "values": values } })
            }
        }
        Value::Object(map) => json!({ "mapValue": { "fields": encode_fields(map) } }),
    }
}

/// Backtick-quote a field name unless it is a simple identifier
fn quote_field_path(field: &str) -> String {
    let mut chars = field.chars();
    let simple = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if simple {
        field.to_string()
    } else {
        format!("`{}`", field.replace('\\', "\\\\").replace('`', "\\`"))
    }
}

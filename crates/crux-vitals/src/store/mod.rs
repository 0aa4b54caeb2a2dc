//! Hierarchical document store abstraction
//!
//! Documents live at `collection/id(/collection/id)*` paths. Two write modes
//! exist: [`WriteMode::Replace`] swaps the whole document (snapshots), and
//! [`WriteMode::Merge`] overwrites only the top-level fields it carries (root
//! metadata). Timestamps that must come from the store's clock are named in
//! [`Document::server_timestamps`] instead of being set by the caller.
//!
//! # Backends
//!
//! - [`MemoryStore`]: in-process, for tests and dry runs
//! - [`FirestoreStore`]: Firestore REST `documents:commit`

pub mod firestore;
pub mod memory;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;

use crate::error::StoreError;

pub use firestore::FirestoreStore;
pub use memory::MemoryStore;

/// Address of a single document
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentPath {
    segments: Vec<String>,
}

impl DocumentPath {
    /// A document directly under a root collection
    pub fn new(collection: &str, id: &str) -> Result<Self, StoreError> {
        let mut path = Self {
            segments: Vec::with_capacity(4),
        };
        path.push(collection)?;
        path.push(id)?;
        Ok(path)
    }

    /// A document in a sub-collection of this one
    pub fn child(&self, collection: &str, id: &str) -> Result<Self, StoreError> {
        let mut path = self.clone();
        path.push(collection)?;
        path.push(id)?;
        Ok(path)
    }

    /// The last segment
    pub fn id(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or_default()
    }

    /// Parse a slash-separated path with an even number of segments
    pub fn parse(path: &str) -> Result<Self, StoreError> {
        let parts: Vec<&str> = path.split('/').collect();
        if parts.len() % 2 != 0 {
            return Err(StoreError::InvalidPath(path.to_string()));
        }
        let mut parsed = Self {
            segments: Vec::with_capacity(parts.len()),
        };
        for part in parts {
            parsed
                .push(part)
                .map_err(|_| StoreError::InvalidPath(path.to_string()))?;
        }
        Ok(parsed)
    }

    fn push(&mut self, segment: &str) -> Result<(), StoreError> {
        if segment.is_empty() || segment.contains('/') || segment == "." || segment == ".." {
            return Err(StoreError::InvalidPath(format!(
                "{}/{}",
                self.segments.join("/"),
                segment
            )));
        }
        self.segments.push(segment.to_string());
        Ok(())
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("/"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Replace the whole document
    Replace,
    /// Overwrite only the top-level fields present in the write
    Merge,
}

/// Field payload for one write
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Document {
    pub fields: Map<String, Value>,
    /// Top-level fields the store fills with its own write time
    pub server_timestamps: Vec<String>,
}

impl Document {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self {
            fields,
            server_timestamps: Vec::new(),
        }
    }

    /// Serialize a value that must encode to a JSON object
    pub fn from_serializable<T: Serialize>(value: &T) -> Result<Self, StoreError> {
        match serde_json::to_value(value)? {
            Value::Object(fields) => Ok(Self::new(fields)),
            other => Err(StoreError::Encode(<serde_json::Error as serde::ser::Error>::custom(
                format!("document must be a JSON object, got {}", json_kind(&other)),
            ))),
        }
    }

    pub fn with_server_timestamp(mut self, field: impl Into<String>) -> Self {
        self.server_timestamps.push(field.into());
        self
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Key-addressed document persistence
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn write(
        &self,
        path: &DocumentPath,
        document: Document,
        mode: WriteMode,
    ) -> Result<(), StoreError>;
}

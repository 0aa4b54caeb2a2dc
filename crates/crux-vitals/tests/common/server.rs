//! Local mock HTTP server

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::Router;
use serde_json::Value;
use std::sync::{Arc, Mutex};

/// A request the mock server received
#[derive(Debug, Clone)]
pub struct Captured {
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Value,
}

impl Captured {
    /// Path plus method suffix, e.g. `/v1/records:queryRecord`
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    pub fn query(&self) -> &str {
        self.uri.query().unwrap_or_default()
    }
}

#[derive(Clone)]
struct Shared {
    reply: (StatusCode, String),
    captured: Arc<Mutex<Vec<Captured>>>,
}

/// Serves one canned reply to every request and records what it received
pub struct MockServer {
    pub base_url: String,
    captured: Arc<Mutex<Vec<Captured>>>,
}

#[allow(dead_code)]
impl MockServer {
    pub async fn start(status: u16, body: impl Into<String>) -> Self {
        let captured = Arc::new(Mutex::new(Vec::new()));
        let shared = Shared {
            reply: (StatusCode::from_u16(status).unwrap(), body.into()),
            captured: captured.clone(),
        };

        // Colons in method paths (`records:queryRecord`) are matched by the
        // fallback, not by a route.
        let app = Router::new().fallback(record_request).with_state(shared);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            captured,
        }
    }

    pub fn requests(&self) -> Vec<Captured> {
        self.captured.lock().unwrap().clone()
    }
}

async fn record_request(
    State(shared): State<Shared>,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, String) {
    let body = serde_json::from_str(&body).unwrap_or(Value::Null);
    shared
        .captured
        .lock()
        .unwrap()
        .push(Captured { uri, headers, body });
    shared.reply.clone()
}

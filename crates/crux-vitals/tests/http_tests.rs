//! CrUX client and Firestore store against a local HTTP server

#[path = "common/server.rs"]
mod server;

use crux_vitals::error::{CruxError, StoreError};
use crux_vitals::record::FormFactor;
use crux_vitals::store::{Document, DocumentPath, DocumentStore, WriteMode};
use crux_vitals::{CruxClient, FieldDataSource, FirestoreStore};
use pretty_assertions::assert_eq;
use serde_json::json;
use server::MockServer;
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(5);

fn client(server: &MockServer) -> CruxClient {
    CruxClient::with_endpoint(format!("{}/v1/records/", server.base_url), "test-key", TIMEOUT)
        .unwrap()
}

// ============================================================================
// CrUX client
// ============================================================================

#[tokio::test]
async fn test_query_record_decodes_response() {
    let body = json!({
        "record": {
            "key": { "origin": "https://example.com", "formFactor": "PHONE" },
            "metrics": {
                "largest_contentful_paint": {
                    "histogram": [
                        { "start": 0, "end": 2500, "density": 0.8 },
                        { "start": 2500, "end": 4000, "density": 0.15 },
                        { "start": 4000, "density": 0.05 }
                    ],
                    "percentiles": { "p75": 2100 }
                },
                "cumulative_layout_shift": {
                    "histogram": [{ "start": "0.00", "end": "0.10", "density": 1.0 }],
                    "percentiles": { "p75": "0.03" }
                }
            },
            "collectionPeriod": {
                "firstDate": { "year": 2024, "month": 4, "day": 7 },
                "lastDate": { "year": 2024, "month": 5, "day": 4 }
            }
        }
    });
    let server = MockServer::start(200, body.to_string()).await;

    let record = client(&server)
        .query_record("https://example.com", FormFactor::Phone, None)
        .await
        .unwrap();

    assert_eq!(record.collection_period.last_date.to_string(), "2024-05-04");
    assert_eq!(record.metrics["largest_contentful_paint"].p75(), Some(2100.0));
    assert_eq!(record.metrics["cumulative_layout_shift"].p75(), Some(0.03));

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].path(), "/v1/records:queryRecord");
    assert_eq!(requests[0].query(), "key=test-key");
    assert_eq!(
        requests[0].body,
        json!({ "origin": "https://example.com", "formFactor": "PHONE" })
    );
}

#[tokio::test]
async fn test_query_history_sends_window_count() {
    let body = json!({
        "record": {
            "key": { "origin": "https://example.com" },
            "metrics": {
                "largest_contentful_paint": {
                    "histogramTimeseries": [
                        { "start": 0, "end": 2500, "densities": [0.7, "NaN"] },
                        { "start": 2500, "densities": [0.3, "NaN"] }
                    ],
                    "percentilesTimeseries": { "p75s": [2000, null] }
                }
            },
            "collectionPeriods": [
                {
                    "firstDate": { "year": 2024, "month": 1, "day": 1 },
                    "lastDate": { "year": 2024, "month": 1, "day": 28 }
                },
                {
                    "firstDate": { "year": 2024, "month": 1, "day": 8 },
                    "lastDate": { "year": 2024, "month": 2, "day": 4 }
                }
            ]
        }
    });
    let server = MockServer::start(200, body.to_string()).await;
    let metrics = vec!["largest_contentful_paint".to_string()];

    let history = client(&server)
        .query_history("https://example.com", FormFactor::All, &metrics, 90)
        .await
        .unwrap();

    assert_eq!(history.aligned_len(), 2);
    let lcp = &history.metrics["largest_contentful_paint"];
    assert_eq!(lcp.p75_at(0), Some(2000.0));
    assert_eq!(lcp.p75_at(1), None);

    let requests = server.requests();
    assert_eq!(requests[0].path(), "/v1/records:queryHistoryRecord");
    assert_eq!(
        requests[0].body,
        json!({
            "origin": "https://example.com",
            "metrics": ["largest_contentful_paint"],
            "collectionPeriodCount": 40
        })
    );
}

#[tokio::test]
async fn test_not_found_is_reported_distinctly() {
    let server = MockServer::start(
        404,
        json!({ "error": { "code": 404, "message": "chrome ux report data not found" } }).to_string(),
    )
    .await;

    let err = client(&server)
        .query_record("https://nodata.dev", FormFactor::Desktop, None)
        .await
        .unwrap_err();

    assert!(err.is_not_found());
    match err {
        CruxError::NotFound {
            origin,
            form_factor,
        } => {
            assert_eq!(origin, "https://nodata.dev");
            assert_eq!(form_factor, "desktop");
        }
        other => panic!("expected NotFound, got {:?}", other),
    }
}

#[tokio::test]
async fn test_other_statuses_keep_body() {
    let server = MockServer::start(400, "API key not valid").await;

    let err = client(&server)
        .query_record("https://example.com", FormFactor::All, None)
        .await
        .unwrap_err();

    assert!(!err.is_not_found());
    match err {
        CruxError::Api { status, body } => {
            assert_eq!(status, 400);
            assert_eq!(body, "API key not valid");
        }
        other => panic!("expected Api, got {:?}", other),
    }
}

#[tokio::test]
async fn test_malformed_body_is_a_decode_error() {
    let server = MockServer::start(200, "{\"record\": 3}").await;

    let err = client(&server)
        .query_record("https://example.com", FormFactor::All, None)
        .await
        .unwrap_err();

    assert!(matches!(err, CruxError::Decode(_)));
}

// ============================================================================
// Firestore store
// ============================================================================

fn firestore(server: &MockServer) -> FirestoreStore {
    FirestoreStore::with_base_url(&server.base_url, "demo-project", "secret-token", TIMEOUT)
        .unwrap()
}

#[tokio::test]
async fn test_firestore_commit_request() {
    let server = MockServer::start(200, "{}").await;
    let store = firestore(&server);
    let path = DocumentPath::parse("metrics/abc/daily-crux/2024-05-04_all").unwrap();
    let document = Document::from_serializable(&json!({ "url": "https://example.com", "n": 2 }))
        .unwrap()
        .with_server_timestamp("fetchedAt");

    store.write(&path, document, WriteMode::Replace).await.unwrap();

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0].path(),
        "/projects/demo-project/databases/(default)/documents:commit"
    );
    assert_eq!(
        requests[0].headers["authorization"].to_str().unwrap(),
        "Bearer secret-token"
    );
    assert_eq!(
        requests[0].body,
        json!({
            "writes": [{
                "update": {
                    "name": "projects/demo-project/databases/(default)/documents/metrics/abc/daily-crux/2024-05-04_all",
                    "fields": {
                        "n": { "integerValue": "2" },
                        "url": { "stringValue": "https://example.com" }
                    }
                },
                "updateTransforms": [
                    { "fieldPath": "fetchedAt", "setToServerValue": "REQUEST_TIME" }
                ]
            }]
        })
    );
}

#[tokio::test]
async fn test_firestore_rejection_is_an_error() {
    let server = MockServer::start(403, "PERMISSION_DENIED").await;
    let store = firestore(&server);
    let path = DocumentPath::new("metrics", "abc").unwrap();
    let document = Document::from_serializable(&json!({ "origin": true })).unwrap();

    let err = store
        .write(&path, document, WriteMode::Merge)
        .await
        .unwrap_err();

    match err {
        StoreError::Rejected { path, status, body } => {
            assert_eq!(path, "metrics/abc");
            assert_eq!(status, 403);
            assert_eq!(body, "PERMISSION_DENIED");
        }
        other => panic!("expected Rejected, got {:?}", other),
    }
}

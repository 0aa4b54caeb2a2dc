//! CrUX ingestion job
//!
//! Runs one ingestion for one site and exits:
//! - Resolves the site's origin against the CrUX API
//! - Fetches the latest window per form factor, or the weekly history
//! - Writes one snapshot per window below the target document
//!
//! The report is printed to stdout as JSON; logs go to stderr. Any fatal
//! error exits non-zero.

use anyhow::{Context, Result};
use crux_vitals::config::Config;
use crux_vitals::{
    CruxClient, DocumentStore, FirestoreStore, IngestReport, Ingestor, MemoryStore, StoreBackend,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    init_tracing();

    let config = Config::load()?;
    config.validate()?;

    info!(
        mode = %config.job.mode,
        origin = %config.job.origin,
        target = %config.job.target_doc_id,
        backend = ?config.store.backend,
        "Starting CrUX ingestion"
    );

    let client = CruxClient::with_endpoint(
        &config.api.endpoint,
        config.api.key.expose(),
        config.api.timeout(),
    )
    .context("Failed to build CrUX client")?;

    let report = match config.store.backend {
        StoreBackend::Firestore => {
            let store = FirestoreStore::new(
                config.store.project_id.as_deref().unwrap_or_default(),
                config
                    .store
                    .access_token
                    .as_ref()
                    .map(|t| t.expose())
                    .unwrap_or_default(),
                config.api.timeout(),
            )
            .context("Failed to build Firestore client")?;
            run(&config, &client, &store).await?
        }
        StoreBackend::Memory => {
            let store = MemoryStore::new();
            let report = run(&config, &client, &store).await?;
            info!(documents = store.len().await, "Dry run, nothing persisted");
            report
        }
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn run<D: DocumentStore>(
    config: &Config,
    client: &CruxClient,
    store: &D,
) -> Result<IngestReport> {
    let report = Ingestor::new(client, store, &config.job)
        .with_root_collection(&config.store.root_collection)
        .run()
        .await?;

    info!(
        origin = %report.origin,
        written = report.written.len(),
        skipped = report.skipped.len(),
        duration_ms = report.duration_ms,
        "Ingestion complete"
    );
    Ok(report)
}

/// Used when `RUST_LOG` is unset, empty or unparsable
const DEFAULT_FILTER: &str = "crux_ingest=info,crux_vitals=info";

/// `RUST_LOG` directives win outright; the defaults only fill in when it is
/// absent
fn env_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .filter(|d| !d.trim().is_empty())
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
}

/// Human-readable logs by default, JSON lines with `LOG_FORMAT=json`
fn init_tracing() {
    let directives = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = env_filter(directives.as_deref());

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

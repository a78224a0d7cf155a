//! Minimal socket ingest demo
//!
//! Listens on port 9001 (override with `KV_INGEST_PORT`) and dispatches every
//! line as an `INSERT_KV` invocation against an in-memory engine. Try it
//! with:
//!
//! ```text
//! cargo run -p virta-importer --example kv_ingest
//! printf 'abc,123\n' | nc 127.0.0.1 9001
//! ```

use std::sync::Arc;
use tokio::signal;
use tracing::info;
use virta_core::{ExecutionEngine, MemoryEngine, MemoryStatsCollector, StatsCollector};
use virta_importer::{EndpointSpec, SocketImporter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let port: u16 = std::env::var("KV_INGEST_PORT")
        .unwrap_or_else(|_| "9001".to_string())
        .parse()?;

    let engine = Arc::new(MemoryEngine::new());
    engine.add_table("KV");
    let stats = Arc::new(MemoryStatsCollector::new());

    let importer = SocketImporter::new(virta_importer::ServerAdapter::new(
        Arc::clone(&engine) as Arc<dyn ExecutionEngine>,
        Arc::clone(&stats) as Arc<dyn StatsCollector>,
    ));
    let port = importer
        .configure("kv", EndpointSpec::new(port, "INSERT_KV"))
        .await?;
    importer.ready_for_data("kv").await?;
    info!(port, "Push newline-delimited records, Ctrl+C to stop");

    shutdown_signal().await;
    importer.stop().await;

    info!(
        invoked = engine.call_count(),
        queued = stats.queued_count("INSERT_KV"),
        failed = stats.failure_count("INSERT_KV"),
        "Session totals"
    );
    Ok(())
}

/// Wait for SIGINT (Ctrl+C) or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = ?e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = ?e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}

//! ActiveStream
//!
//! Streams documents matching tracked keywords, asks a human oracle to
//! label the ones the model is least sure about, and retrains a relevance
//! classifier as labels arrive.

use activestream_core::MemoryStore;
use activestream_server::{create_router, AppConfig, AppState, Cli, Pipeline};
use anyhow::{Context, Result};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusHandle;
use std::net::SocketAddr;
use tokio::signal;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    info!("Starting ActiveStream");

    let config = AppConfig::load(&cli)?;
    config.validate()?;
    info!(
        keywords = ?config.keywords,
        replay = ?config.ingest.replay_file,
        "Configuration loaded"
    );

    let metrics_handle = init_metrics()?;

    let addr: SocketAddr = format!("{}:{}", config.server.listen, config.server.port)
        .parse()
        .context("Invalid listen address")?;

    let pipeline = Pipeline::start(config, MemoryStore::shared())?;
    let state = AppState::new(pipeline.handle()).with_metrics(metrics_handle);
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Annotation channel listening on http://{}", addr);

    let stop = pipeline.stop_token();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { stop.cancelled().await })
            .await
    });

    let failed = pipeline.supervise(shutdown_signal()).await;

    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Server error: {}", e),
        Err(e) => error!("Server task failed: {}", e),
    }

    if failed > 0 {
        anyhow::bail!("{} worker(s) failed", failed);
    }
    info!("Shutdown complete");
    Ok(())
}

/// Listen for shutdown signals (SIGTERM, SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Initialize tracing/logging
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("activestream=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("activestream=info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Initialize metrics exporter and return handle for rendering
fn init_metrics() -> Result<PrometheusHandle> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install metrics: {}", e))?;

    metrics::describe_counter!(
        "activestream_records_ingested_total",
        "Records accepted from the stream, by origin"
    );
    metrics::describe_counter!(
        "activestream_records_filtered_total",
        "Stream items dropped by the inclusion filter"
    );
    metrics::describe_counter!(
        "activestream_missed_total",
        "Items the streaming API reported as not delivered"
    );
    metrics::describe_counter!(
        "activestream_reconnects_total",
        "Stream connections opened"
    );
    metrics::describe_counter!(
        "activestream_records_extracted_total",
        "Records converted to term bags and stored"
    );
    metrics::describe_gauge!("activestream_vocabulary_size", "Distinct terms seen");
    metrics::describe_counter!(
        "activestream_records_classified_total",
        "Records scored by the relevance model"
    );
    metrics::describe_histogram!(
        "activestream_classify_batch_latency_us",
        metrics::Unit::Microseconds,
        "Scoring latency per classification batch"
    );
    metrics::describe_counter!(
        "activestream_annotations_total",
        "Oracle verdicts committed, by verdict"
    );
    metrics::describe_counter!("activestream_retrains_total", "Models trained");
    metrics::describe_gauge!("activestream_model_version", "Version of the latest model");

    info!("Metrics exporter initialized");
    Ok(handle)
}

//! Switchyard Harvester
//!
//! Runs the harvest job on a fixed period against the configured target
//! source. Pass `--once` to run a single pass and exit.

use std::sync::Arc;
use switchyard_common::{
    config::AppConfig,
    embeddings::{create_embedder, ThrottledEmbedder},
    CancellationToken, VERSION,
};
use switchyard_harvester::{HarvestError, HarvestJob, HttpFeedSource, StateFile};
use switchyard_search::SourceRegistry;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        e
    })?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));
    if config.observability.json_logging {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }

    info!("Starting Switchyard Harvester v{}", VERSION);

    let feed_url = config
        .harvest
        .feed_url
        .clone()
        .ok_or_else(|| HarvestError::ConfigError("harvest.feed_url is not set".to_string()))?;

    // Initialize embedder
    let embedder = create_embedder(&config.embedding)?;
    let embedder = Arc::new(ThrottledEmbedder::new(
        embedder,
        config.embedding.requests_per_second,
        config.embedding.max_retries,
    ));
    info!(
        model = %config.embedding.model,
        provider = %config.embedding.provider,
        "Embedder initialized"
    );

    // Only the target source is needed here
    let target_config: Vec<_> = config
        .enabled_sources()
        .filter(|s| s.name == config.harvest.target_source)
        .cloned()
        .collect();
    let registry = SourceRegistry::from_config(&target_config, embedder)?;
    let target = registry.require(&config.harvest.target_source)?;
    target.initialize().await?;

    let source = Arc::new(HttpFeedSource::new(feed_url, config.harvest.timeout_secs)?);
    let job = HarvestJob::new(
        source,
        target,
        StateFile::new(&config.harvest.state_path),
        config.harvest.solution_keywords.clone(),
    );

    if std::env::args().skip(1).any(|arg| arg == "--once") {
        match job.run_once().await {
            Ok(Some(report)) => {
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
            Ok(None) => warn!("Harvest already running"),
            Err(e) => {
                error!(error = %e, "Harvest run failed");
                return Err(e.into());
            }
        }
        return Ok(());
    }

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            shutdown.cancel();
        }
    });

    info!(
        interval_secs = config.harvest_interval().as_secs(),
        target = %config.harvest.target_source,
        "Harvester ready"
    );
    job.run(config.harvest_interval(), shutdown).await;

    info!("Harvester shutting down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
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

    info!("Shutdown signal received");
}

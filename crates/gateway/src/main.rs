//! Switchyard API Gateway
//!
//! HTTP surface over the agent router and the aggregation layer.
//! Handles:
//! - Answering (single-shot and Server-Sent Events)
//! - Aggregated search and classification for operators
//! - Rate limiting and request validation
//! - Observability (logging, request ids, Prometheus metrics)

mod handlers;
mod middleware;

use axum::{
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use switchyard_common::{
    config::AppConfig,
    context::{create_composer, EntityLookup, LookupTable, QueryClassifier},
    embeddings::{create_embedder, ThrottledEmbedder},
    metrics::{self, LATENCY_BUCKETS},
};
use switchyard_context::{Router as AgentRouter, RouterContext};
use switchyard_search::SourceRegistry;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::middleware::rate_limit::{create_rate_limiter, rate_limit_middleware};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub registry: SourceRegistry,
    pub router: Arc<AgentRouter>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        e
    })?;
    let config = Arc::new(config);

    // Initialize tracing
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

    info!("Starting Switchyard API Gateway v{}", switchyard_common::VERSION);

    // Initialize metrics
    install_metrics(config.observability.metrics_port)?;
    metrics::register_metrics();

    // Build sources, lookup, classifier and composer
    let state = build_state(config.clone()).await?;

    // Cold start: load stores and embed anything stale
    info!(sources = state.registry.len(), "Initializing knowledge sources...");
    for (source, e) in state.registry.initialize_all().await {
        error!(source = %source, error = %e, "Source failed to initialize");
    }

    // Build the router
    let app = create_router(state);

    // Start the server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Install the Prometheus exporter on its own port; 0 disables it
fn install_metrics(port: u16) -> anyhow::Result<()> {
    if port == 0 {
        info!("Metrics exporter disabled");
        return Ok(());
    }

    PrometheusBuilder::new()
        .with_http_listener(SocketAddr::from(([0, 0, 0, 0], port)))
        .set_buckets(LATENCY_BUCKETS)?
        .install()?;

    info!(port, "Metrics exporter listening");
    Ok(())
}

/// Wire the agent router from configuration
async fn build_state(config: Arc<AppConfig>) -> anyhow::Result<AppState> {
    let embedder = create_embedder(&config.embedding)?;
    let embedder = Arc::new(ThrottledEmbedder::new(
        embedder,
        config.embedding.requests_per_second,
        config.embedding.max_retries,
    ));
    info!(
        provider = %config.embedding.provider,
        model = %config.embedding.model,
        "Embedder initialized"
    );

    let sources: Vec<_> = config.enabled_sources().cloned().collect();
    let registry = SourceRegistry::from_config(&sources, embedder)?;

    let lookup: Arc<dyn EntityLookup> = match &config.lookup.path {
        Some(path) => Arc::new(LookupTable::load(path).await?),
        None => {
            warn!("lookup.path not set, specialist answers are unavailable");
            Arc::new(LookupTable::new())
        }
    };

    let ctx = RouterContext {
        registry: registry.clone(),
        lookup,
        classifier: Arc::new(QueryClassifier::new(&config.classifier)?),
        composer: create_composer(&config.composer)?,
        aggregation: config.aggregation.clone(),
    };
    info!(composer = %ctx.composer.name(), "Agent router ready");

    Ok(AppState {
        config,
        registry,
        router: Arc::new(AgentRouter::new(ctx)),
    })
}

/// Answers 408 when a handler has not produced response headers in time.
/// Streamed bodies are not cut once the headers are out.
fn request_timeout_layer(config: &AppConfig) -> TimeoutLayer {
    TimeoutLayer::new(config.request_timeout())
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    let timeout = request_timeout_layer(&state.config);

    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    // API routes
    let mut api_routes = Router::new()
        // Health endpoints
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))

        // Answer endpoints
        .route("/ask", post(handlers::ask::ask))
        .route("/ask/stream", post(handlers::ask::ask_stream))

        // Operator endpoints
        .route("/search", post(handlers::search::search))
        .route("/classify", post(handlers::classify::classify));

    let limits = &state.config.rate_limit;
    if limits.enabled {
        let limiter = create_rate_limiter(limits.requests_per_second, limits.burst);
        api_routes = api_routes.layer(axum::middleware::from_fn_with_state(
            limiter,
            rate_limit_middleware,
        ));
    }

    // Compose the app
    Router::new()
        .nest("/v1", api_routes)
        .layer(timeout)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(propagate_id)
        .layer(request_id)
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
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
                error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}

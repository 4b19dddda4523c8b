//! ragstream Gateway
//!
//! Serves retrieval-augmented answers over WebSocket.
//! Handles:
//! - The query socket at `/` (one text frame per query, answers end with `[END]`)
//! - Liveness and readiness probes
//! - Observability (logging, metrics)

mod handlers;

use axum::{routing::get, Router};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use ragstream_common::{
    config::AppConfig,
    context::{ContextAssemblerConfig, PromptBuilder, PromptTemplate},
    corpus,
    db::{DbPool, Repository},
    embeddings::create_embedder,
    errors::{AppError, Result},
    generation::{create_generator, GenerationParams},
    metrics::{self, FIRST_FRAGMENT_BUCKETS, METRICS_PREFIX, QUERY_BUCKETS, RETRIEVAL_BUCKETS},
    pipeline::{QuerySession, SessionLimits},
    retrieval::{MemoryIndex, PgVectorIndex, VectorIndex},
    telemetry,
};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::signal;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::info;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub session: Arc<QuerySession>,
    pub index: Arc<dyn VectorIndex>,
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load()?;

    // Initialize tracing
    telemetry::init_tracing(&config.observability);
    info!("Starting ragstream gateway v{}", ragstream_common::VERSION);

    let config = Arc::new(config);

    // Initialize metrics
    if config.observability.metrics_port != 0 {
        install_metrics_exporter(config.observability.metrics_port)?;
    }
    metrics::register_metrics();

    // Build the query pipeline
    let embedder = create_embedder(&config.embedding)?;
    let index = build_index(&config, embedder).await?;
    let session = Arc::new(build_session(&config, index.clone()).await?);

    let state = AppState {
        config: config.clone(),
        session,
        index,
    };

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

/// Prometheus scrape endpoint with latency buckets for the query path
fn install_metrics_exporter(port: u16) -> std::result::Result<(), Box<dyn std::error::Error>> {
    PrometheusBuilder::new()
        .with_http_listener(SocketAddr::from(([0, 0, 0, 0], port)))
        .set_buckets_for_metric(
            Matcher::Full(format!("{}_query_duration_seconds", METRICS_PREFIX)),
            QUERY_BUCKETS,
        )?
        .set_buckets_for_metric(
            Matcher::Full(format!("{}_first_fragment_seconds", METRICS_PREFIX)),
            FIRST_FRAGMENT_BUCKETS,
        )?
        .set_buckets_for_metric(
            Matcher::Full(format!("{}_retrieval_duration_seconds", METRICS_PREFIX)),
            RETRIEVAL_BUCKETS,
        )?
        .install()?;

    info!(port, "Metrics exporter listening");
    Ok(())
}

/// Vector index for the configured backend
async fn build_index(
    config: &AppConfig,
    embedder: Arc<dyn ragstream_common::Embedder>,
) -> Result<Arc<dyn VectorIndex>> {
    match config.retrieval.backend.as_str() {
        "pgvector" => {
            let pool = DbPool::new(&config.database).await?;
            Ok(Arc::new(PgVectorIndex::new(Repository::new(pool), embedder)))
        }
        "memory" => {
            let records = corpus::load_corpus(Path::new(&config.retrieval.corpus_path)).await?;
            let index = MemoryIndex::build(records, embedder).await?;
            info!(passages = index.len(), "In-memory index built");
            Ok(Arc::new(index))
        }
        other => Err(AppError::Configuration {
            message: format!("Unknown retrieval backend: {}", other),
        }),
    }
}

/// Query session with its prompt template, generator and limits
async fn build_session(config: &AppConfig, index: Arc<dyn VectorIndex>) -> Result<QuerySession> {
    let template = match &config.prompt.template_path {
        Some(path) => PromptTemplate::from_file(Path::new(path)).await?,
        None => PromptTemplate::builtin()?,
    };
    let generator = create_generator(&config.generation)?;
    info!(
        provider = generator.provider(),
        model = %config.generation.model,
        "Generator ready"
    );

    Ok(QuerySession::new(
        index,
        generator,
        PromptBuilder::new(template),
        GenerationParams::from(&config.generation),
        SessionLimits::from(config),
    )
    .with_assembler(ContextAssemblerConfig::from_max_chars(
        config.retrieval.max_context_chars,
    )))
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    Router::new()
        .route("/", get(handlers::ws::ws_upgrade))
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .layer(TraceLayer::new_for_http())
        .layer(propagate_id)
        .layer(request_id)
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
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

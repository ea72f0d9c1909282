//! docmind API gateway
//!
//! The HTTP surface of the query engine. Handles:
//! - Request routing and validation
//! - Rate limiting
//! - Observability (logging, metrics, request ids)
//!
//! All pipeline services are wired once at startup and shared through
//! [`AppState`]; handlers stay thin over the engine crate.

mod handlers;
mod middleware;

use axum::{
    routing::{delete, get, post},
    Router,
};
use docmind_common::{
    config::AppConfig,
    db::{DbPool, Repository},
    embeddings::create_embedder,
    llm::create_completion_client,
    metrics,
};
use docmind_engine::{
    AdmissionRegistry, EngineOptions, EngineParts, EvaluationRecorder, QueryEngine, QueryMemory,
    Synthesizer,
};
use docmind_retrieval::{GraphIndex, GraphRetriever, VectorRetriever};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: DbPool,
    pub engine: Arc<QueryEngine>,
    pub memory: Arc<QueryMemory>,
    pub recorder: Arc<EvaluationRecorder>,
    pub graph: Arc<GraphIndex>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load().map_err(|e| anyhow::anyhow!("failed to load config: {e}"))?;

    init_tracing(&config);

    info!("Starting docmind gateway v{}", docmind_common::VERSION);

    // Initialize metrics
    metrics::register_metrics();
    let metrics_handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("failed to install metrics recorder: {e}"))?;

    let config = Arc::new(config);

    // Initialize database connection
    info!("Connecting to database...");
    let db = DbPool::new(&config.database).await?;
    if config.database.run_migrations {
        db.run_migrations().await?;
    }

    let repo = Arc::new(Repository::new(db.clone()));

    // Model clients
    let embedder = create_embedder(&config.embedding)?;
    let completion = create_completion_client(&config.llm)?;

    let graph_index = load_graph_snapshot(&config, &repo).await;

    // Pipeline services
    let memory = Arc::new(QueryMemory::new(
        repo.clone(),
        config.memory.similarity_threshold,
    ));
    let admission = Arc::new(AdmissionRegistry::new(
        config.memory.admission_policy,
        config.memory.similarity_threshold,
    ));
    let recorder = Arc::new(EvaluationRecorder::new(
        repo.clone(),
        config.eval.relevance_threshold,
    ));

    let engine = QueryEngine::new(
        EngineParts {
            embedder,
            memory: memory.clone(),
            admission,
            vector: VectorRetriever::new(repo.clone()),
            graph: GraphRetriever::new(
                graph_index.clone(),
                config.graph.top_entities,
                config.graph.top_communities,
                config.retrieval.graph_chunk_limit,
            ),
            synthesizer: Synthesizer::new(completion),
            recorder: recorder.clone(),
        },
        EngineOptions::from_config(&config),
    );

    // Create app state
    let state = AppState {
        config: config.clone(),
        db,
        engine: Arc::new(engine),
        memory,
        recorder,
        graph: graph_index,
    };

    // Build the router
    let app = create_router(state, metrics_handle);

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

/// Initialize the tracing subscriber from observability settings.
///
/// `RUST_LOG` wins over the configured level when set.
fn init_tracing(config: &AppConfig) {
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
}

/// Load the graph snapshot, degrading to an empty index when the graph
/// tables are unavailable or graph enhancement is disabled.
async fn load_graph_snapshot(config: &AppConfig, repo: &Repository) -> Arc<GraphIndex> {
    if !config.graph.enabled {
        info!("Graph enhancement disabled by configuration");
        return Arc::new(GraphIndex::empty());
    }

    match GraphIndex::load(repo).await {
        Ok(index) => Arc::new(index),
        Err(e) => {
            tracing::warn!(error = %e, "Graph snapshot unavailable, continuing without it");
            Arc::new(GraphIndex::empty())
        }
    }
}

/// Create the main application router
fn create_router(state: AppState, metrics_handle: PrometheusHandle) -> Router {
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
        // Query pipeline
        .route("/query", post(handlers::query::run_query))
        // Feedback
        .route("/feedback", post(handlers::feedback::submit_feedback))
        .route(
            "/feedback/favorites/list",
            get(handlers::feedback::list_favorites),
        )
        .route("/feedback/{memory_id}", get(handlers::feedback::get_feedback))
        .route(
            "/feedback/{memory_id}",
            delete(handlers::feedback::remove_feedback),
        )
        // Retrieval evaluation
        .route(
            "/retrieval/eval/summary",
            get(handlers::eval::retrieval_summary),
        )
        .route(
            "/retrieval/eval/query/{memory_id}",
            get(handlers::eval::query_judgments),
        )
        // Memory administration
        .route("/memory/stats", get(handlers::memory::memory_stats))
        .route("/memory/clear", delete(handlers::memory::clear_memory))
        // Chunk quality
        .route(
            "/chunks/quality/summary",
            get(handlers::eval::chunk_quality_summary),
        );

    // Probes and the metrics endpoint stay outside the rate limit
    if state.config.rate_limit.enabled {
        let limiter = middleware::rate_limit::create_rate_limiter(
            state.config.rate_limit.requests_per_second,
            state.config.rate_limit.burst,
        );
        let limit = state.config.rate_limit.requests_per_second;
        api_routes = api_routes.layer(axum::middleware::from_fn(
            move |request: axum::extract::Request, next: axum::middleware::Next| {
                let limiter = limiter.clone();
                async move {
                    middleware::rate_limit::rate_limit(request, next, limiter, limit).await
                }
            },
        ));
    }

    // Compose the app
    Router::new()
        .nest("/api", api_routes)
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .route(
            "/metrics",
            get(move || async move { metrics_handle.render() }),
        )
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(request_id)
                .layer(propagate_id)
                .layer(axum::middleware::from_fn(middleware::telemetry::track_http)),
        )
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => tracing::error!(error = %e, "Failed to install signal handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}

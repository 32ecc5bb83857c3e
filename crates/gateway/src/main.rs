//! HybridQA API Gateway
//!
//! The main entry point for knowledge-chat requests.
//! Handles:
//! - Knowledge space resolution and retrieval setup
//! - Graph + document retrieval and context fusion
//! - Answer generation with inline references
//! - Rate limiting and observability (logging, metrics, tracing)

mod handlers;
mod knowledge;
mod middleware;

use axum::{
    routing::{get, post},
    Router,
};
use hybridqa_common::{
    config::AppConfig,
    db::{DbPool, Repository},
    embeddings::{create_embedder, Embedder},
    llm::ChatClient,
    metrics,
};
use hybridqa_search::graph::{GraphStore, Neo4jStore};
use hybridqa_search::retrieval::{HttpReranker, QueryRewriter, Reranker, RepositoryChunkLookup};
use hybridqa_search::HybridPipeline;
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: DbPool,
    pub repo: Repository,
    pub embedder: Arc<dyn Embedder>,
    pub llm: Arc<ChatClient>,
    pub rewriter: Option<Arc<dyn QueryRewriter>>,
    pub reranker: Option<Arc<dyn Reranker>>,
    pub graph: Option<Arc<Neo4jStore>>,
    pub pipeline: Arc<HybridPipeline>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Arc::new(AppConfig::load()?);

    // Initialize tracing; RUST_LOG wins over the configured level
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

    info!(
        service = %config.observability.service_name,
        "Starting HybridQA API Gateway v{}",
        hybridqa_common::VERSION
    );

    // Initialize metrics
    if config.observability.metrics_port > 0 {
        let metrics_addr = SocketAddr::from(([0, 0, 0, 0], config.observability.metrics_port));
        PrometheusBuilder::new()
            .with_http_listener(metrics_addr)
            .set_buckets_for_metric(
                Matcher::Suffix("turn_duration_seconds".to_string()),
                metrics::TURN_BUCKETS,
            )?
            .install()?;
        info!("Metrics exporter listening on {}", metrics_addr);
    }
    metrics::register_metrics();

    // Initialize database connection
    let db = DbPool::new(&config.database).await?;
    let repo = Repository::new(db.clone());

    // Model services
    let embedder = create_embedder(&config.embedding)?;
    let llm = Arc::new(ChatClient::new(config.llm.clone())?);

    let rewriter = knowledge::build_rewriter(&config, llm.clone());

    let reranker: Option<Arc<dyn Reranker>> = HttpReranker::from_config(&config.rerank)?
        .map(|r| Arc::new(r) as Arc<dyn Reranker>);

    // Graph store
    let graph = if config.graph.enabled {
        Some(Arc::new(Neo4jStore::connect(&config.graph).await?))
    } else {
        warn!("Graph store disabled by configuration");
        None
    };

    let pipeline = HybridPipeline::new(
        graph.clone().map(|g| g as Arc<dyn GraphStore>),
        Arc::new(RepositoryChunkLookup::new(repo.clone())),
        config.retrieval.graph_result_limit,
    )
    .with_max_concurrency(config.retrieval.max_concurrency);

    info!(
        rerank = reranker.is_some(),
        query_rewrite = rewriter.is_some(),
        graph = graph.is_some(),
        "Retrieval pipeline ready"
    );

    // Create app state
    let state = AppState {
        config: config.clone(),
        db,
        repo,
        embedder,
        llm,
        rewriter,
        reranker,
        graph,
        pipeline: Arc::new(pipeline),
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

/// Create the main application router
fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    let mut api_routes = Router::new()
        .route("/chat/knowledge", post(handlers::chat::knowledge_chat));

    if state.config.rate_limit.enabled {
        let limiter = middleware::rate_limit::create_rate_limiter(
            state.config.rate_limit.requests_per_second,
            state.config.rate_limit.burst,
        );
        api_routes = api_routes.layer(axum::middleware::from_fn(move |request: axum::extract::Request, next: axum::middleware::Next| {
            middleware::rate_limit::rate_limit_middleware(request, next, limiter.clone())
        }));
    }

    // Compose the app
    Router::new()
        // Health endpoints (no rate limit)
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .nest("/v1", api_routes)
        .layer(TimeoutLayer::new(state.config.request_timeout()))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(request_id)
        .layer(propagate_id)
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
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
                warn!(error = %e, "Failed to install SIGTERM handler");
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

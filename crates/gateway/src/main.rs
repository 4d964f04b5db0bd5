//! TacForge API Gateway
//!
//! Entry point for all external API requests. Hosts:
//! - OPORD endpoints and the task read endpoints
//! - The recognition engine
//! - The background analysis worker
//! - Observability (logging, metrics)

mod handlers;
mod services;

use axum::{
    routing::{get, post, put},
    Router,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use services::recognition::RecognitionService;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tacforge_common::{
    config::AppConfig,
    db::Repository,
    embeddings::{create_embedder, EmbeddingGenerator},
    genai::{create_generator, TextGenerator},
    metrics,
    queue::{analysis_channel, AnalysisQueue},
    store::KnowledgeStore,
};
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Request timeout in seconds
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub repo: Repository,
    pub store: Arc<dyn KnowledgeStore>,
    pub embedder: EmbeddingGenerator,
    pub recognition: Arc<RecognitionService>,
    pub queue: AnalysisQueue,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load configuration
    dotenvy::dotenv().ok();
    let config = AppConfig::build()?;

    // 2. Setup logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.server.rust_log))
        .init();

    info!("Starting TacForge gateway v{}", tacforge_common::VERSION);

    // 3. Initialize metrics
    metrics::register_metrics();
    let metrics_handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install metrics recorder: {}", e))?;

    // 4. Initialize database
    info!("Connecting to database...");
    let repo = Repository::connect(&config.database).await?;
    let store: Arc<dyn KnowledgeStore> = Arc::new(repo.clone());

    // 5. Initialize AI capabilities
    let generator = create_generator(&config.genai);
    let embedder = EmbeddingGenerator::new(
        create_embedder(&config.genai),
        config.genai.embedding_dim,
    );
    info!(
        text_model = generator.model_name(),
        embedding_dim = embedder.dimension(),
        closed_vocabulary = config.analysis.closed_vocabulary,
        "AI capabilities initialized"
    );

    let recognition = Arc::new(RecognitionService::new(
        generator,
        store.clone(),
        config.analysis.closed_vocabulary,
    ));

    // 6. Start the background analysis worker
    let (queue, rx) = analysis_channel();
    tokio::spawn(services::analysis::run_worker(
        rx,
        recognition.clone(),
        repo.clone(),
    ));

    let state = AppState {
        repo,
        store,
        embedder,
        recognition,
        queue,
    };

    // 7. Build router and serve
    let app = create_router(state, metrics_handle);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Create the main application router
fn create_router(
    state: AppState,
    metrics_handle: metrics_exporter_prometheus::PrometheusHandle,
) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/analyze", post(handlers::analyze::analyze_text))
        .route("/tasks", get(handlers::tasks::list_tasks))
        .route("/tasks/search", get(handlers::tasks::search_tasks))
        .route("/tasks/{name}", get(handlers::tasks::get_task))
        .route("/opords", post(handlers::opords::create_opord))
        .route("/opords/{id}", get(handlers::opords::get_opord))
        .route("/opords/{id}", put(handlers::opords::update_opord));

    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .route(
            "/metrics",
            get(move || {
                let handle = metrics_handle.clone();
                async move { handle.render() }
            }),
        )
        .nest("/v1", api_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(Duration::from_secs(REQUEST_TIMEOUT_SECS)))
                .layer(cors)
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}

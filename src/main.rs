mod app_state;
mod config;
mod db;
mod models;
mod routes;
mod services;

use axum::{routing::get, routing::post, Router};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use app_state::AppState;
use config::AppConfig;
use db::JobRegistry;
use services::{engine::EngineClient, host::HostController, queue::JobQueue};
use std::time::Duration;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing gpu-dispatch orchestrator");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);

    // Register application metrics
    metrics::describe_counter!(
        "dispatch_jobs_submitted_total",
        "Total jobs accepted by the orchestrator"
    );
    metrics::describe_gauge!(
        "dispatch_queue_depth",
        "Visible messages waiting in the work queue"
    );

    // Initialize database connection pool
    tracing::info!("Connecting to PostgreSQL registry");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    // Run database migrations
    tracing::info!("Running database migrations");
    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run database migrations");

    let registry = JobRegistry::new(db_pool, config.registry_table.clone(), config.record_ttl);

    // Initialize Redis work queue
    tracing::info!("Connecting to Redis work queue");
    let queue = JobQueue::new(
        &config.queue_url,
        &config.queue_name,
        Duration::from_secs(config.visibility_timeout),
        config.max_receives,
    )
    .expect("Failed to initialize work queue");

    // Initialize host controller and engine client
    let host = HostController::new(&config.host_control_url, &config.host_id)
        .expect("Failed to initialize host controller");
    let engine = EngineClient::new(&config.engine_url).expect("Failed to initialize engine client");

    let bind_addr = config.bind_addr.clone();

    // Create shared application state
    let state = AppState::new(config, registry, queue, host, engine);

    // Build API routes
    let app = Router::new()
        .route("/", get(routes::service_info))
        .route("/health", get(routes::health::health_check))
        .route("/api/v1/health", get(routes::health::health_check))
        .route("/api/v1/jobs/:job_id", get(routes::jobs::get_job_status))
        .route("/api/v1/:job_type/jobs", post(routes::jobs::submit_job))
        .with_state(state)
        // Prometheus metrics endpoint (separate state)
        .route(
            "/metrics",
            get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(2 * 1024 * 1024)); // 2 MB limit

    tracing::info!("Starting gpu-dispatch orchestrator on {}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", bind_addr);

    axum::serve(listener, app).await.expect("Server error");
}

use gpu_dispatch::{
    app_state::AppState,
    config::AppConfig,
    db::{self, JobRegistry},
    services::{engine::EngineClient, host::HostController, queue::JobQueue},
    worker,
};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting dispatch worker adapter");

    // Load configuration
    let config = AppConfig::from_env().expect("Failed to load configuration");

    // Initialize registry
    tracing::info!("Connecting to PostgreSQL registry");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");
    let registry = JobRegistry::new(db_pool, config.registry_table.clone(), config.record_ttl);

    // Initialize services
    tracing::info!("Initializing services");
    let queue = JobQueue::new(
        &config.queue_url,
        &config.queue_name,
        Duration::from_secs(config.visibility_timeout),
        config.max_receives,
    )
    .expect("Failed to initialize work queue");

    let host = HostController::new(&config.host_control_url, &config.host_id)
        .expect("Failed to initialize host controller");

    let engine = EngineClient::new(&config.engine_url).expect("Failed to initialize engine client");

    // The engine may still be starting alongside us; never fatal.
    match engine.health_check().await {
        Ok(()) => tracing::info!("inference engine is healthy"),
        Err(e) => tracing::warn!(error = %e, "engine health check failed, will retry on actual jobs"),
    }

    let state = AppState::new(config, registry, queue, host, engine);

    tracing::info!("Worker ready, starting job processing loop");

    worker::run(state).await;

    tracing::info!("Worker stopped");
}

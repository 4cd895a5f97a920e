use gpu_dispatch::{
    config::AppConfig,
    idle,
    services::{host::HostController, queue::JobQueue},
};
use std::sync::Arc;
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

    tracing::info!("Starting idle-shutdown detector");

    // Load configuration
    let config = AppConfig::from_env().expect("Failed to load configuration");

    let queue = JobQueue::new(
        &config.queue_url,
        &config.queue_name,
        Duration::from_secs(config.visibility_timeout),
        config.max_receives,
    )
    .expect("Failed to initialize work queue");

    let host = HostController::new(&config.host_control_url, &config.host_id)
        .expect("Failed to initialize host controller");

    tracing::info!(
        sample_secs = config.idle_sample,
        periods = config.idle_periods,
        threshold = config.idle_threshold,
        "Idle detector ready, sampling queue depth"
    );

    idle::run(Arc::new(queue), Arc::new(host), &config).await;

    tracing::info!("Idle detector stopped");
}

use std::sync::Arc;

use crate::config::AppConfig;
use crate::db::JobRegistry;
use crate::services::{engine::EngineClient, host::HostController, queue::JobQueue};

/// Shared application state passed to all route handlers and to the
/// worker loop. Clients are injected here rather than reached through
/// globals.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub registry: JobRegistry,
    pub queue: Arc<JobQueue>,
    pub host: Arc<HostController>,
    pub engine: Arc<EngineClient>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        registry: JobRegistry,
        queue: JobQueue,
        host: HostController,
        engine: EngineClient,
    ) -> Self {
        Self {
            config: Arc::new(config),
            registry,
            queue: Arc::new(queue),
            host: Arc::new(host),
            engine: Arc::new(engine),
        }
    }
}

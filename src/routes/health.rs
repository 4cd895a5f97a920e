use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use crate::app_state::AppState;
use crate::models::api::{ComponentHealth, HealthResponse};

/// GET /health — liveness plus reachability of registry, queue, and host.
///
/// The host is reported but never fails the check: the GPU host is
/// expected to be stopped most of the time.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let registry = match state.registry.health_check().await {
        Ok(()) => "ok",
        Err(e) => {
            tracing::warn!(error = %e, "registry health check failed");
            "error"
        }
    };

    let queue = match state.queue.health_check().await {
        Ok(()) => "ok",
        Err(e) => {
            tracing::warn!(error = %e, "queue health check failed");
            "error"
        }
    };

    let host = match state.host.describe().await {
        Ok(_) => "ok",
        Err(_) => "unknown",
    };

    let all_healthy = registry == "ok" && queue == "ok";
    let status_code = if all_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: if all_healthy { "healthy" } else { "unhealthy" }.to_string(),
        components: ComponentHealth {
            registry: registry.to_string(),
            queue: queue.to_string(),
            host: host.to_string(),
        },
    };

    (status_code, Json(response))
}

use axum::Json;

pub mod health;
pub mod jobs;
pub mod metrics;

/// GET / — service information.
pub async fn service_info() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "service": "gpu-dispatch",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Cost-optimized async dispatch for GPU image-processing jobs",
        "endpoints": {
            "submit": "/api/v1/{camera-angle|qwen-image-edit|face-mask|full-face-swap}/jobs",
            "job_status": "/api/v1/jobs/{job_id}",
            "health": "/health"
        }
    }))
}

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::models::api::JobResponse;
use crate::models::job::{JobType, QueueMessage};

/// POST /api/v1/{job_type}/jobs — Submit an inference job.
///
/// The envelope is presence-checked only; field values pass through to the
/// engine uninterpreted. Client latency is bounded by the registry and
/// queue writes; the host wake happens off the request path.
pub async fn submit_job(
    State(state): State<AppState>,
    Path(job_type): Path<String>,
    Json(body): Json<serde_json::Value>,
) -> Result<(StatusCode, Json<JobResponse>), (StatusCode, String)> {
    let job_type: JobType = job_type
        .parse()
        .map_err(|_| (StatusCode::NOT_FOUND, format!("unknown job type: {job_type}")))?;

    let missing = job_type.missing_fields(&body);
    if !missing.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("missing required fields: {}", missing.join(", ")),
        ));
    }

    let job_id = Uuid::new_v4();

    // Record first: a queue message must never exist without a record.
    let record = state
        .registry
        .create_job(job_id, job_type, &body)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "registry write failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "registry unavailable".to_string(),
            )
        })?;

    let message = QueueMessage {
        job_id,
        job_type,
        request_body: body,
    };
    if let Err(e) = state.queue.enqueue(&message).await {
        tracing::error!(job_id = %job_id, error = %e, "enqueue failed");
        // Don't leak a pending record that no worker will ever see.
        if let Err(e2) = state.registry.fail_job(job_id, "enqueue failed").await {
            tracing::error!(job_id = %job_id, error = %e2, "failed to mark unqueued record failed");
        }
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            "queue unavailable".to_string(),
        ));
    }

    // Best-effort wake, off the client's latency path. A failure here is
    // recovered by the next submission.
    let host = state.host.clone();
    tokio::spawn(async move {
        if let Err(e) = host.start().await {
            tracing::warn!(error = %e, "host wake failed; a later submission will retry");
        }
    });

    metrics::counter!("dispatch_jobs_submitted_total", "job_type" => job_type.to_string())
        .increment(1);
    tracing::info!(job_id = %job_id, job_type = %job_type, "job created and queued");

    Ok((
        StatusCode::ACCEPTED,
        Json(JobResponse {
            job_id,
            status: record.status,
            result_url: record.result_url,
            error: record.error,
        }),
    ))
}

/// GET /api/v1/jobs/{job_id} — Report current job status.
pub async fn get_job_status(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<JobResponse>, (StatusCode, String)> {
    let record = state
        .registry
        .get_job(job_id)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "registry read failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "registry unavailable".to_string(),
            )
        })?
        .ok_or((StatusCode::NOT_FOUND, "job not found".to_string()))?;

    tracing::debug!(job_id = %job_id, status = %record.status, "job status retrieved");

    Ok(Json(JobResponse {
        job_id: record.job_id,
        status: record.status,
        result_url: record.result_url,
        error: record.error,
    }))
}

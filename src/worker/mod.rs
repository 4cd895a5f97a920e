//! Queue consumer for the GPU host.
//!
//! Single-threaded cooperative loop: receive one message, claim the job,
//! drive it through the local inference engine, commit the terminal state
//! to the registry, then acknowledge. At-least-once delivery with
//! idempotent completion: duplicate deliveries re-enter at the claim step
//! and the registry refuses to overwrite a terminal record.

use std::time::{Duration, Instant};
use tokio::time::sleep;

use crate::app_state::AppState;
use crate::models::job::JobStatus;
use crate::services::engine::{EngineError, EngineJobStatus};
use crate::services::queue::{Delivery, QueueError};

const ERROR_BACKOFF: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("registry error: {0}")]
    Registry(#[from] sqlx::Error),
}

/// Terminal result of driving one job through the engine.
#[derive(Debug, PartialEq)]
pub enum JobOutcome {
    Completed(String),
    Failed(String),
}

/// Map an engine status snapshot to a terminal outcome, if it is one.
/// Anything non-terminal (or unrecognized) means keep polling.
pub fn outcome_for(snapshot: &EngineJobStatus) -> Option<JobOutcome> {
    match snapshot.status.parse::<JobStatus>() {
        Ok(JobStatus::Completed) => Some(match &snapshot.result_url {
            Some(url) => JobOutcome::Completed(url.clone()),
            None => JobOutcome::Failed("engine completed without result_url".to_string()),
        }),
        Ok(JobStatus::Failed) => Some(JobOutcome::Failed(
            snapshot
                .error
                .clone()
                .unwrap_or_else(|| "unknown engine error".to_string()),
        )),
        _ => None,
    }
}

/// Main processing loop. Runs until ctrl-c; cancelling mid-job is safe
/// because nothing is acknowledged before the registry commit, so the
/// message is redelivered after its lease lapses.
pub async fn run(state: AppState) {
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("shutdown signal received, stopping worker loop");
                break;
            }
            result = process_next(&state) => match result {
                Ok(true) => tracing::debug!("job processed, checking for next job"),
                Ok(false) => tracing::trace!("no jobs available"),
                Err(e) => {
                    tracing::error!(error = %e, "error processing job, will retry");
                    sleep(ERROR_BACKOFF).await;
                }
            }
        }
    }
}

/// Process the next message from the queue.
/// Returns Ok(true) if a message was handled, Ok(false) if the long poll
/// came back empty.
pub async fn process_next(state: &AppState) -> Result<bool, WorkerError> {
    let config = &state.config;

    let delivery = state
        .queue
        .receive(Duration::from_secs(config.receive_wait))
        .await?;
    let Some(delivery) = delivery else {
        // Quiet queue: sweep records past their TTL.
        match state.registry.reap_expired_jobs().await {
            Ok(0) => {}
            Ok(reaped) => tracing::info!(reaped, "expired job records reaped"),
            Err(e) => tracing::warn!(error = %e, "record TTL sweep failed"),
        }
        return Ok(false);
    };

    let message = &delivery.message;
    let job_id = message.job_id;
    tracing::info!(
        job_id = %job_id,
        job_type = %message.job_type,
        receives = delivery.receives,
        "processing job"
    );

    // Idempotent skip: unknown or already-terminal jobs consume the
    // message without touching the engine.
    match state.registry.get_job(job_id).await? {
        None => {
            tracing::warn!(job_id = %job_id, "message for unknown job dropped");
            state.queue.ack(&delivery).await?;
            return Ok(true);
        }
        Some(record) if record.status.is_terminal() => {
            tracing::debug!(
                job_id = %job_id,
                status = %record.status,
                "job already terminal, dropping duplicate delivery"
            );
            state.queue.ack(&delivery).await?;
            return Ok(true);
        }
        Some(_) => {}
    }

    let Some(attempts) = state.registry.claim_job(job_id).await? else {
        // Lost the race against another terminal commit.
        state.queue.ack(&delivery).await?;
        return Ok(true);
    };
    tracing::info!(job_id = %job_id, attempts, "job claimed");

    let started = Instant::now();
    let engine_job_id = match state
        .engine
        .submit(message.job_type, &message.request_body)
        .await
    {
        Ok(id) => id,
        Err(EngineError::MalformedResponse(detail)) => {
            return commit_and_ack(state, &delivery, JobOutcome::Failed(detail)).await;
        }
        Err(e) => {
            // Transient: leave the message leased so the queue redelivers.
            tracing::warn!(
                job_id = %job_id,
                error = %e,
                "engine submit failed, leaving message for redelivery"
            );
            return Ok(true);
        }
    };
    tracing::info!(job_id = %job_id, engine_job_id = %engine_job_id, "submitted to engine");
    state
        .registry
        .set_worker_job_id(job_id, &engine_job_id)
        .await?;

    let outcome = poll_engine(state, &delivery, &engine_job_id).await;
    let handled = commit_and_ack(state, &delivery, outcome).await?;

    tracing::info!(
        job_id = %job_id,
        elapsed_s = started.elapsed().as_secs(),
        "job finished"
    );
    Ok(handled)
}

/// Poll the engine until it reports a terminal state or the job deadline
/// elapses, refreshing the visibility lease at a V/2 cadence so the
/// message is not redelivered under us.
async fn poll_engine(state: &AppState, delivery: &Delivery, engine_job_id: &str) -> JobOutcome {
    let config = &state.config;
    let deadline = Duration::from_secs(config.job_deadline);
    let poll_interval = Duration::from_secs(config.poll_interval);
    let visibility = Duration::from_secs(config.visibility_timeout);
    let extend_cadence = visibility / 2;

    let started = Instant::now();
    let mut last_extension = Instant::now();

    loop {
        if started.elapsed() >= deadline {
            return JobOutcome::Failed("deadline exceeded".to_string());
        }

        if last_extension.elapsed() >= extend_cadence {
            if let Err(e) = state.queue.extend_visibility(delivery, visibility).await {
                tracing::warn!(error = %e, "failed to extend visibility lease");
            }
            last_extension = Instant::now();
        }

        match state.engine.status(engine_job_id).await {
            Ok(snapshot) => {
                if let Some(outcome) = outcome_for(&snapshot) {
                    return outcome;
                }
                tracing::debug!(engine_job_id = %engine_job_id, status = %snapshot.status, "engine still working");
            }
            Err(e) => {
                tracing::warn!(
                    engine_job_id = %engine_job_id,
                    error = %e,
                    "engine status poll failed, retrying"
                );
            }
        }

        sleep(poll_interval).await;
    }
}

/// Write the terminal state, then acknowledge. The ack happens only after
/// the registry commit is durable; a registry failure here leaves the
/// message leased and the next delivery retries. The conditional commit
/// keeps the first terminal result when deliveries race.
async fn commit_and_ack(
    state: &AppState,
    delivery: &Delivery,
    outcome: JobOutcome,
) -> Result<bool, WorkerError> {
    let job_id = delivery.message.job_id;

    let committed = match &outcome {
        JobOutcome::Completed(result_url) => {
            state.registry.complete_job(job_id, result_url).await?
        }
        JobOutcome::Failed(error) => {
            tracing::warn!(job_id = %job_id, error = %error, "job failed");
            state.registry.fail_job(job_id, error).await?
        }
    };
    if !committed {
        tracing::debug!(job_id = %job_id, "record already terminal, result discarded");
    }

    state.queue.ack(delivery).await?;
    Ok(true)
}

use gpu_dispatch::{
    config::AppConfig,
    db::{self, JobRegistry},
    models::job::{JobStatus, JobType, QueueMessage},
    services::queue::JobQueue,
};
use serde_json::json;
use std::time::Duration;
use uuid::Uuid;

/// Note: these tests require running PostgreSQL and Redis instances
/// configured via environment variables.
/// Run with: cargo test --test integration_test -- --ignored

fn test_message() -> QueueMessage {
    QueueMessage {
        job_id: Uuid::new_v4(),
        job_type: JobType::CameraAngle,
        request_body: json!({"image_url": "s3://b/in.jpg", "prompt": "top-down", "steps": 8}),
    }
}

/// Each test gets its own queue namespace so runs don't interfere.
fn test_queue(visibility: Duration, max_receives: u32) -> JobQueue {
    let config = AppConfig::from_env().expect("Failed to load config");
    let name = format!("dispatch_test_{}", Uuid::new_v4().simple());
    JobQueue::new(&config.queue_url, &name, visibility, max_receives)
        .expect("Failed to initialize queue")
}

async fn test_registry() -> JobRegistry {
    let config = AppConfig::from_env().expect("Failed to load config");
    let pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");
    db::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");
    JobRegistry::new(pool, config.registry_table, config.record_ttl)
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn test_registry_lifecycle() {
    let registry = test_registry().await;
    let job_id = Uuid::new_v4();
    let body = json!({"image_url": "s3://b/in.jpg"});

    // Create and read back
    let record = registry
        .create_job(job_id, JobType::CameraAngle, &body)
        .await
        .expect("Failed to create job");
    assert_eq!(record.status, JobStatus::Pending);
    assert_eq!(record.attempts, 0);
    assert!(record.result_url.is_none());
    assert!(record.updated_at >= record.created_at);

    let fetched = registry
        .get_job(job_id)
        .await
        .expect("Failed to get job")
        .expect("Job not found");
    assert_eq!(fetched.job_id, job_id);
    assert_eq!(fetched.request_body, body);

    // Claim bumps attempts; a duplicate delivery may re-claim
    assert_eq!(registry.claim_job(job_id).await.unwrap(), Some(1));
    assert_eq!(registry.claim_job(job_id).await.unwrap(), Some(2));

    registry
        .set_worker_job_id(job_id, "engine-42")
        .await
        .expect("Failed to stamp engine id");
    let claimed = registry.get_job(job_id).await.unwrap().unwrap();
    assert_eq!(claimed.status, JobStatus::Processing);
    assert_eq!(claimed.worker_job_id.as_deref(), Some("engine-42"));

    // First terminal commit wins
    assert!(registry
        .complete_job(job_id, "s3://b/out.jpg")
        .await
        .unwrap());

    // A terminal record is never overwritten
    assert!(!registry.fail_job(job_id, "late failure").await.unwrap());
    assert!(!registry.complete_job(job_id, "s3://b/other.jpg").await.unwrap());
    assert_eq!(registry.claim_job(job_id).await.unwrap(), None);

    let terminal = registry.get_job(job_id).await.unwrap().unwrap();
    assert_eq!(terminal.status, JobStatus::Completed);
    assert_eq!(terminal.result_url.as_deref(), Some("s3://b/out.jpg"));
    assert!(terminal.error.is_none());
    assert_eq!(terminal.attempts, 2);
    assert!(terminal.expires_at.is_some());
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn test_registry_failed_job_invariants() {
    let registry = test_registry().await;
    let job_id = Uuid::new_v4();

    registry
        .create_job(job_id, JobType::FaceMask, &json!({"image_url": "s3://b/f.jpg"}))
        .await
        .expect("Failed to create job");
    registry.claim_job(job_id).await.unwrap();

    assert!(registry.fail_job(job_id, "OOM").await.unwrap());

    let failed = registry.get_job(job_id).await.unwrap().unwrap();
    assert_eq!(failed.status, JobStatus::Failed);
    assert_eq!(failed.error.as_deref(), Some("OOM"));
    assert!(failed.result_url.is_none());
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn test_registry_status_scan() {
    let registry = test_registry().await;
    let job_id = Uuid::new_v4();
    registry
        .create_job(job_id, JobType::QwenImageEdit, &json!({"image_url": "x", "prompt": "y"}))
        .await
        .unwrap();

    let pending = registry
        .list_jobs_by_status(JobStatus::Pending, 100)
        .await
        .expect("Failed to scan by status");
    assert!(pending.iter().any(|r| r.job_id == job_id));
}

#[tokio::test]
#[ignore] // Requires Redis
async fn test_queue_roundtrip_and_ack() {
    let queue = test_queue(Duration::from_secs(30), 3);
    let message = test_message();

    queue.enqueue(&message).await.expect("Failed to enqueue");
    assert_eq!(queue.depth().await.unwrap(), 1);

    let delivery = queue
        .receive(Duration::from_secs(1))
        .await
        .expect("Failed to receive")
        .expect("No message delivered");
    assert_eq!(delivery.message.job_id, message.job_id);
    assert_eq!(delivery.receives, 1);

    // Leased messages are invisible to the depth gauge
    assert_eq!(queue.depth().await.unwrap(), 0);

    queue.ack(&delivery).await.expect("Failed to ack");
    assert!(queue.receive(Duration::from_secs(1)).await.unwrap().is_none());
    assert_eq!(queue.depth().await.unwrap(), 0);
}

#[tokio::test]
#[ignore] // Requires Redis
async fn test_queue_redelivers_after_lease_lapse() {
    let queue = test_queue(Duration::from_secs(2), 5);
    let message = test_message();

    queue.enqueue(&message).await.unwrap();

    // First delivery is never acked
    let first = queue
        .receive(Duration::from_secs(1))
        .await
        .unwrap()
        .expect("No first delivery");
    assert_eq!(first.receives, 1);
    assert_eq!(queue.depth().await.unwrap(), 0);

    // After the lease lapses the message comes back with a bumped count
    tokio::time::sleep(Duration::from_secs(3)).await;
    let second = queue
        .receive(Duration::from_secs(2))
        .await
        .unwrap()
        .expect("Message was not redelivered");
    assert_eq!(second.message.job_id, message.job_id);
    assert_eq!(second.receives, 2);

    queue.ack(&second).await.unwrap();
    assert!(queue.receive(Duration::from_secs(1)).await.unwrap().is_none());
}

#[tokio::test]
#[ignore] // Requires Redis
async fn test_queue_diverts_to_dead_letter_after_max_receives() {
    let queue = test_queue(Duration::from_secs(1), 1);
    let message = test_message();

    queue.enqueue(&message).await.unwrap();

    let only = queue
        .receive(Duration::from_secs(1))
        .await
        .unwrap()
        .expect("No delivery");
    assert_eq!(only.receives, 1);

    // Let the lease lapse; the second delivery would exceed the limit,
    // so the message is diverted instead of redelivered.
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(queue.receive(Duration::from_secs(2)).await.unwrap().is_none());
    assert_eq!(queue.dead_letter_depth().await.unwrap(), 1);
    assert_eq!(queue.depth().await.unwrap(), 0);
}

#[tokio::test]
#[ignore] // Requires Redis
async fn test_queue_extend_visibility_defers_redelivery() {
    let queue = test_queue(Duration::from_secs(2), 5);
    queue.enqueue(&test_message()).await.unwrap();

    let delivery = queue
        .receive(Duration::from_secs(1))
        .await
        .unwrap()
        .expect("No delivery");

    // Keep the lease alive past its original expiry
    tokio::time::sleep(Duration::from_secs(1)).await;
    queue
        .extend_visibility(&delivery, Duration::from_secs(5))
        .await
        .expect("Failed to extend lease");

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(
        queue.receive(Duration::from_secs(1)).await.unwrap().is_none(),
        "extended message must not be redelivered yet"
    );

    queue.ack(&delivery).await.unwrap();
}

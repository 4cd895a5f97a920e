use chrono::{DateTime, Duration, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use super::JobRegistry;
use crate::models::job::{JobRecord, JobStatus, JobType};

const COLUMNS: &str = "job_id, status, job_type, request_body, created_at, updated_at, \
                       result_url, error, worker_job_id, attempts, expires_at";

#[derive(FromRow)]
struct JobRow {
    job_id: Uuid,
    status: String,
    job_type: String,
    request_body: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    result_url: Option<String>,
    error: Option<String>,
    worker_job_id: Option<String>,
    attempts: i32,
    expires_at: Option<DateTime<Utc>>,
}

impl JobRow {
    fn into_record(self) -> Result<JobRecord, sqlx::Error> {
        let job_type: JobType =
            self.job_type
                .parse()
                .map_err(|e| sqlx::Error::ColumnDecode {
                    index: "job_type".into(),
                    source: Box::new(e),
                })?;
        Ok(JobRecord {
            job_id: self.job_id,
            status: self.status.parse().unwrap_or(JobStatus::Pending),
            job_type,
            request_body: self.request_body,
            created_at: self.created_at,
            updated_at: self.updated_at,
            result_url: self.result_url,
            error: self.error,
            worker_job_id: self.worker_job_id,
            attempts: self.attempts,
            expires_at: self.expires_at,
        })
    }
}

impl JobRegistry {
    /// Insert a new pending job record
    pub async fn create_job(
        &self,
        job_id: Uuid,
        job_type: JobType,
        request_body: &serde_json::Value,
    ) -> Result<JobRecord, sqlx::Error> {
        let sql = format!(
            "INSERT INTO {} (job_id, status, job_type, request_body) \
             VALUES ($1, 'pending', $2, $3) \
             RETURNING {COLUMNS}",
            self.table
        );
        let row: JobRow = sqlx::query_as(&sql)
            .bind(job_id)
            .bind(job_type.to_string())
            .bind(request_body)
            .fetch_one(&self.pool)
            .await?;
        row.into_record()
    }

    /// Get a job by ID
    pub async fn get_job(&self, job_id: Uuid) -> Result<Option<JobRecord>, sqlx::Error> {
        let sql = format!("SELECT {COLUMNS} FROM {} WHERE job_id = $1", self.table);
        let row: Option<JobRow> = sqlx::query_as(&sql)
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(JobRow::into_record).transpose()
    }

    /// Claim a job for processing. Succeeds only from a non-terminal state,
    /// bumps the attempt count, and clears any stale engine id. Returns the
    /// new attempt count, or None if the record is terminal or missing.
    pub async fn claim_job(&self, job_id: Uuid) -> Result<Option<i32>, sqlx::Error> {
        let sql = format!(
            "UPDATE {} \
             SET status = 'processing', attempts = attempts + 1, \
                 worker_job_id = NULL, updated_at = NOW() \
             WHERE job_id = $1 AND status IN ('pending', 'processing') \
             RETURNING attempts",
            self.table
        );
        sqlx::query_scalar(&sql)
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Stamp the engine-assigned id on a claimed job
    pub async fn set_worker_job_id(
        &self,
        job_id: Uuid,
        worker_job_id: &str,
    ) -> Result<(), sqlx::Error> {
        let sql = format!(
            "UPDATE {} SET worker_job_id = $2, updated_at = NOW() \
             WHERE job_id = $1 AND status = 'processing'",
            self.table
        );
        sqlx::query(&sql)
            .bind(job_id)
            .bind(worker_job_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Commit a successful result. Refuses to overwrite a terminal record;
    /// returns false when the job already reached a terminal state.
    pub async fn complete_job(&self, job_id: Uuid, result_url: &str) -> Result<bool, sqlx::Error> {
        let sql = format!(
            "UPDATE {} \
             SET status = 'completed', result_url = $2, error = NULL, \
                 updated_at = NOW(), expires_at = $3 \
             WHERE job_id = $1 AND status NOT IN ('completed', 'failed')",
            self.table
        );
        let result = sqlx::query(&sql)
            .bind(job_id)
            .bind(result_url)
            .bind(self.record_expiry())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Commit a failure. Refuses to overwrite a terminal record; returns
    /// false when the job already reached a terminal state.
    pub async fn fail_job(&self, job_id: Uuid, error: &str) -> Result<bool, sqlx::Error> {
        let sql = format!(
            "UPDATE {} \
             SET status = 'failed', error = $2, result_url = NULL, \
                 updated_at = NOW(), expires_at = $3 \
             WHERE job_id = $1 AND status NOT IN ('completed', 'failed')",
            self.table
        );
        let result = sqlx::query(&sql)
            .bind(job_id)
            .bind(error)
            .bind(self.record_expiry())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Administrative scan over the (status, created_at) index, newest first
    pub async fn list_jobs_by_status(
        &self,
        status: JobStatus,
        limit: i64,
    ) -> Result<Vec<JobRecord>, sqlx::Error> {
        let sql = format!(
            "SELECT {COLUMNS} FROM {} WHERE status = $1 \
             ORDER BY created_at DESC LIMIT $2",
            self.table
        );
        let rows: Vec<JobRow> = sqlx::query_as(&sql)
            .bind(status.as_str())
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(JobRow::into_record).collect()
    }

    /// Delete records past their TTL. Returns the number reaped.
    pub async fn reap_expired_jobs(&self) -> Result<u64, sqlx::Error> {
        let sql = format!(
            "DELETE FROM {} WHERE expires_at IS NOT NULL AND expires_at < NOW()",
            self.table
        );
        let result = sqlx::query(&sql).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    /// Check registry connectivity (for health checks)
    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    fn record_expiry(&self) -> DateTime<Utc> {
        Utc::now() + Duration::seconds(self.record_ttl_secs as i64)
    }
}

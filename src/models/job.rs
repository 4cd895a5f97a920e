use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Status of a dispatch job in the registry.
///
/// Completed and failed are terminal; the registry refuses to move a job
/// back out of them.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// Supported inference routes. Each maps to one submit endpoint on the
/// engine host.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum JobType {
    CameraAngle,
    QwenImageEdit,
    FaceMask,
    FullFaceSwap,
}

impl JobType {
    /// Engine submit path for this job type.
    pub fn engine_path(&self) -> String {
        format!("/api/v1/{}/jobs", self)
    }

    /// Fields the submit envelope must carry. Values are passed through
    /// to the engine uninterpreted.
    pub fn required_fields(&self) -> &'static [&'static str] {
        match self {
            JobType::CameraAngle => &["image_url"],
            JobType::QwenImageEdit => &["image_url", "prompt"],
            JobType::FaceMask => &["image_url"],
            JobType::FullFaceSwap => &["source_image_url", "target_face_url"],
        }
    }

    /// Required fields absent (or null) in the given request body.
    pub fn missing_fields(&self, body: &serde_json::Value) -> Vec<&'static str> {
        self.required_fields()
            .iter()
            .copied()
            .filter(|field| body.get(field).map_or(true, |v| v.is_null()))
            .collect()
    }
}

/// A job record in the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub job_type: JobType,
    pub request_body: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub result_url: Option<String>,
    pub error: Option<String>,
    pub worker_job_id: Option<String>,
    pub attempts: i32,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Queue-level envelope carrying a job to the worker host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueMessage {
    pub job_id: Uuid,
    pub job_type: JobType,
    pub request_body: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn job_type_round_trips_route_segments() {
        for (s, t) in [
            ("camera-angle", JobType::CameraAngle),
            ("qwen-image-edit", JobType::QwenImageEdit),
            ("face-mask", JobType::FaceMask),
            ("full-face-swap", JobType::FullFaceSwap),
        ] {
            assert_eq!(s.parse::<JobType>().unwrap(), t);
            assert_eq!(t.to_string(), s);
        }
        assert!("face-swap-9000".parse::<JobType>().is_err());
    }

    #[test]
    fn engine_path_matches_route() {
        assert_eq!(
            JobType::QwenImageEdit.engine_path(),
            "/api/v1/qwen-image-edit/jobs"
        );
    }

    #[test]
    fn terminal_states() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
    }

    #[test]
    fn envelope_check_passes_with_required_fields() {
        let body = json!({"image_url": "s3://b/in.jpg", "prompt": "top-down", "steps": 8});
        assert!(JobType::CameraAngle.missing_fields(&body).is_empty());
        assert!(JobType::QwenImageEdit.missing_fields(&body).is_empty());
    }

    #[test]
    fn envelope_check_reports_missing_and_null_fields() {
        let body = json!({"image_url": null});
        assert_eq!(
            JobType::QwenImageEdit.missing_fields(&body),
            vec!["image_url", "prompt"]
        );

        let body = json!({"source_image_url": "s3://b/src.jpg"});
        assert_eq!(
            JobType::FullFaceSwap.missing_fields(&body),
            vec!["target_face_url"]
        );
    }

    #[test]
    fn envelope_check_ignores_extra_fields() {
        let body = json!({"image_url": "s3://b/in.jpg", "zoom": 1, "seed": 42});
        assert!(JobType::FaceMask.missing_fields(&body).is_empty());
    }

    #[test]
    fn queue_message_wire_format() {
        let msg = QueueMessage {
            job_id: Uuid::nil(),
            job_type: JobType::CameraAngle,
            request_body: json!({"image_url": "s3://b/in.jpg"}),
        };
        let wire: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&msg).unwrap()).unwrap();
        assert_eq!(wire["job_type"], "camera-angle");
        assert_eq!(wire["request_body"]["image_url"], "s3://b/in.jpg");
    }
}

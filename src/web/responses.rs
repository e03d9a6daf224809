use axum::Json;
use axum::http::StatusCode;
use serde::Serialize;
use uuid::Uuid;

/// Canonical JSON payload for error responses.
#[derive(Debug, Serialize, Clone)]
pub struct ApiMessage {
    pub message: String,
}

impl ApiMessage {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Response returned by the tool job endpoints once the operation has
/// completed and the artifact is ready for download.
#[derive(Debug, Serialize, Clone)]
pub struct JobCompleted {
    pub job_id: Uuid,
    pub download_url: String,
    pub page_count: u32,
}

impl JobCompleted {
    pub fn new(job_id: Uuid, download_url: impl Into<String>, page_count: u32) -> Self {
        Self {
            job_id,
            download_url: download_url.into(),
            page_count,
        }
    }
}

/// Helper for handlers that return `(StatusCode, Json<ApiMessage>)`.
pub fn json_error(
    status: StatusCode,
    message: impl Into<String>,
) -> (StatusCode, Json<ApiMessage>) {
    (status, Json(ApiMessage::new(message)))
}

use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use uuid::Uuid;

use crate::services::importer::ImportError;
use crate::services::queue::QueueError;
use crate::services::repository::StoreError;
use crate::services::storage::StorageError;
use crate::services::validation::ValidationError;

/// Error type for HTTP handlers. Renders as `{ "error", "code" }` JSON.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("No file uploaded; send the rate sheet in the 'file' field")]
    NoFile,

    #[error("Unsupported file type '{0}'; upload an .xlsx, .xls or .csv rate sheet")]
    InvalidFormat(String),

    #[error("File exceeds the {limit} byte upload limit")]
    FileTooLarge { limit: usize },

    #[error("Courier {courier_id} already has an import in progress")]
    ActiveImport {
        courier_id: i64,
        job_id: Option<Uuid>,
    },

    #[error("Import job {0} not found")]
    JobNotFound(Uuid),

    #[error("{0}")]
    Validation(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Store(StoreError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    /// Map a multipart read failure, recognising an exceeded body limit.
    pub fn from_multipart(err: MultipartError, limit: usize) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::FileTooLarge { limit }
        } else {
            ApiError::BadRequest(err.body_text())
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::ActiveImportExists { courier_id, job_id } => {
                ApiError::ActiveImport { courier_id, job_id }
            }
            StoreError::JobNotFound(id) => ApiError::JobNotFound(id),
            other => ApiError::Store(other),
        }
    }
}

impl From<ImportError> for ApiError {
    fn from(e: ImportError) -> Self {
        match e {
            ImportError::ActiveImportExists { courier_id, job_id } => {
                ApiError::ActiveImport { courier_id, job_id }
            }
            ImportError::JobNotFound(id) => ApiError::JobNotFound(id),
            ImportError::Store(e) => ApiError::Store(e),
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        ApiError::Validation(e.to_string())
    }
}

impl From<garde::Report> for ApiError {
    fn from(report: garde::Report) -> Self {
        ApiError::Validation(report.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::NoFile => (StatusCode::BAD_REQUEST, "NO_FILE"),
            ApiError::InvalidFormat(_) => (StatusCode::UNSUPPORTED_MEDIA_TYPE, "INVALID_FORMAT"),
            ApiError::FileTooLarge { .. } => (StatusCode::PAYLOAD_TOO_LARGE, "FILE_TOO_LARGE"),
            ApiError::ActiveImport { .. } => (StatusCode::CONFLICT, "ACTIVE_IMPORT_EXISTS"),
            ApiError::JobNotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Store(_) | ApiError::Storage(_) | ApiError::Queue(_) => {
                tracing::error!(error = %self, "Internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
        };

        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            "An internal error occurred".to_string()
        } else {
            self.to_string()
        };

        let mut body = json!({
            "error": message,
            "code": code,
        });
        if let ApiError::ActiveImport {
            job_id: Some(job_id),
            ..
        } = &self
        {
            body["job_id"] = json!(job_id);
        }

        (status, axum::Json(body)).into_response()
    }
}

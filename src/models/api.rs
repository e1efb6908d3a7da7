use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::job::{ImportJob, ImportStatus, SheetFormat};

/// Response after submitting a rate sheet for import.
#[derive(Debug, Serialize)]
pub struct ImportSubmitResponse {
    pub job_id: Uuid,
    pub status: ImportStatus,
    pub message: String,
}

/// Final counts and rejection sample, present once a job is terminal.
#[derive(Debug, Serialize)]
pub struct ImportSummary {
    pub processed: i32,
    pub skipped: i32,
    pub rejected: i32,
    pub errors: Vec<String>,
}

/// Response for querying import job status.
#[derive(Debug, Serialize)]
pub struct ImportJobResponse {
    pub job_id: Uuid,
    pub courier_id: i64,
    pub status: ImportStatus,
    pub progress: i32,
    pub message: String,
    pub format: SheetFormat,
    pub total_rows: i32,
    pub rows_consumed: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<ImportSummary>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl From<ImportJob> for ImportJobResponse {
    fn from(job: ImportJob) -> Self {
        let summary = job.status.is_terminal().then(|| ImportSummary {
            processed: job.counts.processed,
            skipped: job.counts.skipped,
            rejected: job.counts.rejected,
            errors: job.errors.clone(),
        });

        Self {
            job_id: job.id,
            courier_id: job.courier_id,
            status: job.status,
            progress: job.progress,
            message: job.message,
            format: job.format,
            total_rows: job.counts.total_rows,
            rows_consumed: job.counts.rows_consumed,
            summary,
            created_at: job.created_at,
            updated_at: job.updated_at,
            started_at: job.started_at,
            finished_at: job.finished_at,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct ActiveImportsQuery {
    #[garde(range(min = 1))]
    pub courier_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ActiveImportsResponse {
    pub has_active: bool,
    pub jobs: Vec<ImportJobResponse>,
}

/// Query string for the rate listing.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct RateListQuery {
    #[garde(range(min = 1))]
    pub courier_id: Option<i64>,

    #[garde(length(max = 100))]
    pub province: Option<String>,

    #[garde(length(max = 100))]
    pub city: Option<String>,

    #[garde(length(max = 100))]
    pub district: Option<String>,

    #[garde(skip)]
    pub service_type: Option<String>,

    #[garde(length(max = 100))]
    pub search: Option<String>,

    #[garde(range(min = 1))]
    pub page: Option<u32>,

    #[garde(range(min = 1, max = 100))]
    pub per_page: Option<u32>,
}

/// Single-record rate edit. Uses the same validators as the bulk import.
#[derive(Debug, Deserialize, Validate)]
pub struct RateUpsertRequest {
    #[garde(length(max = 100))]
    pub province: String,

    #[garde(length(max = 100))]
    pub city: String,

    #[garde(length(max = 100))]
    pub district: String,

    #[garde(length(max = 10))]
    pub service_type: String,

    /// Number, numeric text, `-`/`N/A` or null.
    #[garde(skip)]
    #[serde(default)]
    pub rate: serde_json::Value,

    #[garde(length(max = 100))]
    pub sla: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ValidateFieldRequest {
    #[garde(length(min = 1, max = 50))]
    pub field: String,

    #[garde(skip)]
    #[serde(default)]
    pub value: serde_json::Value,
}

/// Outcome of a single-field validation.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FieldCheck {
    pub field: String,
    pub valid: bool,
    pub message: Option<String>,
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::job::{ImportJob, ImportStatus, JobProgress, NewImportJob};
use crate::models::rate::{Destination, RateFilter, RatePage, RateRecord, RateUpsert, ServiceType};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Courier {courier_id} already has an active import")]
    ActiveImportExists {
        courier_id: i64,
        job_id: Option<Uuid>,
    },

    #[error("Import job {0} not found")]
    JobNotFound(Uuid),

    #[error("Import job {job_id} cannot move from {from} to {to}")]
    InvalidTransition {
        job_id: Uuid,
        from: ImportStatus,
        to: ImportStatus,
    },

    #[error("Unreadable stored value: {0}")]
    Corrupt(String),
}

/// Persistence for import jobs.
///
/// Status writes are conditional on the current status so that every job
/// reaches a terminal state exactly once, and `create_job` refuses a second
/// active job for the same courier.
#[async_trait]
pub trait ImportJobStore: Send + Sync {
    /// Insert a `queued` job. Fails with [`StoreError::ActiveImportExists`]
    /// while the courier has a queued or processing job.
    async fn create_job(&self, job: NewImportJob) -> Result<ImportJob, StoreError>;

    async fn get_job(&self, job_id: Uuid) -> Result<Option<ImportJob>, StoreError>;

    /// Queued and processing jobs, oldest first.
    async fn list_active(&self, courier_id: Option<i64>) -> Result<Vec<ImportJob>, StoreError>;

    /// `queued -> processing`.
    async fn claim_job(&self, job_id: Uuid, message: &str) -> Result<ImportJob, StoreError>;

    /// Persist a progress snapshot of a processing job. Progress never moves
    /// backwards.
    async fn save_progress(&self, job_id: Uuid, progress: &JobProgress) -> Result<(), StoreError>;

    /// Terminal write with final counts, from `queued` or `processing`.
    async fn finish_job(
        &self,
        job_id: Uuid,
        status: ImportStatus,
        progress: &JobProgress,
    ) -> Result<ImportJob, StoreError>;

    /// Mark a job failed without touching its counts.
    async fn fail_job(&self, job_id: Uuid, message: &str) -> Result<ImportJob, StoreError>;

    /// Fail processing jobs whose last write is older than `cutoff`.
    async fn fail_stale_jobs(
        &self,
        cutoff: DateTime<Utc>,
        message: &str,
    ) -> Result<Vec<Uuid>, StoreError>;
}

/// Keyed store of courier rates. `upsert` is idempotent per
/// (courier, destination, service type).
#[async_trait]
pub trait RateRepository: Send + Sync {
    async fn upsert(&self, rate: &RateUpsert) -> Result<RateRecord, StoreError>;

    async fn find(
        &self,
        courier_id: i64,
        destination: &Destination,
        service_type: ServiceType,
    ) -> Result<Option<RateRecord>, StoreError>;

    async fn list(&self, filter: &RateFilter) -> Result<RatePage, StoreError>;
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use uuid::Uuid;

use crate::models::job::{ImportJob, ImportStatus, JobProgress, NewImportJob};
use crate::models::rate::{Destination, RateFilter, RatePage, RateRecord, RateUpsert, ServiceType};
use crate::services::repository::{ImportJobStore, RateRepository, StoreError};

pub mod job_queries;
pub mod memory;
pub mod rate_queries;

/// Initialize PostgreSQL connection pool
pub async fn init_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .min_connections(5)
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(database_url)
        .await
}

/// Run database migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| sqlx::Error::Migrate(Box::new(e)))
}

/// PostgreSQL-backed job and rate store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ImportJobStore for PgStore {
    async fn create_job(&self, job: NewImportJob) -> Result<ImportJob, StoreError> {
        job_queries::create_job(&self.pool, &job).await
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<ImportJob>, StoreError> {
        job_queries::get_job(&self.pool, job_id).await
    }

    async fn list_active(&self, courier_id: Option<i64>) -> Result<Vec<ImportJob>, StoreError> {
        job_queries::list_active(&self.pool, courier_id).await
    }

    async fn claim_job(&self, job_id: Uuid, message: &str) -> Result<ImportJob, StoreError> {
        job_queries::claim_job(&self.pool, job_id, message).await
    }

    async fn save_progress(&self, job_id: Uuid, progress: &JobProgress) -> Result<(), StoreError> {
        job_queries::save_progress(&self.pool, job_id, progress).await
    }

    async fn finish_job(
        &self,
        job_id: Uuid,
        status: ImportStatus,
        progress: &JobProgress,
    ) -> Result<ImportJob, StoreError> {
        job_queries::finish_job(&self.pool, job_id, status, progress).await
    }

    async fn fail_job(&self, job_id: Uuid, message: &str) -> Result<ImportJob, StoreError> {
        job_queries::fail_job(&self.pool, job_id, message).await
    }

    async fn fail_stale_jobs(
        &self,
        cutoff: DateTime<Utc>,
        message: &str,
    ) -> Result<Vec<Uuid>, StoreError> {
        job_queries::fail_stale_jobs(&self.pool, cutoff, message).await
    }
}

#[async_trait]
impl RateRepository for PgStore {
    async fn upsert(&self, rate: &RateUpsert) -> Result<RateRecord, StoreError> {
        rate_queries::upsert_rate(&self.pool, rate).await
    }

    async fn find(
        &self,
        courier_id: i64,
        destination: &Destination,
        service_type: ServiceType,
    ) -> Result<Option<RateRecord>, StoreError> {
        rate_queries::find_rate(&self.pool, courier_id, destination, service_type).await
    }

    async fn list(&self, filter: &RateFilter) -> Result<RatePage, StoreError> {
        rate_queries::list_rates(&self.pool, filter).await
    }
}

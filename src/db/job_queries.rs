use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::job::{ImportCounts, ImportJob, ImportStatus, JobProgress, NewImportJob};
use crate::services::repository::StoreError;

/// Partial unique index enforcing one active import per courier.
const ACTIVE_JOB_CONSTRAINT: &str = "uq_rate_import_jobs_active_courier";

const JOB_COLUMNS: &str = "id, courier_id, status, progress, message, format, file_key, \
     total_rows, rows_consumed, processed, skipped, rejected, errors, \
     created_at, updated_at, started_at, finished_at";

#[derive(Debug, sqlx::FromRow)]
struct ImportJobRow {
    id: Uuid,
    courier_id: i64,
    status: String,
    progress: i32,
    message: String,
    format: String,
    file_key: String,
    total_rows: i32,
    rows_consumed: i32,
    processed: i32,
    skipped: i32,
    rejected: i32,
    errors: Json<Vec<String>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

impl TryFrom<ImportJobRow> for ImportJob {
    type Error = StoreError;

    fn try_from(row: ImportJobRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse()
            .map_err(|_| StoreError::Corrupt(format!("job status '{}'", row.status)))?;
        let format = row
            .format
            .parse()
            .map_err(|_| StoreError::Corrupt(format!("sheet format '{}'", row.format)))?;

        Ok(ImportJob {
            id: row.id,
            courier_id: row.courier_id,
            status,
            progress: row.progress,
            message: row.message,
            format,
            file_key: row.file_key,
            counts: ImportCounts {
                total_rows: row.total_rows,
                rows_consumed: row.rows_consumed,
                processed: row.processed,
                skipped: row.skipped,
                rejected: row.rejected,
            },
            errors: row.errors.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
            started_at: row.started_at,
            finished_at: row.finished_at,
        })
    }
}

/// Insert a new queued import job
pub async fn create_job(pool: &PgPool, job: &NewImportJob) -> Result<ImportJob, StoreError> {
    let sql = format!(
        r#"
        INSERT INTO rate_import_jobs (id, courier_id, status, message, format, file_key)
        VALUES ($1, $2, 'queued', 'Waiting for a worker', $3, $4)
        RETURNING {JOB_COLUMNS}
        "#
    );

    let inserted = sqlx::query_as::<_, ImportJobRow>(&sql)
        .bind(job.id)
        .bind(job.courier_id)
        .bind(job.format.as_ref())
        .bind(&job.file_key)
        .fetch_one(pool)
        .await;

    match inserted {
        Ok(row) => row.try_into(),
        Err(sqlx::Error::Database(db_err)) if db_err.constraint() == Some(ACTIVE_JOB_CONSTRAINT) => {
            let active = list_active(pool, Some(job.courier_id)).await?;
            Err(StoreError::ActiveImportExists {
                courier_id: job.courier_id,
                job_id: active.first().map(|j| j.id),
            })
        }
        Err(e) => Err(e.into()),
    }
}

/// Get a job by ID
pub async fn get_job(pool: &PgPool, job_id: Uuid) -> Result<Option<ImportJob>, StoreError> {
    let sql = format!("SELECT {JOB_COLUMNS} FROM rate_import_jobs WHERE id = $1");

    sqlx::query_as::<_, ImportJobRow>(&sql)
        .bind(job_id)
        .fetch_optional(pool)
        .await?
        .map(ImportJob::try_from)
        .transpose()
}

/// Queued and processing jobs, optionally for one courier
pub async fn list_active(
    pool: &PgPool,
    courier_id: Option<i64>,
) -> Result<Vec<ImportJob>, StoreError> {
    let sql = format!(
        r#"
        SELECT {JOB_COLUMNS}
        FROM rate_import_jobs
        WHERE status IN ('queued', 'processing')
          AND ($1::bigint IS NULL OR courier_id = $1)
        ORDER BY created_at ASC
        "#
    );

    sqlx::query_as::<_, ImportJobRow>(&sql)
        .bind(courier_id)
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(ImportJob::try_from)
        .collect()
}

/// Move a queued job to processing
pub async fn claim_job(pool: &PgPool, job_id: Uuid, message: &str) -> Result<ImportJob, StoreError> {
    let sql = format!(
        r#"
        UPDATE rate_import_jobs
        SET status = 'processing',
            message = $2,
            started_at = NOW(),
            updated_at = NOW()
        WHERE id = $1 AND status = 'queued'
        RETURNING {JOB_COLUMNS}
        "#
    );

    match sqlx::query_as::<_, ImportJobRow>(&sql)
        .bind(job_id)
        .bind(message)
        .fetch_optional(pool)
        .await?
    {
        Some(row) => row.try_into(),
        None => Err(transition_error(pool, job_id, ImportStatus::Processing).await),
    }
}

/// Update progress counters of a processing job
pub async fn save_progress(
    pool: &PgPool,
    job_id: Uuid,
    progress: &JobProgress,
) -> Result<(), StoreError> {
    let result = sqlx::query(
        r#"
        UPDATE rate_import_jobs
        SET progress = GREATEST(progress, $2),
            message = $3,
            total_rows = $4,
            rows_consumed = $5,
            processed = $6,
            skipped = $7,
            rejected = $8,
            errors = $9,
            updated_at = NOW()
        WHERE id = $1 AND status = 'processing'
        "#,
    )
    .bind(job_id)
    .bind(progress.progress)
    .bind(&progress.message)
    .bind(progress.counts.total_rows)
    .bind(progress.counts.rows_consumed)
    .bind(progress.counts.processed)
    .bind(progress.counts.skipped)
    .bind(progress.counts.rejected)
    .bind(Json(progress.errors.clone()))
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(transition_error(pool, job_id, ImportStatus::Processing).await);
    }
    Ok(())
}

/// Write the terminal state with final counts
pub async fn finish_job(
    pool: &PgPool,
    job_id: Uuid,
    status: ImportStatus,
    progress: &JobProgress,
) -> Result<ImportJob, StoreError> {
    let sql = format!(
        r#"
        UPDATE rate_import_jobs
        SET status = $2,
            progress = GREATEST(progress, $3),
            message = $4,
            total_rows = $5,
            rows_consumed = $6,
            processed = $7,
            skipped = $8,
            rejected = $9,
            errors = $10,
            finished_at = NOW(),
            updated_at = NOW()
        WHERE id = $1 AND status IN ('queued', 'processing')
        RETURNING {JOB_COLUMNS}
        "#
    );

    match sqlx::query_as::<_, ImportJobRow>(&sql)
        .bind(job_id)
        .bind(status.as_ref())
        .bind(progress.progress)
        .bind(&progress.message)
        .bind(progress.counts.total_rows)
        .bind(progress.counts.rows_consumed)
        .bind(progress.counts.processed)
        .bind(progress.counts.skipped)
        .bind(progress.counts.rejected)
        .bind(Json(progress.errors.clone()))
        .fetch_optional(pool)
        .await?
    {
        Some(row) => row.try_into(),
        None => Err(transition_error(pool, job_id, status).await),
    }
}

/// Mark a job failed, keeping whatever counts it has
pub async fn fail_job(pool: &PgPool, job_id: Uuid, message: &str) -> Result<ImportJob, StoreError> {
    let sql = format!(
        r#"
        UPDATE rate_import_jobs
        SET status = 'failed',
            message = $2,
            finished_at = NOW(),
            updated_at = NOW()
        WHERE id = $1 AND status IN ('queued', 'processing')
        RETURNING {JOB_COLUMNS}
        "#
    );

    match sqlx::query_as::<_, ImportJobRow>(&sql)
        .bind(job_id)
        .bind(message)
        .fetch_optional(pool)
        .await?
    {
        Some(row) => row.try_into(),
        None => Err(transition_error(pool, job_id, ImportStatus::Failed).await),
    }
}

/// Fail processing jobs with no writes since `cutoff`
pub async fn fail_stale_jobs(
    pool: &PgPool,
    cutoff: DateTime<Utc>,
    message: &str,
) -> Result<Vec<Uuid>, StoreError> {
    let ids = sqlx::query_scalar::<_, Uuid>(
        r#"
        UPDATE rate_import_jobs
        SET status = 'failed',
            message = $2,
            finished_at = NOW(),
            updated_at = NOW()
        WHERE status = 'processing' AND updated_at < $1
        RETURNING id
        "#,
    )
    .bind(cutoff)
    .bind(message)
    .fetch_all(pool)
    .await?;

    Ok(ids)
}

async fn transition_error(pool: &PgPool, job_id: Uuid, to: ImportStatus) -> StoreError {
    match get_job(pool, job_id).await {
        Ok(Some(job)) => StoreError::InvalidTransition {
            job_id,
            from: job.status,
            to,
        },
        Ok(None) => StoreError::JobNotFound(job_id),
        Err(e) => e,
    }
}

//! Import job orchestration: job creation under the per-courier lock, and
//! the fold over a parsed rate sheet that upserts rates and tracks progress.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use uuid::Uuid;

use crate::models::job::{
    ImportCounts, ImportJob, ImportStatus, JobProgress, NewImportJob, SheetFormat,
    ERROR_SAMPLE_LIMIT,
};
use crate::services::rate_sheet::{RateMatrix, RowOutcome};
use crate::services::repository::{ImportJobStore, RateRepository, StoreError};

/// Message written on jobs failed by [`ImportService::reap_stale_jobs`].
pub const INTERRUPTED_MESSAGE: &str = "Import interrupted";

/// Progress is also written at least this often, so a long import on a
/// large sheet is not mistaken for a stale one.
const HEARTBEAT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("Courier {courier_id} already has an active import")]
    ActiveImportExists {
        courier_id: i64,
        job_id: Option<Uuid>,
    },

    #[error("Import job {0} not found")]
    JobNotFound(Uuid),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for ImportError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::ActiveImportExists { courier_id, job_id } => {
                ImportError::ActiveImportExists { courier_id, job_id }
            }
            StoreError::JobNotFound(id) => ImportError::JobNotFound(id),
            other => ImportError::Store(other),
        }
    }
}

/// Running counters and error sample for one import.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportTally {
    counts: ImportCounts,
    errors: Vec<String>,
}

impl ImportTally {
    pub fn new(total_rows: usize) -> Self {
        Self {
            counts: ImportCounts {
                total_rows: total_rows as i32,
                ..Default::default()
            },
            errors: Vec::new(),
        }
    }

    pub fn counts(&self) -> ImportCounts {
        self.counts
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    fn record_upsert(&mut self) {
        self.counts.processed += 1;
    }

    fn record_skip(&mut self) {
        self.counts.skipped += 1;
    }

    fn record_rejection(&mut self, reason: String) {
        self.counts.rejected += 1;
        if self.errors.len() < ERROR_SAMPLE_LIMIT {
            self.errors.push(reason);
        }
    }

    fn finish_row(&mut self) {
        self.counts.rows_consumed += 1;
    }

    /// Whole percent of rows consumed, held at 99 until the job completes.
    pub fn percent(&self) -> i32 {
        if self.counts.total_rows == 0 {
            return 0;
        }
        let pct = i64::from(self.counts.rows_consumed) * 100 / i64::from(self.counts.total_rows);
        pct.min(99) as i32
    }

    pub fn summary(&self) -> String {
        format!(
            "Imported {} rates ({} rows skipped, {} entries rejected)",
            self.counts.processed, self.counts.skipped, self.counts.rejected
        )
    }

    fn snapshot(&self, progress: i32, message: String) -> JobProgress {
        JobProgress {
            progress,
            message,
            counts: self.counts,
            errors: self.errors.clone(),
        }
    }
}

/// Creates, runs and fails rate import jobs.
#[derive(Clone)]
pub struct ImportService {
    jobs: Arc<dyn ImportJobStore>,
    rates: Arc<dyn RateRepository>,
}

impl ImportService {
    pub fn new(jobs: Arc<dyn ImportJobStore>, rates: Arc<dyn RateRepository>) -> Self {
        Self { jobs, rates }
    }

    pub async fn get_job(&self, job_id: Uuid) -> Result<Option<ImportJob>, ImportError> {
        Ok(self.jobs.get_job(job_id).await?)
    }

    pub async fn list_active(&self, courier_id: Option<i64>) -> Result<Vec<ImportJob>, ImportError> {
        Ok(self.jobs.list_active(courier_id).await?)
    }

    /// The courier's queued or processing job, if any.
    pub async fn active_job(&self, courier_id: i64) -> Result<Option<ImportJob>, ImportError> {
        Ok(self.jobs.list_active(Some(courier_id)).await?.into_iter().next())
    }

    /// Queue a new import. Refused while the courier has an active one.
    pub async fn create_job(
        &self,
        courier_id: i64,
        format: SheetFormat,
        file_key: String,
        job_id: Uuid,
    ) -> Result<ImportJob, ImportError> {
        let job = self
            .jobs
            .create_job(NewImportJob {
                id: job_id,
                courier_id,
                format,
                file_key,
            })
            .await?;

        metrics::counter!("rate_import_jobs_total").increment(1);
        tracing::info!(job_id = %job.id, courier_id, format = %format, "Rate import queued");
        Ok(job)
    }

    /// Process a queued job against the uploaded sheet bytes.
    ///
    /// Returns the job in its terminal state. Sheet and repository failures
    /// end the job as `failed`; an `Err` means the job could not be claimed
    /// or its terminal state could not be written.
    pub async fn run_job(&self, job_id: Uuid, bytes: Vec<u8>) -> Result<ImportJob, ImportError> {
        let job = self.jobs.claim_job(job_id, "Reading rate sheet").await?;
        let started = Instant::now();
        tracing::info!(job_id = %job.id, courier_id = job.courier_id, "Rate import started");

        let format = job.format;
        let opened = tokio::task::spawn_blocking(move || RateMatrix::open(format, bytes)).await;
        let matrix = match opened {
            Ok(Ok(matrix)) => matrix,
            Ok(Err(e)) => {
                return self
                    .finish_failed(&job, &ImportTally::new(0), 0, e.to_string(), started)
                    .await
            }
            Err(e) => {
                return self
                    .finish_failed(
                        &job,
                        &ImportTally::new(0),
                        0,
                        format!("Rate sheet reader stopped: {}", e),
                        started,
                    )
                    .await
            }
        };

        let mut tally = ImportTally::new(matrix.total_rows());
        let mut saved_percent = job.progress;
        let mut last_write = Instant::now();
        tracing::debug!(job_id = %job.id, total_rows = matrix.total_rows(), "Rate sheet opened");

        for parsed in matrix {
            for outcome in parsed.outcomes {
                match outcome {
                    RowOutcome::Record(candidate) => {
                        let upsert = candidate.into_upsert(job.courier_id);
                        if let Err(e) = self.rates.upsert(&upsert).await {
                            let message = format!("Saving rates failed at row {}: {}", parsed.row, e);
                            return self
                                .finish_failed(&job, &tally, saved_percent, message, started)
                                .await;
                        }
                        tally.record_upsert();
                    }
                    RowOutcome::SkippedRow { .. } => tally.record_skip(),
                    RowOutcome::RejectedGroup { reason, .. } => tally.record_rejection(reason),
                }
            }
            tally.finish_row();

            let percent = tally.percent();
            if percent > saved_percent || last_write.elapsed() >= HEARTBEAT {
                let counts = tally.counts();
                let message = format!(
                    "Processing row {} of {}",
                    counts.rows_consumed, counts.total_rows
                );
                if let Err(e) = self
                    .jobs
                    .save_progress(job.id, &tally.snapshot(percent, message))
                    .await
                {
                    if let StoreError::InvalidTransition { .. } = e {
                        // Failed elsewhere, e.g. reaped as stale
                        return Err(e.into());
                    }
                    let message = format!("Saving progress failed: {}", e);
                    return self
                        .finish_failed(&job, &tally, saved_percent, message, started)
                        .await;
                }
                saved_percent = saved_percent.max(percent);
                last_write = Instant::now();
            }
        }

        let finished = self
            .jobs
            .finish_job(
                job.id,
                ImportStatus::Completed,
                &tally.snapshot(100, tally.summary()),
            )
            .await?;

        let counts = tally.counts();
        metrics::counter!("rate_import_jobs_completed").increment(1);
        metrics::counter!("rate_import_rows_total").increment(counts.rows_consumed as u64);
        metrics::histogram!("rate_import_processing_seconds")
            .record(started.elapsed().as_secs_f64());
        tracing::info!(
            job_id = %job.id,
            courier_id = job.courier_id,
            processed = counts.processed,
            skipped = counts.skipped,
            rejected = counts.rejected,
            duration_ms = started.elapsed().as_millis() as u64,
            "Rate import completed"
        );

        Ok(finished)
    }

    async fn finish_failed(
        &self,
        job: &ImportJob,
        tally: &ImportTally,
        progress: i32,
        message: String,
        started: Instant,
    ) -> Result<ImportJob, ImportError> {
        tracing::warn!(job_id = %job.id, courier_id = job.courier_id, error = %message, "Rate import failed");
        let failed = self
            .jobs
            .finish_job(
                job.id,
                ImportStatus::Failed,
                &tally.snapshot(progress, message),
            )
            .await?;

        metrics::counter!("rate_import_jobs_failed").increment(1);
        metrics::counter!("rate_import_rows_total").increment(tally.counts().rows_consumed as u64);
        metrics::histogram!("rate_import_processing_seconds")
            .record(started.elapsed().as_secs_f64());
        Ok(failed)
    }

    /// Fail a queued or processing job, keeping its counts.
    pub async fn fail_job(&self, job_id: Uuid, message: &str) -> Result<ImportJob, ImportError> {
        let job = self.jobs.fail_job(job_id, message).await?;
        metrics::counter!("rate_import_jobs_failed").increment(1);
        tracing::warn!(job_id = %job_id, courier_id = job.courier_id, error = message, "Rate import failed");
        Ok(job)
    }

    /// Fail processing jobs that have not written progress within
    /// `older_than`, releasing their couriers' import lock.
    pub async fn reap_stale_jobs(
        &self,
        older_than: chrono::Duration,
    ) -> Result<Vec<Uuid>, ImportError> {
        let cutoff = Utc::now() - older_than;
        let reaped = self
            .jobs
            .fail_stale_jobs(cutoff, INTERRUPTED_MESSAGE)
            .await?;

        if !reaped.is_empty() {
            metrics::counter!("rate_import_jobs_failed").increment(reaped.len() as u64);
            tracing::warn!(count = reaped.len(), jobs = ?reaped, "Failed stale rate imports");
        }
        Ok(reaped)
    }
}

use courier_rates::{
    config::AppConfig,
    db::{self, PgStore},
    services::{
        importer::{ImportError, ImportService},
        queue::{ImportQueue, QueuedImport},
        repository::StoreError,
        storage::R2Client,
    },
};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

const REAP_INTERVAL: Duration = Duration::from_secs(60);

struct Worker {
    importer: ImportService,
    storage: R2Client,
    queue: ImportQueue,
    stale_after: chrono::Duration,
}

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting rate import worker");

    let config = AppConfig::from_env().expect("Failed to load configuration");

    if let Some(addr) = &config.worker_metrics_addr {
        let addr: SocketAddr = addr.parse().expect("Invalid WORKER_METRICS_ADDR");
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .expect("Failed to install Prometheus exporter");
        tracing::info!(%addr, "Worker metrics listener started");
    }

    tracing::info!("Connecting to PostgreSQL");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    tracing::info!("Initializing services");
    let storage = R2Client::new(
        &config.r2_bucket,
        &config.r2_endpoint,
        &config.r2_access_key,
        &config.r2_secret_key,
    )
    .expect("Failed to initialize R2 client");

    let queue = ImportQueue::new(&config.redis_url).expect("Failed to initialize import queue");

    let store = Arc::new(PgStore::new(db_pool));
    let worker = Worker {
        importer: ImportService::new(store.clone(), store),
        storage,
        queue,
        stale_after: chrono::Duration::minutes(config.stale_job_minutes),
    };

    // Imports left in flight by a previous run go back on the queue
    match worker.queue.requeue_in_flight().await {
        Ok(0) => {}
        Ok(moved) => tracing::warn!(moved, "Requeued in-flight rate imports"),
        Err(e) => tracing::error!(error = %e, "Failed to requeue in-flight rate imports"),
    }
    worker.reap().await;
    let mut last_reap = Instant::now();

    let poll_interval = Duration::from_millis(config.worker_poll_interval_ms);
    tracing::info!("Worker ready, starting import loop");

    loop {
        if last_reap.elapsed() >= REAP_INTERVAL {
            worker.reap().await;
            last_reap = Instant::now();
        }

        match worker.process_next().await {
            Ok(true) => {
                tracing::debug!("Import handled, checking for next one");
            }
            Ok(false) => {
                tracing::trace!("No imports queued, sleeping");
                sleep(poll_interval).await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Error handling import, will retry");
                sleep(poll_interval).await;
            }
        }
    }
}

impl Worker {
    async fn reap(&self) {
        if let Err(e) = self.importer.reap_stale_jobs(self.stale_after).await {
            tracing::error!(error = %e, "Failed to reap stale rate imports");
        }
    }

    /// Handle the next queued import.
    /// Returns Ok(true) if an import was dequeued, Ok(false) if the queue is empty.
    async fn process_next(&self) -> Result<bool, Box<dyn std::error::Error>> {
        let depth = self.queue.queue_depth().await?;
        metrics::gauge!("rate_import_queue_depth").set(depth as f64);

        let import = match self.queue.dequeue().await? {
            Some(import) => import,
            None => return Ok(false),
        };

        tracing::info!(
            job_id = %import.job_id,
            courier_id = import.courier_id,
            file_key = %import.file_key,
            "Processing rate import"
        );

        let bytes = match self.storage.download(&import.file_key).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(job_id = %import.job_id, error = %e, "Rate sheet download failed");
                self.release(&import, "Rate sheet could not be downloaded").await;
                self.queue.complete(&import).await?;
                return Ok(true);
            }
        };

        match self.importer.run_job(import.job_id, bytes).await {
            Ok(job) => {
                tracing::info!(
                    job_id = %job.id,
                    status = %job.status,
                    message = %job.message,
                    "Rate import finished"
                );
                if let Err(e) = self.storage.delete(&import.file_key).await {
                    tracing::warn!(job_id = %job.id, error = %e, "Failed to delete rate sheet");
                }
            }
            Err(ImportError::Store(StoreError::InvalidTransition { from, .. })) => {
                // Duplicate delivery; another worker owns or finished it
                tracing::warn!(job_id = %import.job_id, status = %from, "Import not claimable, dropping");
            }
            Err(ImportError::JobNotFound(_)) => {
                tracing::warn!(job_id = %import.job_id, "Import job missing, dropping");
            }
            Err(e) => {
                tracing::error!(job_id = %import.job_id, error = %e, "Rate import aborted");
                self.release(&import, "Import aborted by a storage error").await;
            }
        }

        self.queue.complete(&import).await?;
        Ok(true)
    }

    /// Fail the job so the courier can upload again.
    async fn release(&self, import: &QueuedImport, message: &str) {
        match self.importer.fail_job(import.job_id, message).await {
            Ok(_) | Err(ImportError::Store(StoreError::InvalidTransition { .. })) => {}
            Err(e) => {
                tracing::error!(job_id = %import.job_id, error = %e, "Failed to mark import failed")
            }
        }
    }
}

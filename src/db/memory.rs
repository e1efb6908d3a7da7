//! In-process job and rate store.
//!
//! Mirrors the PostgreSQL store's constraints (unique rate key, one active
//! import per courier, conditional status writes) for tests and local runs
//! without a database.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::job::{ImportCounts, ImportJob, ImportStatus, JobProgress, NewImportJob};
use crate::models::rate::{Destination, RateFilter, RatePage, RateRecord, RateUpsert, ServiceType};
use crate::services::repository::{ImportJobStore, RateRepository, StoreError};

type RateKey = (i64, Destination, ServiceType);

#[derive(Default)]
pub struct MemoryStore {
    jobs: Mutex<Vec<ImportJob>>,
    rates: Mutex<HashMap<RateKey, RateRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn jobs(&self) -> MutexGuard<'_, Vec<ImportJob>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn rates(&self) -> MutexGuard<'_, HashMap<RateKey, RateRecord>> {
        self.rates.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply `update` to a job whose status is one of `allowed`.
    fn transition(
        &self,
        job_id: Uuid,
        allowed: &[ImportStatus],
        to: ImportStatus,
        update: impl FnOnce(&mut ImportJob),
    ) -> Result<ImportJob, StoreError> {
        let mut jobs = self.jobs();
        let job = jobs
            .iter_mut()
            .find(|j| j.id == job_id)
            .ok_or(StoreError::JobNotFound(job_id))?;

        if !allowed.contains(&job.status) {
            return Err(StoreError::InvalidTransition {
                job_id,
                from: job.status,
                to,
            });
        }

        update(job);
        job.updated_at = Utc::now();
        Ok(job.clone())
    }
}

fn apply_progress(job: &mut ImportJob, progress: &JobProgress) {
    job.progress = job.progress.max(progress.progress);
    job.message = progress.message.clone();
    job.counts = progress.counts;
    job.errors = progress.errors.clone();
}

#[async_trait]
impl ImportJobStore for MemoryStore {
    async fn create_job(&self, job: NewImportJob) -> Result<ImportJob, StoreError> {
        let mut jobs = self.jobs();
        if let Some(active) = jobs
            .iter()
            .find(|j| j.courier_id == job.courier_id && j.status.is_active())
        {
            return Err(StoreError::ActiveImportExists {
                courier_id: job.courier_id,
                job_id: Some(active.id),
            });
        }

        let now = Utc::now();
        let created = ImportJob {
            id: job.id,
            courier_id: job.courier_id,
            status: ImportStatus::Queued,
            progress: 0,
            message: "Waiting for a worker".to_string(),
            format: job.format,
            file_key: job.file_key,
            counts: ImportCounts::default(),
            errors: Vec::new(),
            created_at: now,
            updated_at: now,
            started_at: None,
            finished_at: None,
        };
        jobs.push(created.clone());
        Ok(created)
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<ImportJob>, StoreError> {
        Ok(self.jobs().iter().find(|j| j.id == job_id).cloned())
    }

    async fn list_active(&self, courier_id: Option<i64>) -> Result<Vec<ImportJob>, StoreError> {
        Ok(self
            .jobs()
            .iter()
            .filter(|j| j.status.is_active())
            .filter(|j| courier_id.map_or(true, |c| j.courier_id == c))
            .cloned()
            .collect())
    }

    async fn claim_job(&self, job_id: Uuid, message: &str) -> Result<ImportJob, StoreError> {
        self.transition(
            job_id,
            &[ImportStatus::Queued],
            ImportStatus::Processing,
            |job| {
                job.status = ImportStatus::Processing;
                job.message = message.to_string();
                job.started_at = Some(Utc::now());
            },
        )
    }

    async fn save_progress(&self, job_id: Uuid, progress: &JobProgress) -> Result<(), StoreError> {
        self.transition(
            job_id,
            &[ImportStatus::Processing],
            ImportStatus::Processing,
            |job| apply_progress(job, progress),
        )
        .map(|_| ())
    }

    async fn finish_job(
        &self,
        job_id: Uuid,
        status: ImportStatus,
        progress: &JobProgress,
    ) -> Result<ImportJob, StoreError> {
        self.transition(
            job_id,
            &[ImportStatus::Queued, ImportStatus::Processing],
            status,
            |job| {
                apply_progress(job, progress);
                job.status = status;
                job.finished_at = Some(Utc::now());
            },
        )
    }

    async fn fail_job(&self, job_id: Uuid, message: &str) -> Result<ImportJob, StoreError> {
        self.transition(
            job_id,
            &[ImportStatus::Queued, ImportStatus::Processing],
            ImportStatus::Failed,
            |job| {
                job.status = ImportStatus::Failed;
                job.message = message.to_string();
                job.finished_at = Some(Utc::now());
            },
        )
    }

    async fn fail_stale_jobs(
        &self,
        cutoff: DateTime<Utc>,
        message: &str,
    ) -> Result<Vec<Uuid>, StoreError> {
        let now = Utc::now();
        let mut failed = Vec::new();
        for job in self.jobs().iter_mut() {
            if job.status == ImportStatus::Processing && job.updated_at < cutoff {
                job.status = ImportStatus::Failed;
                job.message = message.to_string();
                job.finished_at = Some(now);
                job.updated_at = now;
                failed.push(job.id);
            }
        }
        Ok(failed)
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack
        .to_lowercase()
        .contains(&needle.trim().to_lowercase())
}

fn matches_filter(record: &RateRecord, filter: &RateFilter) -> bool {
    let dest = &record.destination;
    let part = |value: &Option<String>, field: &str| {
        value
            .as_deref()
            .filter(|v| !v.trim().is_empty())
            .map_or(true, |v| contains_ci(field, v))
    };

    filter.courier_id.map_or(true, |c| record.courier_id == c)
        && part(&filter.province, &dest.province)
        && part(&filter.city, &dest.city)
        && part(&filter.district, &dest.district)
        && filter.service_type.map_or(true, |s| record.service_type == s)
        && filter
            .search
            .as_deref()
            .filter(|v| !v.trim().is_empty())
            .map_or(true, |s| {
                contains_ci(&dest.province, s)
                    || contains_ci(&dest.city, s)
                    || contains_ci(&dest.district, s)
                    || record.sla.as_deref().is_some_and(|sla| contains_ci(sla, s))
            })
}

#[async_trait]
impl RateRepository for MemoryStore {
    async fn upsert(&self, rate: &RateUpsert) -> Result<RateRecord, StoreError> {
        let key = (rate.courier_id, rate.destination.clone(), rate.service_type);
        let now = Utc::now();
        let mut rates = self.rates();

        let record = rates.entry(key).or_insert_with(|| RateRecord {
            id: Uuid::new_v4(),
            courier_id: rate.courier_id,
            destination: rate.destination.clone(),
            service_type: rate.service_type,
            rate: None,
            sla: None,
            available: false,
            created_at: now,
            updated_at: now,
        });
        record.rate = rate.rate;
        record.sla = rate.sla.clone();
        record.available = rate.available();
        record.updated_at = now;

        Ok(record.clone())
    }

    async fn find(
        &self,
        courier_id: i64,
        destination: &Destination,
        service_type: ServiceType,
    ) -> Result<Option<RateRecord>, StoreError> {
        let key = (courier_id, destination.clone(), service_type);
        Ok(self.rates().get(&key).cloned())
    }

    async fn list(&self, filter: &RateFilter) -> Result<RatePage, StoreError> {
        let mut matched: Vec<RateRecord> = self
            .rates()
            .values()
            .filter(|r| matches_filter(r, filter))
            .cloned()
            .collect();
        matched.sort_by(|a, b| {
            let key = |r: &RateRecord| {
                (
                    r.destination.province.clone(),
                    r.destination.city.clone(),
                    r.destination.district.clone(),
                    r.service_type.position(),
                )
            };
            key(a).cmp(&key(b))
        });

        let total = matched.len() as i64;
        let items = matched
            .into_iter()
            .skip(filter.offset() as usize)
            .take(filter.limit() as usize)
            .collect();

        Ok(RatePage {
            items,
            total,
            page: filter.page.max(1),
            per_page: filter.limit() as u32,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::job::SheetFormat;
    use chrono::Duration;

    fn destination(city: &str, district: &str) -> Destination {
        Destination {
            province: "Jawa Barat".to_string(),
            city: city.to_string(),
            district: district.to_string(),
        }
    }

    fn new_job(courier_id: i64) -> NewImportJob {
        NewImportJob {
            id: Uuid::new_v4(),
            courier_id,
            format: SheetFormat::Csv,
            file_key: format!("rate-imports/{}/sheet.csv", courier_id),
        }
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent_per_key() {
        let store = MemoryStore::new();
        let mut rate = RateUpsert {
            courier_id: 1,
            destination: destination("Bandung", "Coblong"),
            service_type: ServiceType::Eco,
            rate: Some(25000.0),
            sla: Some("2-3 hari".to_string()),
        };

        let first = store.upsert(&rate).await.unwrap();
        rate.rate = Some(27000.0);
        let second = store.upsert(&rate).await.unwrap();

        assert_eq!(first.id, second.id);
        let page = store.list(&RateFilter::default()).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].rate, Some(27000.0));
        assert!(page.items[0].available);
    }

    #[tokio::test]
    async fn test_rate_without_price_is_unavailable() {
        let store = MemoryStore::new();
        let record = store
            .upsert(&RateUpsert {
                courier_id: 1,
                destination: destination("Bandung", "Coblong"),
                service_type: ServiceType::Sds,
                rate: None,
                sla: Some("1 hari".to_string()),
            })
            .await
            .unwrap();
        assert!(!record.available);
    }

    #[tokio::test]
    async fn test_list_filters_and_orders() {
        let store = MemoryStore::new();
        for (city, district, service) in [
            ("Bandung", "Coblong", ServiceType::Reg),
            ("Bandung", "Coblong", ServiceType::Eco),
            ("Bekasi", "Medan Satria", ServiceType::Eco),
        ] {
            store
                .upsert(&RateUpsert {
                    courier_id: 1,
                    destination: destination(city, district),
                    service_type: service,
                    rate: Some(10000.0),
                    sla: Some("2 hari".to_string()),
                })
                .await
                .unwrap();
        }

        let page = store
            .list(&RateFilter {
                city: Some("band".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.items[0].service_type, ServiceType::Eco);
        assert_eq!(page.items[1].service_type, ServiceType::Reg);

        let page = store
            .list(&RateFilter {
                search: Some("satria".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.total, 1);

        let page = store
            .list(&RateFilter {
                courier_id: Some(2),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.total, 0);
    }

    #[tokio::test]
    async fn test_one_active_job_per_courier() {
        let store = MemoryStore::new();
        let first = store.create_job(new_job(9)).await.unwrap();
        assert_eq!(first.status, ImportStatus::Queued);

        let err = store.create_job(new_job(9)).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::ActiveImportExists { courier_id: 9, job_id: Some(id) } if id == first.id
        ));

        // Other couriers are unaffected
        assert!(store.create_job(new_job(10)).await.is_ok());

        store.claim_job(first.id, "Reading").await.unwrap();
        assert!(store.create_job(new_job(9)).await.is_err());

        store
            .finish_job(first.id, ImportStatus::Completed, &JobProgress::default())
            .await
            .unwrap();
        assert!(store.create_job(new_job(9)).await.is_ok());
    }

    #[tokio::test]
    async fn test_terminal_jobs_are_immutable() {
        let store = MemoryStore::new();
        let job = store.create_job(new_job(3)).await.unwrap();
        store.fail_job(job.id, "Rate sheet missing").await.unwrap();

        let err = store.claim_job(job.id, "Reading").await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::InvalidTransition {
                from: ImportStatus::Failed,
                to: ImportStatus::Processing,
                ..
            }
        ));
        assert!(store
            .finish_job(job.id, ImportStatus::Completed, &JobProgress::default())
            .await
            .is_err());
        assert!(store
            .save_progress(job.id, &JobProgress::default())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_progress_never_moves_backwards() {
        let store = MemoryStore::new();
        let job = store.create_job(new_job(4)).await.unwrap();
        store.claim_job(job.id, "Reading").await.unwrap();

        let mut progress = JobProgress {
            progress: 40,
            ..Default::default()
        };
        store.save_progress(job.id, &progress).await.unwrap();
        progress.progress = 10;
        store.save_progress(job.id, &progress).await.unwrap();

        let job = store.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(job.progress, 40);
    }

    #[tokio::test]
    async fn test_fail_stale_jobs_only_touches_processing() {
        let store = MemoryStore::new();
        let queued = store.create_job(new_job(5)).await.unwrap();
        let running = store.create_job(new_job(6)).await.unwrap();
        store.claim_job(running.id, "Reading").await.unwrap();

        let cutoff = Utc::now() + Duration::minutes(1);
        let failed = store
            .fail_stale_jobs(cutoff, "Import interrupted")
            .await
            .unwrap();

        assert_eq!(failed, vec![running.id]);
        let queued = store.get_job(queued.id).await.unwrap().unwrap();
        assert_eq!(queued.status, ImportStatus::Queued);
    }
}

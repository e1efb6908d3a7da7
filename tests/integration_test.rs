//! PostgreSQL store and Redis queue against real services
//!
//! Requires a running PostgreSQL and Redis instance configured via
//! environment variables (DATABASE_URL, REDIS_URL, R2_*).
//!
//! Run with: cargo test --test integration_test -- --ignored

mod fixtures;

use std::sync::Arc;

use courier_rates::{
    config::AppConfig,
    db::{self, PgStore},
    models::job::{ImportStatus, NewImportJob, SheetFormat},
    models::rate::{Destination, RateFilter, RateUpsert, ServiceType},
    services::{
        importer::ImportService,
        queue::{ImportQueue, QueuedImport},
        repository::{ImportJobStore, RateRepository, StoreError},
    },
};
use fixtures::*;
use uuid::Uuid;

async fn pg_store() -> PgStore {
    let config = AppConfig::from_env().expect("Failed to load config");
    let pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");
    db::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");
    PgStore::new(pool)
}

fn courier_id() -> i64 {
    2_000_000 + (Uuid::new_v4().as_u128() as i64).rem_euclid(1_000_000_000)
}

#[tokio::test]
#[ignore]
async fn test_pg_active_job_constraint() {
    let store = pg_store().await;
    let courier = courier_id();

    let new_job = |id: Uuid| NewImportJob {
        id,
        courier_id: courier,
        format: SheetFormat::Csv,
        file_key: format!("test/{}.csv", id),
    };

    let first = store
        .create_job(new_job(Uuid::new_v4()))
        .await
        .expect("Failed to create job");
    assert_eq!(first.status, ImportStatus::Queued);

    let err = store
        .create_job(new_job(Uuid::new_v4()))
        .await
        .expect_err("Second active job must be refused");
    assert!(matches!(
        err,
        StoreError::ActiveImportExists { job_id: Some(id), .. } if id == first.id
    ));

    store
        .fail_job(first.id, "test cleanup")
        .await
        .expect("Failed to fail job");
    store
        .create_job(new_job(Uuid::new_v4()))
        .await
        .expect("Lock should be released after a terminal state");
}

#[tokio::test]
#[ignore]
async fn test_pg_upsert_and_list() {
    let store = pg_store().await;
    let courier = courier_id();
    let destination = Destination {
        province: "Jawa Barat".to_string(),
        city: "Bandung".to_string(),
        district: "Coblong".to_string(),
    };

    let mut rate = RateUpsert {
        courier_id: courier,
        destination: destination.clone(),
        service_type: ServiceType::Reg,
        rate: Some(32000.0),
        sla: Some("1-2 hari".to_string()),
    };
    let first = store.upsert(&rate).await.expect("Upsert failed");
    rate.rate = None;
    let second = store.upsert(&rate).await.expect("Upsert failed");

    assert_eq!(first.id, second.id);
    assert!(!second.available);

    let page = store
        .list(&RateFilter {
            courier_id: Some(courier),
            city: Some("BAND".to_string()),
            ..Default::default()
        })
        .await
        .expect("Listing failed");
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].rate, None);
}

#[tokio::test]
#[ignore]
async fn test_pg_import_flow() {
    let store = Arc::new(pg_store().await);
    let service = ImportService::new(store.clone(), store.clone());
    let courier = courier_id();
    let job_id = Uuid::new_v4();

    service
        .create_job(courier, SheetFormat::Csv, format!("test/{}.csv", job_id), job_id)
        .await
        .expect("Failed to create job");
    let done = service
        .run_job(job_id, bulk_sheet(150))
        .await
        .expect("Import failed to run");

    assert_eq!(done.status, ImportStatus::Completed);
    assert_eq!(done.progress, 100);
    assert_eq!(done.counts.processed, 150);

    let page = store
        .list(&RateFilter {
            courier_id: Some(courier),
            page: 2,
            per_page: 100,
            ..Default::default()
        })
        .await
        .expect("Listing failed");
    assert_eq!(page.total, 150);
    assert_eq!(page.items.len(), 50);
}

#[tokio::test]
#[ignore]
async fn test_redis_queue_roundtrip() {
    let config = AppConfig::from_env().expect("Failed to load config");
    let queue = ImportQueue::new(&config.redis_url).expect("Failed to initialize queue");

    let import = QueuedImport {
        job_id: Uuid::new_v4(),
        courier_id: courier_id(),
        format: SheetFormat::Xlsx,
        file_key: "test/queue.xlsx".to_string(),
    };
    queue.enqueue(&import).await.expect("Failed to enqueue");

    // Drain until our payload shows up; other tests may share the queue
    let mut seen = None;
    while let Some(dequeued) = queue.dequeue().await.expect("Failed to dequeue") {
        let ours = dequeued.job_id == import.job_id;
        queue.complete(&dequeued).await.expect("Failed to complete");
        if ours {
            seen = Some(dequeued);
            break;
        }
    }
    assert_eq!(seen, Some(import));
}

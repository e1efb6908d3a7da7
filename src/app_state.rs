use sqlx::PgPool;
use std::sync::Arc;

use crate::db::PgStore;
use crate::services::{
    importer::ImportService, queue::ImportQueue, repository::RateRepository, storage::R2Client,
};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub storage: Arc<R2Client>,
    pub queue: Arc<ImportQueue>,
    pub importer: ImportService,
    pub rates: Arc<dyn RateRepository>,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(db: PgPool, storage: R2Client, queue: ImportQueue, max_upload_bytes: usize) -> Self {
        let store = Arc::new(PgStore::new(db.clone()));
        Self {
            db,
            storage: Arc::new(storage),
            queue: Arc::new(queue),
            importer: ImportService::new(store.clone(), store.clone()),
            rates: store,
            max_upload_bytes,
        }
    }
}

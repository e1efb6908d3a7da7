use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post, put};
use axum::Router;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use courier_rates::app_state::AppState;
use courier_rates::config::AppConfig;
use courier_rates::db;
use courier_rates::routes;
use courier_rates::services::{queue::ImportQueue, storage::R2Client};

/// Room for multipart framing around the sheet itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing courier-rates server");

    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);

    metrics::describe_counter!("rate_import_jobs_total", "Rate imports submitted");
    metrics::describe_counter!("rate_import_jobs_completed", "Rate imports completed");
    metrics::describe_counter!("rate_import_jobs_failed", "Rate imports that failed");
    metrics::describe_counter!("rate_import_rows_total", "Rate sheet data rows consumed");
    metrics::describe_histogram!(
        "rate_import_processing_seconds",
        "Time to process one rate import"
    );
    metrics::describe_gauge!(
        "rate_import_queue_depth",
        "Rate imports waiting for a worker"
    );

    tracing::info!("Connecting to PostgreSQL database");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    tracing::info!("Running database migrations");
    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run database migrations");

    tracing::info!("Initializing R2 storage client");
    let r2_client = R2Client::new(
        &config.r2_bucket,
        &config.r2_endpoint,
        &config.r2_access_key,
        &config.r2_secret_key,
    )
    .expect("Failed to initialize R2 client");

    tracing::info!("Connecting to Redis import queue");
    let queue = ImportQueue::new(&config.redis_url).expect("Failed to initialize import queue");

    let state = AppState::new(db_pool, r2_client, queue, config.max_upload_bytes);

    // Oversized multipart bodies surface in the handler as FILE_TOO_LARGE;
    // the outer layer is a hard cap for anything else.
    let body_limit = config.max_upload_bytes + MULTIPART_OVERHEAD;

    let app = Router::new()
        .route("/health", get(routes::health::health_check))
        .route(
            "/api/v1/couriers/{courier_id}/rate-imports",
            post(routes::imports::submit_import),
        )
        .route(
            "/api/v1/couriers/{courier_id}/rates",
            put(routes::rates::upsert_rate),
        )
        .route(
            "/api/v1/rate-imports/active",
            get(routes::imports::list_active_imports),
        )
        .route(
            "/api/v1/rate-imports/{job_id}",
            get(routes::imports::get_import_status),
        )
        .route("/api/v1/rates", get(routes::rates::list_rates))
        .route("/api/v1/rates/validate", post(routes::rates::validate_field))
        .with_state(state)
        .route(
            "/metrics",
            get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(body_limit * 2));

    tracing::info!("Starting courier-rates on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await.expect("Server error");
}

//! End-to-end tests against a running stack
//!
//! These tests require:
//! 1. PostgreSQL database running (with migrations applied)
//! 2. Redis running
//! 3. API server running on configured port
//! 4. Worker process running
//! 5. R2 credentials configured for both processes
//!
//! Run with: cargo test --test e2e_test -- --ignored --nocapture
//!
//! Set API_BASE_URL to override default (http://localhost:3000)

mod fixtures;
mod helpers;

use fixtures::*;
use helpers::*;

/// Get base URL from env or default to localhost
fn get_base_url() -> String {
    std::env::var("API_BASE_URL").unwrap_or_else(|_| "http://localhost:3000".to_string())
}

#[tokio::test]
#[ignore] // Requires running API server, worker, and all infrastructure
async fn test_e2e_health_check() {
    let base_url = get_base_url();
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/health", base_url))
        .send()
        .await
        .expect("Health check failed");

    assert!(
        response.status().is_success(),
        "Health check returned non-success status: {}",
        response.status()
    );
}

#[tokio::test]
#[ignore]
async fn test_e2e_mixed_sheet_import() {
    let base_url = get_base_url();
    let client = reqwest::Client::new();
    let courier_id = unique_courier_id();

    let submitted = submit_csv(&client, &base_url, courier_id, mixed_sheet())
        .await
        .expect("Failed to upload rate sheet");
    assert_eq!(submitted.status, "queued");

    let (job, observed) = poll_job_status(&client, &base_url, submitted.job_id, 60)
        .await
        .expect("Failed to wait for import");

    assert_eq!(job.status, "completed", "{}", job.message);
    assert_eq!(job.progress, 100);
    assert!(observed.windows(2).all(|w| w[0] <= w[1]), "{:?}", observed);

    let summary = job.summary.expect("terminal job has a summary");
    assert_eq!(summary.processed, 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.rejected, 1);
    assert!(summary.errors[0].contains("invalid rate"));

    let rates: serde_json::Value = client
        .get(format!("{}/api/v1/rates", base_url))
        .query(&[("courier_id", courier_id.to_string())])
        .send()
        .await
        .expect("Rate listing failed")
        .json()
        .await
        .expect("Rate listing is JSON");
    assert_eq!(rates["total"], 1);
    assert_eq!(rates["items"][0]["service_type"], "ECO");
    assert_eq!(rates["items"][0]["district"], "Coblong");
}

#[tokio::test]
#[ignore]
async fn test_e2e_second_upload_conflicts() {
    let base_url = get_base_url();
    let client = reqwest::Client::new();
    let courier_id = unique_courier_id();

    let first = submit_csv(&client, &base_url, courier_id, bulk_sheet(2000))
        .await
        .expect("Failed to upload rate sheet");

    let response = upload_rate_sheet(
        &client,
        &base_url,
        courier_id,
        "rates.csv",
        "text/csv",
        bulk_sheet(5),
    )
    .await
    .expect("Second upload request failed");

    // The first import may already be done on a fast worker
    if response.status() == reqwest::StatusCode::CONFLICT {
        let body: ErrorBody = response.json().await.expect("Error body is JSON");
        assert_eq!(body.code, "ACTIVE_IMPORT_EXISTS");
        assert_eq!(body.job_id, Some(first.job_id));
    }

    poll_job_status(&client, &base_url, first.job_id, 300)
        .await
        .expect("First import did not finish");
}

#[tokio::test]
#[ignore]
async fn test_e2e_upload_rejections() {
    let base_url = get_base_url();
    let client = reqwest::Client::new();
    let courier_id = unique_courier_id();

    let response = upload_rate_sheet(
        &client,
        &base_url,
        courier_id,
        "rates.png",
        "image/png",
        vec![0x89, b'P', b'N', b'G'],
    )
    .await
    .expect("Upload request failed");
    assert_eq!(response.status(), reqwest::StatusCode::UNSUPPORTED_MEDIA_TYPE);
    let body: ErrorBody = response.json().await.expect("Error body is JSON");
    assert_eq!(body.code, "INVALID_FORMAT");

    let response = client
        .post(format!(
            "{}/api/v1/couriers/{}/rate-imports",
            base_url, courier_id
        ))
        .multipart(reqwest::multipart::Form::new().text("note", "no file here"))
        .send()
        .await
        .expect("Upload request failed");
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: ErrorBody = response.json().await.expect("Error body is JSON");
    assert_eq!(body.code, "NO_FILE");

    let response = upload_rate_sheet(
        &client,
        &base_url,
        courier_id,
        "rates.csv",
        "text/csv",
        vec![b','; 11 * 1024 * 1024],
    )
    .await
    .expect("Upload request failed");
    assert_eq!(response.status(), reqwest::StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
#[ignore]
async fn test_e2e_unknown_job_is_404() {
    let base_url = get_base_url();
    let client = reqwest::Client::new();

    let response = client
        .get(format!(
            "{}/api/v1/rate-imports/{}",
            base_url,
            uuid::Uuid::new_v4()
        ))
        .send()
        .await
        .expect("Status request failed");
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
}

#[tokio::test]
#[ignore]
async fn test_e2e_field_validation() {
    let base_url = get_base_url();
    let client = reqwest::Client::new();

    let check: serde_json::Value = client
        .post(format!("{}/api/v1/rates/validate", base_url))
        .json(&serde_json::json!({ "field": "sla", "value": "cepat" }))
        .send()
        .await
        .expect("Validate request failed")
        .json()
        .await
        .expect("Validate response is JSON");

    assert_eq!(check["valid"], false);
    assert!(check["message"].as_str().unwrap_or("").contains("SLA"));
}

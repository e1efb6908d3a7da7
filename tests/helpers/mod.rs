//! HTTP helpers for end-to-end tests against a running API and worker
#![allow(dead_code)]

use reqwest::multipart;
use serde::Deserialize;
use std::time::Duration;
use tokio::time::sleep;
use uuid::Uuid;

/// Response from POST /api/v1/couriers/{courier_id}/rate-imports
#[derive(Debug, Deserialize)]
pub struct SubmitResponse {
    pub job_id: Uuid,
    pub status: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct ImportSummary {
    pub processed: i32,
    pub skipped: i32,
    pub rejected: i32,
    pub errors: Vec<String>,
}

/// Response from GET /api/v1/rate-imports/{job_id}
#[derive(Debug, Deserialize)]
pub struct JobStatusResponse {
    pub job_id: Uuid,
    pub courier_id: i64,
    pub status: String,
    pub progress: i32,
    pub message: String,
    pub total_rows: i32,
    pub rows_consumed: i32,
    pub summary: Option<ImportSummary>,
}

/// Error body returned by every failing endpoint
#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: String,
    pub job_id: Option<Uuid>,
}

/// Upload a rate sheet. Returns the raw response so callers can check
/// rejection codes as well as the accepted path.
pub async fn upload_rate_sheet(
    client: &reqwest::Client,
    base_url: &str,
    courier_id: i64,
    file_name: &str,
    mime: &str,
    bytes: Vec<u8>,
) -> Result<reqwest::Response, Box<dyn std::error::Error>> {
    let form = multipart::Form::new().part(
        "file",
        multipart::Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(mime)?,
    );

    let response = client
        .post(format!(
            "{}/api/v1/couriers/{}/rate-imports",
            base_url, courier_id
        ))
        .multipart(form)
        .send()
        .await?;

    Ok(response)
}

/// Upload a CSV sheet and expect it to be queued
pub async fn submit_csv(
    client: &reqwest::Client,
    base_url: &str,
    courier_id: i64,
    bytes: Vec<u8>,
) -> Result<SubmitResponse, Box<dyn std::error::Error>> {
    let response =
        upload_rate_sheet(client, base_url, courier_id, "rates.csv", "text/csv", bytes).await?;

    let status = response.status();
    if status != reqwest::StatusCode::ACCEPTED {
        let error_text = response.text().await?;
        return Err(format!("Upload failed with status {}: {}", status, error_text).into());
    }

    Ok(response.json::<SubmitResponse>().await?)
}

/// Poll job status until completed or failed, collecting observed progress
pub async fn poll_job_status(
    client: &reqwest::Client,
    base_url: &str,
    job_id: Uuid,
    timeout_secs: u64,
) -> Result<(JobStatusResponse, Vec<i32>), Box<dyn std::error::Error>> {
    let max_attempts = timeout_secs * 4; // Poll every 250ms
    let mut observed = Vec::new();

    for attempt in 0..max_attempts {
        let response = client
            .get(format!("{}/api/v1/rate-imports/{}", base_url, job_id))
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(format!("Status check failed: {}", error_text).into());
        }

        let status = response.json::<JobStatusResponse>().await?;
        observed.push(status.progress);

        match status.status.as_str() {
            "completed" | "failed" => return Ok((status, observed)),
            "queued" | "processing" => {
                if attempt % 20 == 0 && attempt > 0 {
                    println!("  ... still waiting (attempt {}/{})", attempt, max_attempts);
                }
                sleep(Duration::from_millis(250)).await;
            }
            other => return Err(format!("Unknown job status: {}", other).into()),
        }
    }

    Err(format!("Job did not finish within {} seconds", timeout_secs).into())
}

/// Courier id unlikely to collide with other runs against the same database
pub fn unique_courier_id() -> i64 {
    let seed = Uuid::new_v4().as_u128() as i64;
    1_000_000 + seed.rem_euclid(1_000_000_000)
}

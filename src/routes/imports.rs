use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use garde::Validate;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::models::api::{
    ActiveImportsQuery, ActiveImportsResponse, ImportJobResponse, ImportSubmitResponse,
};
use crate::models::job::SheetFormat;
use crate::routes::error::{ApiError, ApiResult};
use crate::services::queue::QueuedImport;
use crate::services::storage::sheet_key;

/// Uploaded sheet taken from the multipart body.
struct UploadedSheet {
    format: SheetFormat,
    bytes: Vec<u8>,
}

/// POST /api/v1/couriers/{courier_id}/rate-imports: queue a rate sheet import.
pub async fn submit_import(
    State(state): State<AppState>,
    Path(courier_id): Path<i64>,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<ImportSubmitResponse>)> {
    if courier_id < 1 {
        return Err(ApiError::BadRequest(format!("Invalid courier id {}", courier_id)));
    }

    let limit = state.max_upload_bytes;
    let mut sheet: Option<UploadedSheet> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::from_multipart(e, limit))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let content_type = field.content_type().map(str::to_string);
        let file_name = field.file_name().map(str::to_string);
        let format = SheetFormat::from_upload(content_type.as_deref(), file_name.as_deref())
            .ok_or_else(|| {
                ApiError::InvalidFormat(
                    content_type
                        .clone()
                        .or(file_name.clone())
                        .unwrap_or_else(|| "unknown".to_string()),
                )
            })?;

        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::from_multipart(e, limit))?;
        if data.len() > limit {
            return Err(ApiError::FileTooLarge { limit });
        }
        if !data.is_empty() {
            sheet = Some(UploadedSheet {
                format,
                bytes: data.to_vec(),
            });
        }
    }

    let sheet = sheet.ok_or(ApiError::NoFile)?;

    // Fast path; the store re-checks when the job is created
    if let Some(active) = state.importer.active_job(courier_id).await? {
        return Err(ApiError::ActiveImport {
            courier_id,
            job_id: Some(active.id),
        });
    }

    let job_id = Uuid::new_v4();
    let file_key = sheet_key(courier_id, job_id, sheet.format);
    state
        .storage
        .upload(&file_key, &sheet.bytes, sheet.format.content_type())
        .await?;

    let job = match state
        .importer
        .create_job(courier_id, sheet.format, file_key.clone(), job_id)
        .await
    {
        Ok(job) => job,
        Err(e) => {
            discard_sheet(&state, &file_key).await;
            return Err(e.into());
        }
    };

    let queued = QueuedImport {
        job_id: job.id,
        courier_id,
        format: job.format,
        file_key: job.file_key.clone(),
    };
    if let Err(e) = state.queue.enqueue(&queued).await {
        tracing::error!(job_id = %job.id, error = %e, "Failed to enqueue rate import");
        if let Err(fail_err) = state.importer.fail_job(job.id, "Could not queue import").await {
            tracing::error!(job_id = %job.id, error = %fail_err, "Failed to release import lock");
        }
        discard_sheet(&state, &file_key).await;
        return Err(e.into());
    }

    if let Ok(depth) = state.queue.queue_depth().await {
        metrics::gauge!("rate_import_queue_depth").set(depth as f64);
    }

    tracing::info!(
        job_id = %job.id,
        courier_id,
        size_bytes = sheet.bytes.len(),
        "Rate sheet accepted"
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(ImportSubmitResponse {
            job_id: job.id,
            status: job.status,
            message: "Rate sheet queued for import".to_string(),
        }),
    ))
}

async fn discard_sheet(state: &AppState, file_key: &str) {
    if let Err(e) = state.storage.delete(file_key).await {
        tracing::warn!(file_key, error = %e, "Failed to delete unused rate sheet");
    }
}

/// GET /api/v1/rate-imports/{job_id}: poll an import job.
pub async fn get_import_status(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<ImportJobResponse>> {
    let job = state
        .importer
        .get_job(job_id)
        .await?
        .ok_or(ApiError::JobNotFound(job_id))?;

    Ok(Json(job.into()))
}

/// GET /api/v1/rate-imports/active: queued and processing imports.
pub async fn list_active_imports(
    State(state): State<AppState>,
    Query(query): Query<ActiveImportsQuery>,
) -> ApiResult<Json<ActiveImportsResponse>> {
    query.validate()?;

    let jobs: Vec<ImportJobResponse> = state
        .importer
        .list_active(query.courier_id)
        .await?
        .into_iter()
        .map(Into::into)
        .collect();

    Ok(Json(ActiveImportsResponse {
        has_active: !jobs.is_empty(),
        jobs,
    }))
}

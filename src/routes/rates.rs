use axum::extract::{Path, Query, State};
use axum::Json;
use garde::Validate;

use crate::app_state::AppState;
use crate::models::api::{FieldCheck, RateListQuery, RateUpsertRequest, ValidateFieldRequest};
use crate::models::rate::{RateFilter, RatePage, RateRecord, RateUpsert, DEFAULT_PAGE_SIZE};
use crate::routes::error::{ApiError, ApiResult};
use crate::services::validation::{
    scalar_text, validate_destination, validate_field as check_field, validate_rate,
    validate_service_type, validate_sla,
};

/// GET /api/v1/rates: filtered, paginated rate listing.
pub async fn list_rates(
    State(state): State<AppState>,
    Query(query): Query<RateListQuery>,
) -> ApiResult<Json<RatePage>> {
    query.validate()?;

    let service_type = query
        .service_type
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(validate_service_type)
        .transpose()?;

    let filter = RateFilter {
        courier_id: query.courier_id,
        province: query.province,
        city: query.city,
        district: query.district,
        service_type,
        search: query.search,
        page: query.page.unwrap_or(1),
        per_page: query.per_page.unwrap_or(DEFAULT_PAGE_SIZE),
    };

    Ok(Json(state.rates.list(&filter).await?))
}

/// PUT /api/v1/couriers/{courier_id}/rates: create or edit one rate.
pub async fn upsert_rate(
    State(state): State<AppState>,
    Path(courier_id): Path<i64>,
    Json(request): Json<RateUpsertRequest>,
) -> ApiResult<Json<RateRecord>> {
    if courier_id < 1 {
        return Err(ApiError::BadRequest(format!("Invalid courier id {}", courier_id)));
    }
    request.validate()?;

    let destination = validate_destination(
        Some(&request.province),
        Some(&request.city),
        Some(&request.district),
    )?;
    let upsert = RateUpsert {
        courier_id,
        destination,
        service_type: validate_service_type(&request.service_type)?,
        rate: validate_rate(scalar_text(&request.rate).as_deref())?,
        sla: validate_sla(request.sla.as_deref())?,
    };

    let record = state.rates.upsert(&upsert).await?;
    tracing::info!(
        courier_id,
        service_type = %record.service_type,
        available = record.available,
        "Rate saved"
    );
    Ok(Json(record))
}

/// POST /api/v1/rates/validate: check one field value.
pub async fn validate_field(Json(request): Json<ValidateFieldRequest>) -> ApiResult<Json<FieldCheck>> {
    request.validate()?;
    Ok(Json(check_field(&request.field, &request.value)))
}

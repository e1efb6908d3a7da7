use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::models::rate::{Destination, RateFilter, RatePage, RateRecord, RateUpsert, ServiceType};
use crate::services::repository::StoreError;

const RATE_COLUMNS: &str = "id, courier_id, province, city, district, service_type, \
     rate::float8 AS rate, sla, available, created_at, updated_at";

/// Sorts service types in sheet column order.
const SERVICE_ORDER: &str =
    "array_position(ARRAY['ECO','REG','ONS','SDS','TRC','T15','T25','T60']::text[], service_type)";

#[derive(Debug, sqlx::FromRow)]
struct RateRow {
    id: Uuid,
    courier_id: i64,
    province: String,
    city: String,
    district: String,
    service_type: String,
    rate: Option<f64>,
    sla: Option<String>,
    available: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<RateRow> for RateRecord {
    type Error = StoreError;

    fn try_from(row: RateRow) -> Result<Self, Self::Error> {
        let service_type: ServiceType = row
            .service_type
            .parse()
            .map_err(|_| StoreError::Corrupt(format!("service type '{}'", row.service_type)))?;

        Ok(RateRecord {
            id: row.id,
            courier_id: row.courier_id,
            destination: Destination {
                province: row.province,
                city: row.city,
                district: row.district,
            },
            service_type,
            rate: row.rate,
            sla: row.sla,
            available: row.available,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Insert a rate, or overwrite rate/SLA/availability at an existing key
pub async fn upsert_rate(pool: &PgPool, rate: &RateUpsert) -> Result<RateRecord, StoreError> {
    let sql = format!(
        r#"
        INSERT INTO courier_rates
            (id, courier_id, province, city, district, service_type, rate, sla, available)
        VALUES ($1, $2, $3, $4, $5, $6, $7::float8, $8, $9)
        ON CONFLICT ON CONSTRAINT uq_courier_rates_key DO UPDATE
        SET rate = EXCLUDED.rate,
            sla = EXCLUDED.sla,
            available = EXCLUDED.available,
            updated_at = NOW()
        RETURNING {RATE_COLUMNS}
        "#
    );

    sqlx::query_as::<_, RateRow>(&sql)
        .bind(Uuid::new_v4())
        .bind(rate.courier_id)
        .bind(&rate.destination.province)
        .bind(&rate.destination.city)
        .bind(&rate.destination.district)
        .bind(rate.service_type.as_ref())
        .bind(rate.rate)
        .bind(&rate.sla)
        .bind(rate.available())
        .fetch_one(pool)
        .await?
        .try_into()
}

/// Find the rate stored at an exact key
pub async fn find_rate(
    pool: &PgPool,
    courier_id: i64,
    destination: &Destination,
    service_type: ServiceType,
) -> Result<Option<RateRecord>, StoreError> {
    let sql = format!(
        r#"
        SELECT {RATE_COLUMNS}
        FROM courier_rates
        WHERE courier_id = $1 AND province = $2 AND city = $3 AND district = $4
          AND service_type = $5
        "#
    );

    sqlx::query_as::<_, RateRow>(&sql)
        .bind(courier_id)
        .bind(&destination.province)
        .bind(&destination.city)
        .bind(&destination.district)
        .bind(service_type.as_ref())
        .fetch_optional(pool)
        .await?
        .map(RateRecord::try_from)
        .transpose()
}

/// Filtered, paginated listing
pub async fn list_rates(pool: &PgPool, filter: &RateFilter) -> Result<RatePage, StoreError> {
    let mut count_query = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM courier_rates");
    push_filters(&mut count_query, filter);
    let total = count_query
        .build_query_scalar::<i64>()
        .fetch_one(pool)
        .await?;

    let mut page_query =
        QueryBuilder::<Postgres>::new(format!("SELECT {RATE_COLUMNS} FROM courier_rates"));
    push_filters(&mut page_query, filter);
    page_query
        .push(format!(" ORDER BY province, city, district, {SERVICE_ORDER}"))
        .push(" LIMIT ")
        .push_bind(filter.limit())
        .push(" OFFSET ")
        .push_bind(filter.offset());

    let items = page_query
        .build_query_as::<RateRow>()
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(RateRecord::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(RatePage {
        items,
        total,
        page: filter.page.max(1),
        per_page: filter.limit() as u32,
    })
}

fn push_filters(query: &mut QueryBuilder<'_, Postgres>, filter: &RateFilter) {
    query.push(" WHERE TRUE");

    if let Some(courier_id) = filter.courier_id {
        query.push(" AND courier_id = ").push_bind(courier_id);
    }
    for (column, value) in [
        ("province", &filter.province),
        ("city", &filter.city),
        ("district", &filter.district),
    ] {
        if let Some(value) = value.as_deref().filter(|v| !v.trim().is_empty()) {
            query
                .push(format!(" AND {column} ILIKE "))
                .push_bind(like_pattern(value));
        }
    }
    if let Some(service_type) = filter.service_type {
        query
            .push(" AND service_type = ")
            .push_bind(service_type.as_ref().to_string());
    }
    if let Some(search) = filter.search.as_deref().filter(|v| !v.trim().is_empty()) {
        let pattern = like_pattern(search);
        query.push(" AND (");
        let mut columns = query.separated(" OR ");
        for column in ["province", "city", "district", "sla"] {
            columns
                .push(format!("{column} ILIKE "))
                .push_bind_unseparated(pattern.clone());
        }
        query.push(")");
    }
}

/// `%value%` with LIKE wildcards escaped.
fn like_pattern(value: &str) -> String {
    let escaped = value
        .trim()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

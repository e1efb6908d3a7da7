use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

/// Courier shipping tiers, in the column order used by rate sheets.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display, AsRefStr,
)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
#[serde(rename_all = "UPPERCASE")]
pub enum ServiceType {
    Eco,
    Reg,
    Ons,
    Sds,
    Trc,
    T15,
    T25,
    T60,
}

impl ServiceType {
    pub const ALL: [ServiceType; 8] = [
        ServiceType::Eco,
        ServiceType::Reg,
        ServiceType::Ons,
        ServiceType::Sds,
        ServiceType::Trc,
        ServiceType::T15,
        ServiceType::T25,
        ServiceType::T60,
    ];

    /// Position of the service in sheet column order (0-based).
    pub fn position(self) -> usize {
        Self::ALL.iter().position(|s| *s == self).unwrap_or(0)
    }

    /// Comma-separated list of all codes, for error messages.
    pub fn valid_codes() -> String {
        Self::ALL
            .iter()
            .map(|s| s.as_ref())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Delivery destination. All three parts are required and stored trimmed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Destination {
    pub province: String,
    pub city: String,
    pub district: String,
}

/// A stored courier rate for one destination and service type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateRecord {
    pub id: Uuid,
    pub courier_id: i64,
    #[serde(flatten)]
    pub destination: Destination,
    pub service_type: ServiceType,
    pub rate: Option<f64>,
    pub sla: Option<String>,
    pub available: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert-or-update payload keyed by (courier, destination, service type).
#[derive(Debug, Clone, PartialEq)]
pub struct RateUpsert {
    pub courier_id: i64,
    pub destination: Destination,
    pub service_type: ServiceType,
    pub rate: Option<f64>,
    pub sla: Option<String>,
}

impl RateUpsert {
    pub fn available(&self) -> bool {
        matches!(self.rate, Some(r) if r >= 0.0)
    }
}

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Listing filter for stored rates. Destination parts match partially and
/// case-insensitively; `search` matches any destination part or the SLA text.
#[derive(Debug, Clone)]
pub struct RateFilter {
    pub courier_id: Option<i64>,
    pub province: Option<String>,
    pub city: Option<String>,
    pub district: Option<String>,
    pub service_type: Option<ServiceType>,
    pub search: Option<String>,
    pub page: u32,
    pub per_page: u32,
}

impl Default for RateFilter {
    fn default() -> Self {
        Self {
            courier_id: None,
            province: None,
            city: None,
            district: None,
            service_type: None,
            search: None,
            page: 1,
            per_page: DEFAULT_PAGE_SIZE,
        }
    }
}

impl RateFilter {
    pub fn limit(&self) -> i64 {
        self.per_page.clamp(1, MAX_PAGE_SIZE) as i64
    }

    pub fn offset(&self) -> i64 {
        (self.page.max(1) as i64 - 1) * self.limit()
    }
}

/// One page of rate listing results.
#[derive(Debug, Clone, Serialize)]
pub struct RatePage {
    pub items: Vec<RateRecord>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
}

use std::str::FromStr;

use serde_json::Value;

use crate::models::api::FieldCheck;
use crate::models::rate::{Destination, ServiceType};

/// Largest rate the `NUMERIC(14, 2)` column holds.
pub const MAX_RATE: f64 = 999_999_999_999.99;

/// Field names accepted by [`validate_field`].
pub const FIELD_NAMES: [&str; 4] = ["rate", "sla", "service_type", "location"];

/// Rejection reasons. The display text is shown to users verbatim.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Rate must be a number, or '-' / 'N/A' when the service is not available")]
    InvalidRate,

    #[error("Rate cannot be negative")]
    NegativeRate,

    #[error("Rate cannot exceed 999999999999.99")]
    RateTooLarge,

    #[error("SLA must state the delivery time in days, e.g. '1-2 days'")]
    InvalidSla,

    #[error("Service type must be one of: {}", ServiceType::valid_codes())]
    InvalidServiceType,

    #[error("Province, city and district are all required")]
    IncompleteDestination,

    #[error("Unknown field '{0}', expected one of: {fields}", fields = FIELD_NAMES.join(", "))]
    UnknownField(String),
}

/// Sentinel cells meaning "not offered": empty, `-` or `N/A`.
pub fn is_unavailable(value: Option<&str>) -> bool {
    match value.map(str::trim) {
        None => true,
        Some(v) => v.is_empty() || v == "-" || v.eq_ignore_ascii_case("n/a"),
    }
}

/// Validate a rate cell. Sentinels yield `None`.
///
/// Currency symbols, spaces and thousands separators other than `.` are
/// stripped before parsing, so `"Rp 150000"` reads as `150000`.
pub fn validate_rate(value: Option<&str>) -> Result<Option<f64>, ValidationError> {
    let raw = match value {
        Some(v) if !is_unavailable(Some(v)) => v.trim(),
        _ => return Ok(None),
    };

    let first_digit = raw
        .find(|c: char| c.is_ascii_digit())
        .ok_or(ValidationError::InvalidRate)?;
    // ASCII hyphen or the typographic minus sign
    if raw[..first_digit]
        .trim_end()
        .ends_with(|c: char| c == '-' || c == '\u{2212}')
    {
        return Err(ValidationError::NegativeRate);
    }

    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let amount: f64 = cleaned.parse().map_err(|_| ValidationError::InvalidRate)?;
    if !amount.is_finite() {
        return Err(ValidationError::InvalidRate);
    }
    if amount > MAX_RATE {
        return Err(ValidationError::RateTooLarge);
    }

    Ok(Some(amount))
}

/// Validate an SLA cell. Sentinels yield `None`; anything else needs a digit.
pub fn validate_sla(value: Option<&str>) -> Result<Option<String>, ValidationError> {
    let raw = match value {
        Some(v) if !is_unavailable(Some(v)) => v.trim(),
        _ => return Ok(None),
    };

    if raw.chars().any(|c| c.is_ascii_digit()) {
        Ok(Some(raw.to_string()))
    } else {
        Err(ValidationError::InvalidSla)
    }
}

pub fn validate_service_type(value: &str) -> Result<ServiceType, ValidationError> {
    ServiceType::from_str(&value.trim().to_ascii_uppercase())
        .map_err(|_| ValidationError::InvalidServiceType)
}

/// Build a destination from its three parts, all of which must be non-blank.
pub fn validate_destination(
    province: Option<&str>,
    city: Option<&str>,
    district: Option<&str>,
) -> Result<Destination, ValidationError> {
    let part = |v: Option<&str>| {
        v.map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .ok_or(ValidationError::IncompleteDestination)
    };

    Ok(Destination {
        province: part(province)?,
        city: part(city)?,
        district: part(district)?,
    })
}

/// Single-field validation used by interactive forms.
///
/// `location` expects an object with `province`, `city` and `district`;
/// the other fields take a string, a number or null.
pub fn validate_field(field: &str, value: &Value) -> FieldCheck {
    let result = match field {
        "rate" => validate_rate(scalar_text(value).as_deref()).map(|_| ()),
        "sla" => validate_sla(scalar_text(value).as_deref()).map(|_| ()),
        "service_type" => {
            validate_service_type(scalar_text(value).as_deref().unwrap_or("")).map(|_| ())
        }
        "location" => {
            let get = |key: &str| value.get(key).and_then(Value::as_str);
            validate_destination(get("province"), get("city"), get("district")).map(|_| ())
        }
        other => Err(ValidationError::UnknownField(other.to_string())),
    };

    FieldCheck {
        field: field.to_string(),
        valid: result.is_ok(),
        message: result.err().map(|e| e.to_string()),
    }
}

/// Text of a JSON scalar as it would appear in a sheet cell.
pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

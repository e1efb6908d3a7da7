use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

/// Maximum number of rejection reasons kept on a job.
pub const ERROR_SAMPLE_LIMIT: usize = 20;

/// Status of a rate import job in the async queue.
///
/// `queued -> processing -> completed | failed`. Terminal states are final.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ImportStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl ImportStatus {
    /// Queued or processing: holds the courier's import lock.
    pub fn is_active(self) -> bool {
        matches!(self, ImportStatus::Queued | ImportStatus::Processing)
    }

    pub fn is_terminal(self) -> bool {
        !self.is_active()
    }
}

/// Accepted upload formats.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SheetFormat {
    Xlsx,
    Xls,
    Csv,
}

const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
const XLS_MIME: &str = "application/vnd.ms-excel";

impl SheetFormat {
    /// Resolve the format from the declared content type. Generic or missing
    /// types fall back to the file extension.
    pub fn from_upload(content_type: Option<&str>, file_name: Option<&str>) -> Option<Self> {
        let extension = file_name
            .and_then(|name| name.rsplit_once('.'))
            .map(|(_, ext)| ext.to_ascii_lowercase());
        let by_extension = || extension.as_deref().and_then(Self::from_extension);

        let mime = content_type
            .map(|ct| ct.split(';').next().unwrap_or("").trim().to_ascii_lowercase())
            .unwrap_or_default();

        match mime.as_str() {
            XLSX_MIME => Some(SheetFormat::Xlsx),
            // Windows browsers declare .csv uploads as application/vnd.ms-excel
            XLS_MIME if extension.as_deref() == Some("csv") => Some(SheetFormat::Csv),
            XLS_MIME => Some(SheetFormat::Xls),
            "text/csv" | "application/csv" | "text/x-csv" => Some(SheetFormat::Csv),
            "" | "application/octet-stream" | "text/plain" => by_extension(),
            _ => None,
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "xlsx" => Some(SheetFormat::Xlsx),
            "xls" => Some(SheetFormat::Xls),
            "csv" => Some(SheetFormat::Csv),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            SheetFormat::Xlsx => "xlsx",
            SheetFormat::Xls => "xls",
            SheetFormat::Csv => "csv",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            SheetFormat::Xlsx => XLSX_MIME,
            SheetFormat::Xls => XLS_MIME,
            SheetFormat::Csv => "text/csv",
        }
    }
}

/// Running counters for an import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportCounts {
    /// Data rows in the sheet.
    pub total_rows: i32,
    /// Data rows consumed so far.
    pub rows_consumed: i32,
    /// Rate records upserted.
    pub processed: i32,
    /// Rows skipped for an incomplete destination.
    pub skipped: i32,
    /// Service-type groups rejected by validation.
    pub rejected: i32,
}

/// A courier rate import job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportJob {
    pub id: Uuid,
    pub courier_id: i64,
    pub status: ImportStatus,
    pub progress: i32,
    pub message: String,
    pub format: SheetFormat,
    pub file_key: String,
    pub counts: ImportCounts,
    pub errors: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Fields needed to queue a new job.
#[derive(Debug, Clone)]
pub struct NewImportJob {
    pub id: Uuid,
    pub courier_id: i64,
    pub format: SheetFormat,
    pub file_key: String,
}

/// Progress snapshot persisted while a job runs and when it finishes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobProgress {
    pub progress: i32,
    pub message: String,
    pub counts: ImportCounts,
    pub errors: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_activity() {
        assert!(ImportStatus::Queued.is_active());
        assert!(ImportStatus::Processing.is_active());
        assert!(ImportStatus::Completed.is_terminal());
        assert!(ImportStatus::Failed.is_terminal());
        assert_eq!(ImportStatus::Processing.as_ref(), "processing");
    }

    #[test]
    fn test_format_from_declared_type() {
        assert_eq!(
            SheetFormat::from_upload(Some(XLSX_MIME), Some("rates.xlsx")),
            Some(SheetFormat::Xlsx)
        );
        assert_eq!(
            SheetFormat::from_upload(Some("application/vnd.ms-excel"), Some("rates.xls")),
            Some(SheetFormat::Xls)
        );
        assert_eq!(
            SheetFormat::from_upload(Some("text/csv; charset=utf-8"), None),
            Some(SheetFormat::Csv)
        );
    }

    #[test]
    fn test_format_csv_declared_as_excel() {
        assert_eq!(
            SheetFormat::from_upload(Some("application/vnd.ms-excel"), Some("RATES.CSV")),
            Some(SheetFormat::Csv)
        );
    }

    #[test]
    fn test_format_generic_type_uses_extension() {
        assert_eq!(
            SheetFormat::from_upload(Some("application/octet-stream"), Some("rates.xlsx")),
            Some(SheetFormat::Xlsx)
        );
        assert_eq!(SheetFormat::from_upload(None, Some("notes.txt")), None);
    }

    #[test]
    fn test_format_rejects_other_types() {
        assert_eq!(
            SheetFormat::from_upload(Some("image/png"), Some("rates.csv")),
            None
        );
        assert_eq!(SheetFormat::from_upload(Some("application/pdf"), None), None);
    }
}

//! CSV import types: report entity, error entries, upload and job payloads

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

/// Import lifecycle: `pending → processing → completed | failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "import_status", rename_all = "lowercase")]
pub enum ImportStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// One entry of a report's error list.
///
/// Row entries describe a rejected CSV line; a batch entry is the single
/// generic record stored when the whole import aborted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ImportErrorDetail {
    Row {
        line: u64,
        name: String,
        cpf: Option<String>,
        errors: Vec<String>,
    },
    Batch {
        error: String,
    },
}

/// Import report entity
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ImportReport {
    pub id: Uuid,
    pub user_id: Uuid,
    pub filename: Option<String>,
    pub status: ImportStatus,
    pub success_count: i32,
    pub error_count: i32,
    pub total_lines: i32,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Sent to clients as `errors_list` on the view
    #[serde(skip_serializing)]
    pub error_details: Json<Vec<ImportErrorDetail>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn percent(part: i32, total: i32) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    (part as f64 / total as f64 * 10_000.0).round() / 100.0
}

impl ImportReport {
    pub fn success_rate(&self) -> f64 {
        percent(self.success_count, self.total_lines)
    }

    pub fn error_rate(&self) -> f64 {
        percent(self.error_count, self.total_lines)
    }

    /// Seconds between start and completion, once both are known
    pub fn duration_seconds(&self) -> Option<i64> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => Some((end - start).num_seconds()),
            _ => None,
        }
    }
}

/// Final counters written when a run completes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub success_count: i32,
    pub error_count: i32,
    pub total_lines: i32,
    pub error_details: Vec<ImportErrorDetail>,
}

/// Report as returned by `import_report.get` and `import_report.list`
#[derive(Debug, Clone, Serialize)]
pub struct ImportReportView {
    #[serde(flatten)]
    pub report: ImportReport,
    pub errors_list: Vec<ImportErrorDetail>,
    pub success_rate: f64,
    pub error_rate: f64,
    pub duration_seconds: Option<i64>,
}

impl From<ImportReport> for ImportReportView {
    fn from(report: ImportReport) -> Self {
        Self {
            errors_list: report.error_details.0.clone(),
            success_rate: report.success_rate(),
            error_rate: report.error_rate(),
            duration_seconds: report.duration_seconds(),
            report,
        }
    }
}

/// Reply of `import_report.latest`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatestImportReport {
    pub import_report_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
}

// ============================================================================
// Upload and queue payloads
// ============================================================================

/// File attached to an upload request, content base64-encoded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadedFile {
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
    pub data: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CsvImportRequest {
    #[serde(default)]
    pub csv_file: Option<UploadedFile>,
}

/// Immediate reply to an accepted upload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CsvImportAccepted {
    pub message: String,
    pub import_report_id: Uuid,
    pub status: String,
    pub total_lines: i32,
}

/// Job placed on the import work queue
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedCsvImportJob {
    pub import_report_id: Uuid,
    pub user_id: Uuid,
    pub csv_content: String,
    pub submitted_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn report(success: i32, errors: i32, total: i32) -> ImportReport {
        let now = Utc::now();
        ImportReport {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            filename: Some("clientes.csv".to_string()),
            status: ImportStatus::Completed,
            success_count: success,
            error_count: errors,
            total_lines: total,
            started_at: Some(now),
            completed_at: Some(now + Duration::seconds(4)),
            error_details: Json(vec![]),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_rates() {
        let r = report(2, 1, 3);
        assert_eq!(r.success_rate(), 66.67);
        assert_eq!(r.error_rate(), 33.33);
        assert_eq!(r.duration_seconds(), Some(4));
    }

    #[test]
    fn test_rates_with_no_lines() {
        let r = report(0, 0, 0);
        assert_eq!(r.success_rate(), 0.0);
        assert_eq!(r.error_rate(), 0.0);
    }

    #[test]
    fn test_row_error_keeps_null_cpf() {
        let detail = ImportErrorDetail::Row {
            line: 2,
            name: "Linha 2".to_string(),
            cpf: None,
            errors: vec!["Nome não pode ficar em branco".to_string()],
        };
        let json = serde_json::to_value(&detail).unwrap();
        assert_eq!(json["line"], 2);
        assert!(json["cpf"].is_null());
    }

    #[test]
    fn test_error_details_deserialize_both_shapes() {
        let json = r#"[{"line":3,"name":"ANA","cpf":"123","errors":["x"]},{"error":"Erro interno: boom"}]"#;
        let details: Vec<ImportErrorDetail> = serde_json::from_str(json).unwrap();
        assert!(matches!(details[0], ImportErrorDetail::Row { line: 3, .. }));
        assert!(matches!(details[1], ImportErrorDetail::Batch { .. }));
    }

    #[test]
    fn test_view_exposes_errors_list() {
        let mut r = report(1, 1, 2);
        r.error_details = Json(vec![ImportErrorDetail::Batch {
            error: "Erro interno: boom".to_string(),
        }]);
        let json = serde_json::to_value(ImportReportView::from(r)).unwrap();
        assert_eq!(json["errors_list"][0]["error"], "Erro interno: boom");
        assert!(json.get("error_details").is_none());
        assert_eq!(json["status"], "completed");
        assert_eq!(json["success_rate"], 50.0);
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(serde_json::to_value(ImportStatus::Processing).unwrap(), "processing");
    }
}

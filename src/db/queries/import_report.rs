//! Import report queries
//!
//! Status transitions are guarded in SQL so a redelivered job cannot move a
//! report backwards or process it twice.

use anyhow::Result;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::types::import_report::{ImportErrorDetail, ImportReport, ImportSummary};

/// Create a report in `pending`
pub async fn create_import_report(
    pool: &PgPool,
    user_id: Uuid,
    filename: Option<&str>,
    total_lines: i32,
) -> Result<ImportReport> {
    let report = sqlx::query_as::<_, ImportReport>(
        r#"
        INSERT INTO import_reports (id, user_id, filename, status, total_lines, created_at, updated_at)
        VALUES ($1, $2, $3, 'pending', $4, NOW(), NOW())
        RETURNING
            id, user_id, filename, status, success_count, error_count, total_lines,
            started_at, completed_at, error_details, created_at, updated_at
        "#
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(filename)
    .bind(total_lines)
    .fetch_one(pool)
    .await?;

    Ok(report)
}

/// `pending → processing`, stamping `started_at`
pub async fn begin_processing(pool: &PgPool, report_id: Uuid) -> Result<Option<ImportReport>> {
    let report = sqlx::query_as::<_, ImportReport>(
        r#"
        UPDATE import_reports
        SET status = 'processing', started_at = NOW(), updated_at = NOW()
        WHERE id = $1 AND status = 'pending'
        RETURNING
            id, user_id, filename, status, success_count, error_count, total_lines,
            started_at, completed_at, error_details, created_at, updated_at
        "#
    )
    .bind(report_id)
    .fetch_optional(pool)
    .await?;

    Ok(report)
}

/// `processing → completed` with final counters
pub async fn complete(pool: &PgPool, report_id: Uuid, summary: &ImportSummary) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE import_reports
        SET
            status = 'completed',
            success_count = $2,
            error_count = $3,
            total_lines = $4,
            error_details = $5,
            completed_at = NOW(),
            updated_at = NOW()
        WHERE id = $1 AND status = 'processing'
        "#
    )
    .bind(report_id)
    .bind(summary.success_count)
    .bind(summary.error_count)
    .bind(summary.total_lines)
    .bind(Json(&summary.error_details))
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// `processing → failed` with the generic error entry
pub async fn fail(pool: &PgPool, report_id: Uuid, details: &[ImportErrorDetail]) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE import_reports
        SET status = 'failed', error_details = $2, completed_at = NOW(), updated_at = NOW()
        WHERE id = $1 AND status = 'processing'
        "#
    )
    .bind(report_id)
    .bind(Json(details))
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Get report by ID
pub async fn get_import_report(
    pool: &PgPool,
    user_id: Uuid,
    report_id: Uuid,
) -> Result<Option<ImportReport>> {
    let report = sqlx::query_as::<_, ImportReport>(
        r#"
        SELECT
            id, user_id, filename, status, success_count, error_count, total_lines,
            started_at, completed_at, error_details, created_at, updated_at
        FROM import_reports
        WHERE id = $1 AND user_id = $2
        "#
    )
    .bind(report_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(report)
}

/// Most recent reports first
pub async fn list_import_reports(
    pool: &PgPool,
    user_id: Uuid,
    limit: i64,
) -> Result<Vec<ImportReport>> {
    let reports = sqlx::query_as::<_, ImportReport>(
        r#"
        SELECT
            id, user_id, filename, status, success_count, error_count, total_lines,
            started_at, completed_at, error_details, created_at, updated_at
        FROM import_reports
        WHERE user_id = $1
        ORDER BY created_at DESC
        LIMIT $2
        "#
    )
    .bind(user_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(reports)
}

//! System-wide client statistics for the public dashboard

use anyhow::Result;
use sqlx::PgPool;

use crate::types::stats::DashboardStats;

pub async fn client_stats(pool: &PgPool) -> Result<DashboardStats> {
    let total_clients: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM clients")
        .fetch_one(pool)
        .await?;

    let duplicate_phones: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM (
            SELECT phone FROM clients GROUP BY phone HAVING COUNT(*) > 1
        ) AS shared
        "#
    )
    .fetch_one(pool)
    .await?;

    let by_state: Vec<(String, i64)> = sqlx::query_as(
        "SELECT state, COUNT(*) FROM clients GROUP BY state ORDER BY state"
    )
    .fetch_all(pool)
    .await?;

    Ok(DashboardStats {
        total_clients,
        duplicate_phones,
        clients_by_state: by_state.into_iter().collect(),
    })
}

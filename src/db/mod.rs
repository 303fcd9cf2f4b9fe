//! Database module

pub mod memory;
pub mod pg;
pub mod queries;

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{Config, StoreBackend};
use crate::types::{
    Appointment, Client, DashboardStats, ImportErrorDetail, ImportReport, ImportSummary,
    ListAppointmentsRequest, ListClientsRequest, NewAppointment, NewClient,
};

pub use memory::MemoryStore;
pub use pg::PgStore;

/// Raised by a store when `(user_id, cpf)` already exists
#[derive(Debug, thiserror::Error)]
#[error("CPF {cpf} already registered for this owner")]
pub struct DuplicateCpf {
    pub cpf: String,
}

/// Persistence operations used by services and handlers.
///
/// Owner-scoped reads take the owner's id and return `None` for records
/// belonging to someone else.
#[async_trait]
pub trait Store: Send + Sync {
    // Clients
    async fn insert_client(&self, user_id: Uuid, client: &NewClient) -> Result<Client>;
    async fn get_client(&self, user_id: Uuid, id: Uuid) -> Result<Option<Client>>;
    async fn list_clients(
        &self,
        user_id: Uuid,
        request: &ListClientsRequest,
    ) -> Result<(Vec<Client>, i64)>;
    async fn update_client(
        &self,
        user_id: Uuid,
        id: Uuid,
        client: &NewClient,
    ) -> Result<Option<Client>>;
    async fn delete_client(&self, user_id: Uuid, id: Uuid) -> Result<bool>;
    async fn cpf_taken(&self, user_id: Uuid, cpf: &str, exclude: Option<Uuid>) -> Result<bool>;
    /// Aggregates over every client in the system
    async fn client_stats(&self) -> Result<DashboardStats>;
    async fn client_creation_dates(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>>;

    // Appointments
    async fn insert_appointment(
        &self,
        user_id: Uuid,
        appointment: &NewAppointment,
    ) -> Result<Appointment>;
    async fn get_appointment(&self, user_id: Uuid, id: Uuid) -> Result<Option<Appointment>>;
    async fn list_appointments(
        &self,
        user_id: Uuid,
        request: &ListAppointmentsRequest,
        now: DateTime<Utc>,
    ) -> Result<(Vec<Appointment>, i64)>;
    async fn update_appointment(
        &self,
        user_id: Uuid,
        id: Uuid,
        appointment: &NewAppointment,
    ) -> Result<Option<Appointment>>;
    async fn delete_appointment(&self, user_id: Uuid, id: Uuid) -> Result<bool>;
    /// Earliest-starting appointment of the owner overlapping `[start, end)`
    async fn find_conflicting_appointment(
        &self,
        user_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude: Option<Uuid>,
    ) -> Result<Option<Appointment>>;
    async fn appointment_creation_dates(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>>;

    // Import reports
    async fn create_import_report(
        &self,
        user_id: Uuid,
        filename: Option<&str>,
        total_lines: i32,
    ) -> Result<ImportReport>;
    /// `pending → processing`; `None` when the report is missing or not pending
    async fn begin_import_processing(&self, id: Uuid) -> Result<Option<ImportReport>>;
    /// `processing → completed`; false when the report was not processing
    async fn complete_import(&self, id: Uuid, summary: &ImportSummary) -> Result<bool>;
    /// `processing → failed`; false when the report was not processing
    async fn fail_import(&self, id: Uuid, details: &[ImportErrorDetail]) -> Result<bool>;
    async fn get_import_report(&self, user_id: Uuid, id: Uuid) -> Result<Option<ImportReport>>;
    async fn latest_import_report(&self, user_id: Uuid) -> Result<Option<ImportReport>>;
    async fn list_import_reports(&self, user_id: Uuid, limit: i64) -> Result<Vec<ImportReport>>;
}

/// Build the store selected by configuration
pub async fn create_store(config: &Config) -> Result<Arc<dyn Store>> {
    match config.store_backend {
        StoreBackend::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL must be set for the postgres store")?;
            let pool = create_pool(url).await?;
            info!("Connected to database");
            run_migrations(&pool).await?;
            Ok(Arc::new(PgStore::new(pool)))
        }
        StoreBackend::Memory => {
            warn!("Using in-memory store; data is lost on restart");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

/// Create a database connection pool
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;

    Ok(pool)
}

/// Run database migrations.
///
/// Checksums stored in `_sqlx_migrations` are synced with the compiled ones
/// first so CRLF/LF differences across platforms don't block startup.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    info!("Running database migrations...");

    let migrator = sqlx::migrate!("./migrations");

    fix_migration_checksums(pool, &migrator).await?;
    migrator.run(pool).await?;

    info!("Database migrations complete");
    Ok(())
}

async fn fix_migration_checksums(pool: &PgPool, migrator: &sqlx::migrate::Migrator) -> Result<()> {
    let table_exists: bool = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM information_schema.tables WHERE table_name = '_sqlx_migrations')"
    )
    .fetch_one(pool)
    .await?;

    if !table_exists {
        return Ok(());
    }

    for migration in migrator.iter() {
        if migration.migration_type.is_down_migration() {
            continue;
        }

        let stored: Option<(Vec<u8>,)> = sqlx::query_as(
            "SELECT checksum FROM _sqlx_migrations WHERE version = $1"
        )
        .bind(migration.version)
        .fetch_optional(pool)
        .await?;

        if let Some((stored_checksum,)) = stored {
            let current_checksum: &[u8] = &migration.checksum;
            if stored_checksum != current_checksum {
                warn!(
                    "Migration {} ({}) checksum mismatch, updating stored checksum",
                    migration.version, migration.description
                );
                sqlx::query("UPDATE _sqlx_migrations SET checksum = $1 WHERE version = $2")
                    .bind(current_checksum)
                    .bind(migration.version)
                    .execute(pool)
                    .await?;
            }
        }
    }

    Ok(())
}

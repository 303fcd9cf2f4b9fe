//! PostgreSQL-backed store

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::queries;
use super::Store;
use crate::types::{
    Appointment, Client, DashboardStats, ImportErrorDetail, ImportReport, ImportSummary,
    ListAppointmentsRequest, ListClientsRequest, NewAppointment, NewClient,
};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn insert_client(&self, user_id: Uuid, client: &NewClient) -> Result<Client> {
        queries::client::create_client(&self.pool, user_id, client).await
    }

    async fn get_client(&self, user_id: Uuid, id: Uuid) -> Result<Option<Client>> {
        queries::client::get_client(&self.pool, user_id, id).await
    }

    async fn list_clients(
        &self,
        user_id: Uuid,
        request: &ListClientsRequest,
    ) -> Result<(Vec<Client>, i64)> {
        queries::client::list_clients(&self.pool, user_id, request).await
    }

    async fn update_client(
        &self,
        user_id: Uuid,
        id: Uuid,
        client: &NewClient,
    ) -> Result<Option<Client>> {
        queries::client::update_client(&self.pool, user_id, id, client).await
    }

    async fn delete_client(&self, user_id: Uuid, id: Uuid) -> Result<bool> {
        queries::client::delete_client(&self.pool, user_id, id).await
    }

    async fn cpf_taken(&self, user_id: Uuid, cpf: &str, exclude: Option<Uuid>) -> Result<bool> {
        queries::client::cpf_taken(&self.pool, user_id, cpf, exclude).await
    }

    async fn client_stats(&self) -> Result<DashboardStats> {
        queries::stats::client_stats(&self.pool).await
    }

    async fn client_creation_dates(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>> {
        queries::client::creation_dates(&self.pool, user_id, since).await
    }

    async fn insert_appointment(
        &self,
        user_id: Uuid,
        appointment: &NewAppointment,
    ) -> Result<Appointment> {
        queries::appointment::create_appointment(&self.pool, user_id, appointment).await
    }

    async fn get_appointment(&self, user_id: Uuid, id: Uuid) -> Result<Option<Appointment>> {
        queries::appointment::get_appointment(&self.pool, user_id, id).await
    }

    async fn list_appointments(
        &self,
        user_id: Uuid,
        request: &ListAppointmentsRequest,
        now: DateTime<Utc>,
    ) -> Result<(Vec<Appointment>, i64)> {
        queries::appointment::list_appointments(&self.pool, user_id, request, now).await
    }

    async fn update_appointment(
        &self,
        user_id: Uuid,
        id: Uuid,
        appointment: &NewAppointment,
    ) -> Result<Option<Appointment>> {
        queries::appointment::update_appointment(&self.pool, user_id, id, appointment).await
    }

    async fn delete_appointment(&self, user_id: Uuid, id: Uuid) -> Result<bool> {
        queries::appointment::delete_appointment(&self.pool, user_id, id).await
    }

    async fn find_conflicting_appointment(
        &self,
        user_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude: Option<Uuid>,
    ) -> Result<Option<Appointment>> {
        queries::appointment::find_conflict(&self.pool, user_id, start, end, exclude).await
    }

    async fn appointment_creation_dates(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>> {
        queries::appointment::creation_dates(&self.pool, user_id, since).await
    }

    async fn create_import_report(
        &self,
        user_id: Uuid,
        filename: Option<&str>,
        total_lines: i32,
    ) -> Result<ImportReport> {
        queries::import_report::create_import_report(&self.pool, user_id, filename, total_lines)
            .await
    }

    async fn begin_import_processing(&self, id: Uuid) -> Result<Option<ImportReport>> {
        queries::import_report::begin_processing(&self.pool, id).await
    }

    async fn complete_import(&self, id: Uuid, summary: &ImportSummary) -> Result<bool> {
        queries::import_report::complete(&self.pool, id, summary).await
    }

    async fn fail_import(&self, id: Uuid, details: &[ImportErrorDetail]) -> Result<bool> {
        queries::import_report::fail(&self.pool, id, details).await
    }

    async fn get_import_report(&self, user_id: Uuid, id: Uuid) -> Result<Option<ImportReport>> {
        queries::import_report::get_import_report(&self.pool, user_id, id).await
    }

    async fn latest_import_report(&self, user_id: Uuid) -> Result<Option<ImportReport>> {
        let mut reports = queries::import_report::list_import_reports(&self.pool, user_id, 1).await?;
        Ok(reports.pop())
    }

    async fn list_import_reports(&self, user_id: Uuid, limit: i64) -> Result<Vec<ImportReport>> {
        queries::import_report::list_import_reports(&self.pool, user_id, limit).await
    }
}

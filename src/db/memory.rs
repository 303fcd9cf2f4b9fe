//! In-process store for local runs and tests.
//!
//! Mirrors the constraints the SQL schema enforces: unique `(user_id, cpf)`
//! and guarded import status transitions.

use std::collections::BTreeMap;
#[cfg(test)]
use std::collections::HashSet;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use sqlx::types::Json;
use uuid::Uuid;

use super::{DuplicateCpf, Store};
use crate::types::{
    intervals_overlap, Appointment, Client, ClientSort, DashboardStats, ImportErrorDetail,
    ImportReport, ImportStatus, ImportSummary, ListAppointmentsRequest, ListClientsRequest,
    NewAppointment, NewClient,
};

#[derive(Default)]
struct Tables {
    clients: Vec<Client>,
    appointments: Vec<Appointment>,
    import_reports: Vec<ImportReport>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    #[cfg(test)]
    failing_cpfs: RwLock<HashSet<String>>,
    #[cfg(test)]
    failing_completion: RwLock<bool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make client writes with this CPF fail with a storage error
    #[cfg(test)]
    pub fn fail_client_writes_for(&self, cpf: &str) {
        self.failing_cpfs.write().insert(cpf.to_string());
    }

    #[cfg(test)]
    fn check_failing(&self, cpf: &str) -> Result<()> {
        if self.failing_cpfs.read().contains(cpf) {
            anyhow::bail!("connection reset while writing client");
        }
        Ok(())
    }

    /// Make `complete_import` fail with a storage error
    #[cfg(test)]
    pub fn fail_import_completion(&self) {
        *self.failing_completion.write() = true;
    }

    #[cfg(not(test))]
    fn check_failing(&self, _cpf: &str) -> Result<()> {
        Ok(())
    }

    #[cfg(test)]
    pub fn client_count(&self) -> usize {
        self.tables.read().clients.len()
    }
}

fn page<T: Clone>(items: &[T], limit: i64, offset: i64) -> Vec<T> {
    items
        .iter()
        .skip(offset.max(0) as usize)
        .take(limit.max(0) as usize)
        .cloned()
        .collect()
}

fn sort_clients(clients: &mut [Client], sort: ClientSort) {
    match sort {
        ClientSort::NameAsc => clients.sort_by(|a, b| a.name.cmp(&b.name)),
        ClientSort::NameDesc => clients.sort_by(|a, b| b.name.cmp(&a.name)),
        ClientSort::StateAsc => clients.sort_by(|a, b| a.state.cmp(&b.state)),
        ClientSort::StateDesc => clients.sort_by(|a, b| b.state.cmp(&a.state)),
        ClientSort::CreatedAtAsc => clients.sort_by_key(|c| c.created_at),
        ClientSort::CreatedAtDesc => clients.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_client(&self, user_id: Uuid, client: &NewClient) -> Result<Client> {
        self.check_failing(&client.cpf)?;
        let mut tables = self.tables.write();
        if tables
            .clients
            .iter()
            .any(|c| c.user_id == user_id && c.cpf == client.cpf)
        {
            return Err(DuplicateCpf { cpf: client.cpf.clone() }.into());
        }

        let now = Utc::now();
        let created = Client {
            id: Uuid::new_v4(),
            user_id,
            name: client.name.clone(),
            address: client.address.clone(),
            city: client.city.clone(),
            state: client.state.clone(),
            cep: client.cep.clone(),
            phone: client.phone.clone(),
            cpf: client.cpf.clone(),
            created_at: now,
            updated_at: now,
        };
        tables.clients.push(created.clone());
        Ok(created)
    }

    async fn get_client(&self, user_id: Uuid, id: Uuid) -> Result<Option<Client>> {
        let tables = self.tables.read();
        Ok(tables
            .clients
            .iter()
            .find(|c| c.id == id && c.user_id == user_id)
            .cloned())
    }

    async fn list_clients(
        &self,
        user_id: Uuid,
        request: &ListClientsRequest,
    ) -> Result<(Vec<Client>, i64)> {
        let search = request.search_columns();
        let mut matching: Vec<Client> = {
            let tables = self.tables.read();
            tables
                .clients
                .iter()
                .filter(|c| c.user_id == user_id)
                .filter(|c| search.as_ref().map_or(true, |s| s.matches(c)))
                .cloned()
                .collect()
        };
        sort_clients(&mut matching, request.sort);

        let total = matching.len() as i64;
        Ok((page(&matching, request.limit, request.offset), total))
    }

    async fn update_client(
        &self,
        user_id: Uuid,
        id: Uuid,
        client: &NewClient,
    ) -> Result<Option<Client>> {
        self.check_failing(&client.cpf)?;
        let mut tables = self.tables.write();
        if tables
            .clients
            .iter()
            .any(|c| c.user_id == user_id && c.cpf == client.cpf && c.id != id)
        {
            return Err(DuplicateCpf { cpf: client.cpf.clone() }.into());
        }

        let Some(existing) = tables
            .clients
            .iter_mut()
            .find(|c| c.id == id && c.user_id == user_id)
        else {
            return Ok(None);
        };

        existing.name = client.name.clone();
        existing.address = client.address.clone();
        existing.city = client.city.clone();
        existing.state = client.state.clone();
        existing.cep = client.cep.clone();
        existing.phone = client.phone.clone();
        existing.cpf = client.cpf.clone();
        existing.updated_at = Utc::now();
        Ok(Some(existing.clone()))
    }

    async fn delete_client(&self, user_id: Uuid, id: Uuid) -> Result<bool> {
        let mut tables = self.tables.write();
        let before = tables.clients.len();
        tables.clients.retain(|c| !(c.id == id && c.user_id == user_id));
        Ok(tables.clients.len() < before)
    }

    async fn cpf_taken(&self, user_id: Uuid, cpf: &str, exclude: Option<Uuid>) -> Result<bool> {
        let tables = self.tables.read();
        Ok(tables
            .clients
            .iter()
            .any(|c| c.user_id == user_id && c.cpf == cpf && Some(c.id) != exclude))
    }

    async fn client_stats(&self) -> Result<DashboardStats> {
        let tables = self.tables.read();

        let mut phones: BTreeMap<&str, i64> = BTreeMap::new();
        let mut by_state: BTreeMap<String, i64> = BTreeMap::new();
        for client in &tables.clients {
            *phones.entry(client.phone.as_str()).or_default() += 1;
            *by_state.entry(client.state.clone()).or_default() += 1;
        }

        Ok(DashboardStats {
            total_clients: tables.clients.len() as i64,
            duplicate_phones: phones.values().filter(|&&n| n > 1).count() as i64,
            clients_by_state: by_state,
        })
    }

    async fn client_creation_dates(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>> {
        let tables = self.tables.read();
        Ok(tables
            .clients
            .iter()
            .filter(|c| c.user_id == user_id && c.created_at >= since)
            .map(|c| c.created_at)
            .collect())
    }

    async fn insert_appointment(
        &self,
        user_id: Uuid,
        appointment: &NewAppointment,
    ) -> Result<Appointment> {
        let now = Utc::now();
        let created = Appointment {
            id: Uuid::new_v4(),
            user_id,
            name: appointment.name.clone(),
            start_time: appointment.start_time,
            end_time: appointment.end_time,
            created_at: now,
            updated_at: now,
        };
        self.tables.write().appointments.push(created.clone());
        Ok(created)
    }

    async fn get_appointment(&self, user_id: Uuid, id: Uuid) -> Result<Option<Appointment>> {
        let tables = self.tables.read();
        Ok(tables
            .appointments
            .iter()
            .find(|a| a.id == id && a.user_id == user_id)
            .cloned())
    }

    async fn list_appointments(
        &self,
        user_id: Uuid,
        request: &ListAppointmentsRequest,
        now: DateTime<Utc>,
    ) -> Result<(Vec<Appointment>, i64)> {
        let term = request.term().map(str::to_lowercase);
        let mut matching: Vec<Appointment> = {
            let tables = self.tables.read();
            tables
                .appointments
                .iter()
                .filter(|a| a.user_id == user_id)
                .filter(|a| request.status.map_or(true, |status| a.status_at(now) == status))
                .filter(|a| {
                    term.as_ref()
                        .map_or(true, |t| a.name.to_lowercase().contains(t))
                })
                .cloned()
                .collect()
        };
        matching.sort_by_key(|a| a.start_time);

        let total = matching.len() as i64;
        Ok((page(&matching, request.limit, request.offset), total))
    }

    async fn update_appointment(
        &self,
        user_id: Uuid,
        id: Uuid,
        appointment: &NewAppointment,
    ) -> Result<Option<Appointment>> {
        let mut tables = self.tables.write();
        let Some(existing) = tables
            .appointments
            .iter_mut()
            .find(|a| a.id == id && a.user_id == user_id)
        else {
            return Ok(None);
        };

        existing.name = appointment.name.clone();
        existing.start_time = appointment.start_time;
        existing.end_time = appointment.end_time;
        existing.updated_at = Utc::now();
        Ok(Some(existing.clone()))
    }

    async fn delete_appointment(&self, user_id: Uuid, id: Uuid) -> Result<bool> {
        let mut tables = self.tables.write();
        let before = tables.appointments.len();
        tables
            .appointments
            .retain(|a| !(a.id == id && a.user_id == user_id));
        Ok(tables.appointments.len() < before)
    }

    async fn find_conflicting_appointment(
        &self,
        user_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude: Option<Uuid>,
    ) -> Result<Option<Appointment>> {
        let tables = self.tables.read();
        Ok(tables
            .appointments
            .iter()
            .filter(|a| a.user_id == user_id && Some(a.id) != exclude)
            .filter(|a| intervals_overlap(a.start_time, a.end_time, start, end))
            .min_by_key(|a| a.start_time)
            .cloned())
    }

    async fn appointment_creation_dates(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>> {
        let tables = self.tables.read();
        Ok(tables
            .appointments
            .iter()
            .filter(|a| a.user_id == user_id && a.created_at >= since)
            .map(|a| a.created_at)
            .collect())
    }

    async fn create_import_report(
        &self,
        user_id: Uuid,
        filename: Option<&str>,
        total_lines: i32,
    ) -> Result<ImportReport> {
        let now = Utc::now();
        let report = ImportReport {
            id: Uuid::new_v4(),
            user_id,
            filename: filename.map(str::to_string),
            status: ImportStatus::Pending,
            success_count: 0,
            error_count: 0,
            total_lines,
            started_at: None,
            completed_at: None,
            error_details: Json(Vec::new()),
            created_at: now,
            updated_at: now,
        };
        self.tables.write().import_reports.push(report.clone());
        Ok(report)
    }

    async fn begin_import_processing(&self, id: Uuid) -> Result<Option<ImportReport>> {
        let mut tables = self.tables.write();
        let Some(report) = tables
            .import_reports
            .iter_mut()
            .find(|r| r.id == id && r.status == ImportStatus::Pending)
        else {
            return Ok(None);
        };

        let now = Utc::now();
        report.status = ImportStatus::Processing;
        report.started_at = Some(now);
        report.updated_at = now;
        Ok(Some(report.clone()))
    }

    async fn complete_import(&self, id: Uuid, summary: &ImportSummary) -> Result<bool> {
        #[cfg(test)]
        if *self.failing_completion.read() {
            anyhow::bail!("connection reset while finishing import");
        }

        let mut tables = self.tables.write();
        let Some(report) = tables
            .import_reports
            .iter_mut()
            .find(|r| r.id == id && r.status == ImportStatus::Processing)
        else {
            return Ok(false);
        };

        let now = Utc::now();
        report.status = ImportStatus::Completed;
        report.success_count = summary.success_count;
        report.error_count = summary.error_count;
        report.total_lines = summary.total_lines;
        report.error_details = Json(summary.error_details.clone());
        report.completed_at = Some(now);
        report.updated_at = now;
        Ok(true)
    }

    async fn fail_import(&self, id: Uuid, details: &[ImportErrorDetail]) -> Result<bool> {
        let mut tables = self.tables.write();
        let Some(report) = tables
            .import_reports
            .iter_mut()
            .find(|r| r.id == id && r.status == ImportStatus::Processing)
        else {
            return Ok(false);
        };

        let now = Utc::now();
        report.status = ImportStatus::Failed;
        report.error_details = Json(details.to_vec());
        report.completed_at = Some(now);
        report.updated_at = now;
        Ok(true)
    }

    async fn get_import_report(&self, user_id: Uuid, id: Uuid) -> Result<Option<ImportReport>> {
        let tables = self.tables.read();
        Ok(tables
            .import_reports
            .iter()
            .find(|r| r.id == id && r.user_id == user_id)
            .cloned())
    }

    async fn latest_import_report(&self, user_id: Uuid) -> Result<Option<ImportReport>> {
        Ok(self.list_import_reports(user_id, 1).await?.pop())
    }

    async fn list_import_reports(&self, user_id: Uuid, limit: i64) -> Result<Vec<ImportReport>> {
        let tables = self.tables.read();
        // Newest first; insertion order breaks timestamp ties
        let mut reports: Vec<ImportReport> = tables
            .import_reports
            .iter()
            .rev()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        reports.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        reports.truncate(limit.max(0) as usize);
        Ok(reports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn new_client(cpf: &str, phone: &str, state: &str) -> NewClient {
        NewClient {
            name: "ANA".to_string(),
            address: "Rua A 100".to_string(),
            city: "Recife".to_string(),
            state: state.to_string(),
            cep: "50000-000".to_string(),
            phone: phone.to_string(),
            cpf: cpf.to_string(),
        }
    }

    #[tokio::test]
    async fn test_duplicate_cpf_per_owner() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        store
            .insert_client(owner, &new_client("11144477735", "(11) 99999-9999", "SP"))
            .await
            .unwrap();

        let err = store
            .insert_client(owner, &new_client("11144477735", "(11) 99999-9999", "SP"))
            .await
            .unwrap_err();
        assert!(err.downcast_ref::<DuplicateCpf>().is_some());

        // Another owner may reuse the CPF
        store
            .insert_client(Uuid::new_v4(), &new_client("11144477735", "(11) 99999-9999", "SP"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_stats_aggregate_all_owners() {
        let store = MemoryStore::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        store.insert_client(a, &new_client("11144477735", "(11) 99999-9999", "SP")).await.unwrap();
        store.insert_client(b, &new_client("52998224725", "(11) 99999-9999", "RJ")).await.unwrap();
        store.insert_client(b, &new_client("39053344705", "(21) 88888-8888", "SP")).await.unwrap();

        let stats = store.client_stats().await.unwrap();
        assert_eq!(stats.total_clients, 3);
        assert_eq!(stats.duplicate_phones, 1);
        assert_eq!(stats.clients_by_state.get("SP"), Some(&2));
        assert_eq!(stats.clients_by_state.values().sum::<i64>(), stats.total_clients);
    }

    #[tokio::test]
    async fn test_owner_scoping() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let client = store
            .insert_client(owner, &new_client("11144477735", "(11) 99999-9999", "SP"))
            .await
            .unwrap();

        let stranger = Uuid::new_v4();
        assert!(store.get_client(stranger, client.id).await.unwrap().is_none());
        assert!(!store.delete_client(stranger, client.id).await.unwrap());
        assert!(store.delete_client(owner, client.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_import_transitions_are_guarded() {
        let store = MemoryStore::new();
        let report = store
            .create_import_report(Uuid::new_v4(), Some("a.csv"), 2)
            .await
            .unwrap();

        assert!(!store.complete_import(report.id, &ImportSummary::default()).await.unwrap());
        assert!(store.begin_import_processing(report.id).await.unwrap().is_some());
        assert!(store.begin_import_processing(report.id).await.unwrap().is_none());
        assert!(store.complete_import(report.id, &ImportSummary::default()).await.unwrap());
        assert!(!store.fail_import(report.id, &[]).await.unwrap());
    }

    #[tokio::test]
    async fn test_conflict_lookup_returns_earliest() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let at = |h: u32| Utc.with_ymd_and_hms(2025, 9, 10, h, 0, 0).unwrap();

        let later = NewAppointment {
            name: "Depois".to_string(),
            start_time: at(11),
            end_time: at(12),
        };
        let earlier = NewAppointment {
            name: "Antes".to_string(),
            start_time: at(9),
            end_time: at(11),
        };
        store.insert_appointment(owner, &later).await.unwrap();
        store.insert_appointment(owner, &earlier).await.unwrap();

        let conflict = store
            .find_conflicting_appointment(owner, at(10), at(12) + Duration::minutes(30), None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(conflict.name, "Antes");

        let none = store
            .find_conflicting_appointment(owner, at(12), at(13), None)
            .await
            .unwrap();
        assert!(none.is_none());
    }

    #[tokio::test]
    async fn test_list_clients_search_and_sort() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let mut maria = new_client("52998224725", "(21) 88888-8888", "RJ");
        maria.name = "MARIA".to_string();
        let mut bruno = new_client("39053344705", "(11) 77777-7777", "SP");
        bruno.name = "BRUNO".to_string();
        store.insert_client(owner, &maria).await.unwrap();
        store.insert_client(owner, &bruno).await.unwrap();

        let (all, total) = store
            .list_clients(owner, &ListClientsRequest::default())
            .await
            .unwrap();
        assert_eq!(total, 2);
        assert_eq!(all[0].name, "BRUNO");

        let request = ListClientsRequest {
            search: Some("maria".to_string()),
            ..Default::default()
        };
        let (found, total) = store.list_clients(owner, &request).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(found[0].cpf, "52998224725");
    }
}

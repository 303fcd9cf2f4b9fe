//! Client writes: normalisation, model rules, persistence and the stats
//! broadcast that follows every create and delete.

use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info};
use uuid::Uuid;

use super::stats::StatsPublisher;
use crate::db::{DuplicateCpf, Store};
use crate::types::{Client, ClientAttributes, NewClient, ValidationErrors};

#[derive(Debug, thiserror::Error)]
pub enum SaveError {
    #[error("{0}")]
    Invalid(ValidationErrors),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl SaveError {
    /// A unique-index hit that slipped past the pre-check reads as the same
    /// validation error the pre-check would have produced.
    fn from_store(err: anyhow::Error) -> Self {
        if err.downcast_ref::<DuplicateCpf>().is_some() {
            let mut errors = ValidationErrors::default();
            errors.add("cpf", "já está cadastrado");
            return SaveError::Invalid(errors);
        }
        SaveError::Store(err)
    }
}

pub struct ClientService {
    store: Arc<dyn Store>,
    stats: Arc<StatsPublisher>,
}

impl ClientService {
    pub fn new(store: Arc<dyn Store>, stats: Arc<StatsPublisher>) -> Self {
        Self { store, stats }
    }

    async fn validate(
        &self,
        user_id: Uuid,
        attrs: &ClientAttributes,
        exclude: Option<Uuid>,
    ) -> Result<NewClient, SaveError> {
        let cpf_taken = match attrs.cpf.as_deref().filter(|c| !c.trim().is_empty()) {
            Some(cpf) => self.store.cpf_taken(user_id, cpf, exclude).await?,
            None => false,
        };
        attrs.validate(cpf_taken).map_err(SaveError::Invalid)
    }

    pub async fn create(&self, user_id: Uuid, attrs: &ClientAttributes) -> Result<Client, SaveError> {
        let normalized = attrs.normalized();
        let new_client = self.validate(user_id, &normalized, None).await?;

        let client = self
            .store
            .insert_client(user_id, &new_client)
            .await
            .map_err(SaveError::from_store)?;
        debug!("Client {} created for user {}", client.id, user_id);

        self.stats.publish_update().await;
        Ok(client)
    }

    /// Apply the provided attributes over the stored record. `None` when the
    /// client does not exist for this owner.
    pub async fn update(
        &self,
        user_id: Uuid,
        id: Uuid,
        attrs: &ClientAttributes,
    ) -> Result<Option<Client>, SaveError> {
        let Some(existing) = self.store.get_client(user_id, id).await? else {
            return Ok(None);
        };

        let normalized = attrs.merged_over(&existing).normalized();
        let new_client = self.validate(user_id, &normalized, Some(id)).await?;

        self.store
            .update_client(user_id, id, &new_client)
            .await
            .map_err(SaveError::from_store)
    }

    pub async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<bool> {
        let deleted = self.store.delete_client(user_id, id).await?;
        if deleted {
            info!("Client {} deleted by user {}", id, user_id);
            self.stats.publish_update().await;
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::services::broadcaster::testing::RecordingBroadcaster;
    use crate::types::PUBLIC_DASHBOARD_CHANNEL;

    fn service() -> (ClientService, Arc<MemoryStore>, Arc<RecordingBroadcaster>) {
        let store = Arc::new(MemoryStore::new());
        let recorder = Arc::new(RecordingBroadcaster::default());
        let stats = Arc::new(StatsPublisher::new(store.clone(), recorder.clone()));
        (ClientService::new(store.clone(), stats), store, recorder)
    }

    fn attrs(cpf: &str) -> ClientAttributes {
        ClientAttributes {
            name: Some("José Souza".to_string()),
            address: Some("Rua XV de Novembro 100".to_string()),
            city: Some("Curitiba".to_string()),
            state: Some("PR".to_string()),
            cep: Some("80000-000".to_string()),
            phone: Some("41 98765-4321".to_string()),
            cpf: Some(cpf.to_string()),
        }
    }

    #[tokio::test]
    async fn test_create_normalizes_and_broadcasts() {
        let (service, _, recorder) = service();
        let owner = Uuid::new_v4();

        let client = service.create(owner, &attrs("111.444.777-35")).await.unwrap();
        assert_eq!(client.name, "JOSÉ SOUZA");
        assert_eq!(client.phone, "(41) 98765-4321");
        assert_eq!(client.cpf, "11144477735");

        let events = recorder.events_on(PUBLIC_DASHBOARD_CHANNEL);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["data"]["total_clients"], 1);
    }

    #[tokio::test]
    async fn test_duplicate_cpf_is_a_validation_error() {
        let (service, store, _) = service();
        let owner = Uuid::new_v4();
        service.create(owner, &attrs("11144477735")).await.unwrap();

        match service.create(owner, &attrs("111.444.777-35")).await {
            Err(SaveError::Invalid(errors)) => {
                assert_eq!(errors.full_messages(), vec!["CPF já está cadastrado"]);
            }
            other => panic!("expected validation error, got {:?}", other),
        }
        assert_eq!(store.client_count(), 1);
    }

    #[tokio::test]
    async fn test_invalid_client_is_not_persisted_or_broadcast() {
        let (service, store, recorder) = service();
        let mut bad = attrs("11144477735");
        bad.state = Some("ZZ".to_string());

        assert!(matches!(
            service.create(Uuid::new_v4(), &bad).await,
            Err(SaveError::Invalid(_))
        ));
        assert_eq!(store.client_count(), 0);
        assert!(recorder.events_on(PUBLIC_DASHBOARD_CHANNEL).is_empty());
    }

    #[tokio::test]
    async fn test_update_keeps_own_cpf_and_merges() {
        let (service, _, _) = service();
        let owner = Uuid::new_v4();
        let client = service.create(owner, &attrs("11144477735")).await.unwrap();

        let change = ClientAttributes {
            city: Some("Londrina".to_string()),
            ..Default::default()
        };
        let updated = service.update(owner, client.id, &change).await.unwrap().unwrap();
        assert_eq!(updated.city, "Londrina");
        assert_eq!(updated.cpf, "11144477735");
    }

    #[tokio::test]
    async fn test_update_other_owner_is_none() {
        let (service, _, _) = service();
        let client = service.create(Uuid::new_v4(), &attrs("11144477735")).await.unwrap();

        let result = service
            .update(Uuid::new_v4(), client.id, &ClientAttributes::default())
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_delete_broadcasts_only_when_deleted() {
        let (service, _, recorder) = service();
        let owner = Uuid::new_v4();
        let client = service.create(owner, &attrs("11144477735")).await.unwrap();

        assert!(!service.delete(owner, Uuid::new_v4()).await.unwrap());
        assert_eq!(recorder.events_on(PUBLIC_DASHBOARD_CHANNEL).len(), 1);

        assert!(service.delete(owner, client.id).await.unwrap());
        let events = recorder.events_on(PUBLIC_DASHBOARD_CHANNEL);
        assert_eq!(events.len(), 2);
        assert_eq!(events[1]["data"]["total_clients"], 0);
    }

    #[test]
    fn test_store_duplicate_maps_to_validation() {
        let err: anyhow::Error = DuplicateCpf { cpf: "11144477735".to_string() }.into();
        assert!(matches!(SaveError::from_store(err), SaveError::Invalid(_)));
    }
}

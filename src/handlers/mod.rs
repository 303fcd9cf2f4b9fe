//! NATS message handlers
//!
//! Every subject is a request/reply loop: parse the envelope, authenticate
//! when the subject needs an owner, run the operation, publish either a
//! `SuccessResponse` or an `ErrorResponse` to the reply subject.

pub mod appointment;
pub mod client;
pub mod dashboard;
pub mod import_report;
pub mod ping;

use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use async_nats::{Client, Subject, Subscriber};
use chrono::FixedOffset;
use futures::future::select_all;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::auth;
use crate::db::Store;
use crate::services::appointments::AppointmentService;
use crate::services::clients::ClientService;
use crate::services::csv_import::{ImportPipeline, ImportQueue};
use crate::services::import_processor::ImportProcessor;
use crate::services::stats::StatsPublisher;
use crate::services::SaveError;
use crate::types::{ErrorResponse, Request, SuccessResponse};

/// Shared state every handler reads from
pub struct HandlerContext {
    pub store: Arc<dyn Store>,
    pub clients: Arc<ClientService>,
    pub appointments: Arc<AppointmentService>,
    pub stats: Arc<StatsPublisher>,
    pub imports: Arc<ImportPipeline>,
    pub queue: Arc<dyn ImportQueue>,
    pub jwt_secret: Arc<String>,
    pub utc_offset: FixedOffset,
}

pub(crate) type Reply<T> = std::result::Result<SuccessResponse<T>, ErrorResponse>;

pub(crate) fn extract_request_id(payload: &[u8]) -> Uuid {
    if let Ok(v) = serde_json::from_slice::<serde_json::Value>(payload) {
        if let Some(id_str) = v.get("id").and_then(|id| id.as_str()) {
            if let Ok(uuid) = Uuid::parse_str(id_str) {
                return uuid;
            }
        }
    }
    Uuid::new_v4()
}

async fn send<T: Serialize>(client: &Client, reply: Subject, body: &T) -> Result<()> {
    let payload = serde_json::to_vec(body)?;
    if let Err(e) = client.publish(reply, payload.into()).await {
        warn!("Failed to publish reply: {}", e);
    }
    Ok(())
}

/// Request/reply loop shared by all subjects
pub(crate) async fn serve<T, R, F, Fut>(
    client: Client,
    mut subscriber: Subscriber,
    name: &'static str,
    handler: F,
) -> Result<()>
where
    T: DeserializeOwned,
    R: Serialize,
    F: Fn(Request<T>) -> Fut,
    Fut: Future<Output = Reply<R>>,
{
    while let Some(msg) = subscriber.next().await {
        debug!("Received {} message", name);

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("{} message without reply subject", name);
                continue;
            }
        };

        let request: Request<T> = match serde_json::from_slice(&msg.payload) {
            Ok(req) => req,
            Err(e) => {
                error!("Failed to parse {} request: {}", name, e);
                let error = ErrorResponse::new(
                    extract_request_id(&msg.payload),
                    "INVALID_REQUEST",
                    e.to_string(),
                );
                send(&client, reply, &error).await?;
                continue;
            }
        };

        match handler(request).await {
            Ok(response) => send(&client, reply, &response).await?,
            Err(error) => send(&client, reply, &error).await?,
        }
    }

    Ok(())
}

/// Owner id from the envelope token, or a 401 reply
pub(crate) fn authenticate<T>(
    request: &Request<T>,
    jwt_secret: &str,
) -> std::result::Result<Uuid, ErrorResponse> {
    auth::extract_auth(request, jwt_secret)
        .map(|info| info.user_id)
        .map_err(|e| {
            debug!("Rejected request {}: {}", request.id, e);
            ErrorResponse::unauthorized(request.id)
        })
}

/// Log a storage failure and hide it behind a 500
pub(crate) fn internal_error(request_id: Uuid, action: &str, err: impl std::fmt::Display) -> ErrorResponse {
    error!("Failed to {}: {}", action, err);
    ErrorResponse::internal(request_id)
}

pub(crate) fn save_error(request_id: Uuid, action: &str, err: SaveError) -> ErrorResponse {
    match err {
        SaveError::Invalid(errors) => ErrorResponse::validation(request_id, &errors),
        SaveError::Store(e) => internal_error(request_id, action, e),
    }
}

/// Subscribe to every subject and run until a loop exits
pub async fn start_handlers(
    client: Client,
    ctx: Arc<HandlerContext>,
    processor: Arc<ImportProcessor>,
) -> Result<()> {
    info!("Starting message handlers...");

    let mut handles: Vec<(&'static str, JoinHandle<Result<()>>)> = Vec::new();

    macro_rules! spawn_handler {
        ($subject:literal, $handler:path) => {{
            let subscriber = client.subscribe($subject).await?;
            let task = tokio::spawn($handler(client.clone(), subscriber, Arc::clone(&ctx)));
            handles.push(($subject, task));
        }};
    }

    let ping_sub = client.subscribe("painel.ping").await?;
    handles.push(("painel.ping", tokio::spawn(ping::handle_ping(client.clone(), ping_sub))));

    // Clients
    spawn_handler!("painel.client.create", client::handle_create);
    spawn_handler!("painel.client.list", client::handle_list);
    spawn_handler!("painel.client.get", client::handle_get);
    spawn_handler!("painel.client.update", client::handle_update);
    spawn_handler!("painel.client.delete", client::handle_delete);
    spawn_handler!("painel.client.import_csv", client::handle_import_csv);

    // Import reports
    spawn_handler!("painel.import_report.list", import_report::handle_list);
    spawn_handler!("painel.import_report.get", import_report::handle_get);
    spawn_handler!("painel.import_report.latest", import_report::handle_latest);

    // Appointments
    spawn_handler!("painel.appointment.create", appointment::handle_create);
    spawn_handler!("painel.appointment.list", appointment::handle_list);
    spawn_handler!("painel.appointment.get", appointment::handle_get);
    spawn_handler!("painel.appointment.update", appointment::handle_update);
    spawn_handler!("painel.appointment.delete", appointment::handle_delete);

    // Dashboards
    spawn_handler!("painel.dashboard.clients_chart_data", dashboard::handle_clients_chart);
    spawn_handler!("painel.dashboard.appointments_data", dashboard::handle_appointments_chart);
    spawn_handler!("painel.public_dashboard.subscribe", dashboard::handle_public_subscribe);

    info!("Subscribed to {} NATS subjects", handles.len());

    handles.push(("import processor", tokio::spawn(processor.start_processing())));

    let (names, tasks): (Vec<_>, Vec<_>) = handles.into_iter().unzip();
    let (result, index, _) = select_all(tasks).await;
    error!("{} handler finished: {:?}", names[index], result);

    Ok(())
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::db::MemoryStore;
    use crate::services::broadcaster::testing::RecordingBroadcaster;
    use crate::services::csv_import::testing::RecordingQueue;

    pub const SECRET: &str = "handler-tests-secret-handler-tests-secret";

    pub struct TestContext {
        pub ctx: Arc<HandlerContext>,
        pub store: Arc<MemoryStore>,
        pub recorder: Arc<RecordingBroadcaster>,
        pub queue: Arc<RecordingQueue>,
    }

    pub fn context() -> TestContext {
        let store = Arc::new(MemoryStore::new());
        let recorder = Arc::new(RecordingBroadcaster::default());
        let queue = Arc::new(RecordingQueue::default());
        let offset = FixedOffset::west_opt(3 * 3600).unwrap();

        let stats = Arc::new(StatsPublisher::new(store.clone(), recorder.clone()));
        let clients = Arc::new(ClientService::new(store.clone(), stats.clone()));
        let imports = Arc::new(ImportPipeline::new(store.clone(), clients.clone(), recorder.clone()));

        let ctx = Arc::new(HandlerContext {
            store: store.clone(),
            clients,
            appointments: Arc::new(AppointmentService::new(store.clone(), offset)),
            stats,
            imports,
            queue: queue.clone(),
            jwt_secret: Arc::new(SECRET.to_string()),
            utc_offset: offset,
        });

        TestContext { ctx, store, recorder, queue }
    }

    /// Envelope signed for `user_id`
    pub fn request<T>(user_id: Uuid, payload: T) -> Request<T> {
        let token = auth::generate_token(user_id, None, SECRET).unwrap();
        Request::with_token(token, payload)
    }

    pub fn error_of<T: std::fmt::Debug>(reply: Reply<T>) -> ErrorResponse {
        match reply {
            Err(error) => error,
            Ok(response) => panic!("expected error reply, got {:?}", response.payload),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::types::{EmptyPayload, ValidationErrors};

    #[test]
    fn test_extract_request_id_from_payload() {
        let id = Uuid::new_v4();
        let payload = format!(r#"{{"id":"{}","payload":"broken"#, id);
        assert_ne!(extract_request_id(payload.as_bytes()), id);

        let payload = format!(r#"{{"id":"{}","payload":1}}"#, id);
        assert_eq!(extract_request_id(payload.as_bytes()), id);
    }

    #[test]
    fn test_authenticate_rejects_missing_and_foreign_tokens() {
        let mut request = request(Uuid::new_v4(), EmptyPayload {});
        let owner = authenticate(&request, SECRET).unwrap();
        assert_ne!(owner, Uuid::nil());

        request.token = Some(auth::generate_token(owner, None, "some-other-secret-some-other-secret").unwrap());
        assert_eq!(authenticate(&request, SECRET).unwrap_err().error.status, 401);

        request.token = None;
        let error = authenticate(&request, SECRET).unwrap_err();
        assert_eq!(error.error.code, "UNAUTHORIZED");
        assert_eq!(error.id, request.id);
    }

    #[test]
    fn test_save_error_mapping() {
        let mut errors = ValidationErrors::default();
        errors.add("cpf", "não é válido");
        let error = save_error(Uuid::nil(), "create client", SaveError::Invalid(errors));
        assert_eq!(error.error.status, 422);
        assert_eq!(error.error.message, "CPF não é válido");

        let error = save_error(
            Uuid::nil(),
            "create client",
            SaveError::Store(anyhow::anyhow!("pool timed out")),
        );
        assert_eq!(error.error.status, 500);
        assert_eq!(error.error.message, "Erro interno do servidor");
    }
}

//! Ping handler for health checks

use anyhow::Result;
use async_nats::{Client, Subscriber};
use serde::{Deserialize, Serialize};

use super::{serve, Reply};
use crate::types::{Request, SuccessResponse};

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct PingRequest {
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PongResponse {
    pub message: String,
    pub timestamp: String,
}

fn pong(request: Request<PingRequest>) -> Reply<PongResponse> {
    let message = request
        .payload
        .message
        .map(|m| format!("Pong: {}", m))
        .unwrap_or_else(|| "Pong".to_string());

    Ok(SuccessResponse::new(
        request.id,
        PongResponse {
            message,
            timestamp: chrono::Utc::now().to_rfc3339(),
        },
    ))
}

/// Handle painel.ping messages; no authentication
pub async fn handle_ping(client: Client, subscriber: Subscriber) -> Result<()> {
    serve(client, subscriber, "ping", |request| async move { pong(request) }).await
}

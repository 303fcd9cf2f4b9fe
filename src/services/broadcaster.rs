//! Push notifications to subscribed panels
//!
//! Channels map one-to-one onto NATS subjects. Delivery is fire-and-forget:
//! subscribers that are offline miss the event.

use anyhow::Result;
use async_nats::Client;
use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

#[async_trait]
pub trait Broadcaster: Send + Sync {
    async fn broadcast(&self, channel: &str, event: serde_json::Value) -> Result<()>;
}

/// Serialize `event` and broadcast it on `channel`
pub async fn publish<T: Serialize + ?Sized>(
    broadcaster: &dyn Broadcaster,
    channel: &str,
    event: &T,
) -> Result<()> {
    broadcaster
        .broadcast(channel, serde_json::to_value(event)?)
        .await
}

/// Broadcaster publishing to core NATS
pub struct NatsBroadcaster {
    client: Client,
}

impl NatsBroadcaster {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Broadcaster for NatsBroadcaster {
    async fn broadcast(&self, channel: &str, event: serde_json::Value) -> Result<()> {
        let payload = serde_json::to_vec(&event)?;
        self.client.publish(channel.to_string(), payload.into()).await?;
        debug!("Broadcast on {}", channel);
        Ok(())
    }
}

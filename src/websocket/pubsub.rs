use futures::StreamExt;
use redis::Client;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppResult;
use crate::redis_client::RedisClient;
use crate::websocket::ConnectionRegistry;

pub const RELAY_CHANNEL: &str = "live-chat:relay";

/// A conversation frame already delivered locally, forwarded to the other
/// instances. Presence is per instance and never travels here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayEnvelope {
    /// Instance that delivered it first; it skips its own envelopes
    pub origin: Uuid,
    pub conversation_id: Uuid,
    pub payload: String,
}

pub async fn publish(redis: &RedisClient, envelope: &RelayEnvelope) -> AppResult<()> {
    let body = serde_json::to_string(envelope)?;
    redis.publish(RELAY_CHANNEL, &body).await?;
    Ok(())
}

/// Deliver a relayed frame to the local members of its conversation.
/// Returns connections reached.
pub fn apply_envelope(registry: &ConnectionRegistry, envelope: &RelayEnvelope) -> usize {
    registry.send_group(envelope.conversation_id, &envelope.payload, None)
}

pub async fn start_relay_listener(
    client: Client,
    registry: ConnectionRegistry,
    instance_id: Uuid,
) -> redis::RedisResult<()> {
    // PubSub requires a dedicated connection, not multiplexed
    let mut pubsub = client.get_async_pubsub().await?;
    pubsub.subscribe(RELAY_CHANNEL).await?;
    tracing::info!(channel = RELAY_CHANNEL, %instance_id, "relay listener subscribed");

    let mut stream = pubsub.on_message();
    while let Some(msg) = stream.next().await {
        let payload: String = match msg.get_payload() {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(error = %e, "unreadable relay payload");
                continue;
            }
        };
        let envelope: RelayEnvelope = match serde_json::from_str(&payload) {
            Ok(env) => env,
            Err(e) => {
                tracing::warn!(error = %e, "malformed relay envelope");
                continue;
            }
        };
        if envelope.origin == instance_id {
            continue;
        }
        let reached = apply_envelope(&registry, &envelope);
        tracing::debug!(conversation_id = %envelope.conversation_id, reached, "relayed frame delivered");
    }
    Ok(())
}

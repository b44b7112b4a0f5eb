use uuid::Uuid;

use crate::error::AppError;
use crate::metrics;
use crate::models::MessageView;
use crate::redis_client::RedisClient;
use crate::websocket::events::{PresenceStatus, WsOutboundEvent};
use crate::websocket::pubsub::{self, RelayEnvelope};
use crate::websocket::{ConnectionId, ConnectionRegistry};

/// Cross-instance forwarding for conversation frames delivered locally.
#[derive(Clone)]
pub struct Relay {
    pub redis: RedisClient,
    pub instance_id: Uuid,
}

/// Fans outbound events out to live connections.
///
/// Delivery is best effort: frames are queued on each connection's channel
/// without waiting, and a connection that has gone away is skipped.
#[derive(Clone)]
pub struct BroadcastRouter {
    registry: ConnectionRegistry,
    relay: Option<Relay>,
}

impl BroadcastRouter {
    pub fn new(registry: ConnectionRegistry) -> Self {
        Self {
            registry,
            relay: None,
        }
    }

    pub fn with_relay(mut self, relay: Relay) -> Self {
        self.relay = Some(relay);
        self
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// `message-received` to every connection joined to the conversation now.
    pub fn deliver_message(&self, message: &MessageView) -> usize {
        let conversation_id = message.message.conversation_id;
        let event = WsOutboundEvent::MessageReceived {
            message: message.clone(),
        };
        let Some(payload) = encode(&event) else {
            return 0;
        };

        let reached = self.registry.send_group(conversation_id, &payload, None);
        metrics::record_deliveries(event.event_type(), reached);
        tracing::debug!(
            message_id = %message.message.id,
            %conversation_id,
            reached,
            "message delivered"
        );
        self.relay(conversation_id, payload);
        reached
    }

    /// `typing-indicator` to the group, skipping the connection that typed.
    pub fn broadcast_typing(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        origin: ConnectionId,
        starting: bool,
    ) -> usize {
        let event = WsOutboundEvent::TypingIndicator {
            user_id,
            conversation_id,
            typing: starting,
        };
        let Some(payload) = encode(&event) else {
            return 0;
        };

        let reached = self
            .registry
            .send_group(conversation_id, &payload, Some(origin));
        metrics::record_deliveries(event.event_type(), reached);
        self.relay(conversation_id, payload);
        reached
    }

    /// `presence-update` to every connection on this instance. Online state is
    /// the local registry's, so the frame is not relayed.
    pub fn broadcast_presence(&self, user_id: Uuid, online: bool, total_online: usize) -> usize {
        let status = if online {
            PresenceStatus::Online
        } else {
            PresenceStatus::Offline
        };
        let event = WsOutboundEvent::PresenceUpdate {
            user_id,
            status,
            total_online,
        };
        let Some(payload) = encode(&event) else {
            return 0;
        };

        let reached = self.registry.send_all(&payload);
        metrics::record_deliveries(event.event_type(), reached);
        tracing::info!(%user_id, ?status, total_online, reached, "presence broadcast");
        reached
    }

    /// `message-error` to one connection only. Never relayed.
    pub fn send_error(&self, connection: ConnectionId, err: &AppError) -> bool {
        let event = WsOutboundEvent::from_error(err);
        match encode(&event) {
            Some(payload) => self.registry.send_to(connection, payload),
            None => false,
        }
    }

    fn relay(&self, conversation_id: Uuid, payload: String) {
        let Some(relay) = self.relay.clone() else {
            return;
        };
        let envelope = RelayEnvelope {
            origin: relay.instance_id,
            conversation_id,
            payload,
        };
        tokio::spawn(async move {
            if let Err(e) = pubsub::publish(&relay.redis, &envelope).await {
                tracing::warn!(error = %e, "relay publish failed");
            }
        });
    }
}

fn encode(event: &WsOutboundEvent) -> Option<String> {
    match event.to_payload() {
        Ok(payload) => Some(payload),
        Err(e) => {
            tracing::warn!(error = %e, kind = event.event_type(), "failed to encode outbound event");
            None
        }
    }
}

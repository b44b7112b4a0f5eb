use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::MessageType;

/// Inbound WebSocket events from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum WsInboundEvent {
    /// Bind this connection to a user. Must match the authenticated token.
    IdentityJoin { user_id: Uuid },

    GroupJoin { conversation_id: Uuid },

    GroupLeave { conversation_id: Uuid },

    SendMessage {
        conversation_id: Uuid,
        #[serde(default)]
        text: String,
        /// Optional; when present it must equal the bound identity
        #[serde(default)]
        sender_id: Option<Uuid>,
        #[serde(default)]
        message_type: Option<MessageType>,
        #[serde(default)]
        attachment_url: Option<String>,
    },

    TypingStart { conversation_id: Uuid },

    TypingStop { conversation_id: Uuid },
}

impl WsInboundEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::IdentityJoin { .. } => "identity-join",
            Self::GroupJoin { .. } => "group-join",
            Self::GroupLeave { .. } => "group-leave",
            Self::SendMessage { .. } => "send-message",
            Self::TypingStart { .. } => "typing-start",
            Self::TypingStop { .. } => "typing-stop",
        }
    }
}

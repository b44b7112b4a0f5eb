//! Outbound WebSocket events.
//!
//! Every frame the server pushes is one of these, serialized flat with a
//! kebab-case `type` tag:
//!
//! ```json
//! { "type": "typing-indicator", "user_id": "...", "conversation_id": "...", "typing": true }
//! ```

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::MessageView;
use error_types::error_codes;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Offline,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum WsOutboundEvent {
    /// A persisted message, with its sender populated
    MessageReceived { message: MessageView },

    /// Reported to the originating connection only
    MessageError { code: String, reason: String },

    TypingIndicator {
        user_id: Uuid,
        conversation_id: Uuid,
        typing: bool,
    },

    /// Global: goes to every open connection
    PresenceUpdate {
        user_id: Uuid,
        status: PresenceStatus,
        total_online: usize,
    },
}

impl WsOutboundEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::MessageReceived { .. } => "message-received",
            Self::MessageError { .. } => "message-error",
            Self::TypingIndicator { .. } => "typing-indicator",
            Self::PresenceUpdate { .. } => "presence-update",
        }
    }

    /// Storage failures surface as a generic delivery failure.
    pub fn from_error(err: &AppError) -> Self {
        let code = match err {
            AppError::Persistence(_) => error_codes::DELIVERY_FAILED,
            other => other.code(),
        };
        Self::MessageError {
            code: code.to_string(),
            reason: err.client_reason(),
        }
    }

    /// This is the only place outbound frames are serialized.
    pub fn to_payload(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typing_indicator_is_flat() {
        let user_id = Uuid::new_v4();
        let conversation_id = Uuid::new_v4();
        let payload = WsOutboundEvent::TypingIndicator {
            user_id,
            conversation_id,
            typing: true,
        }
        .to_payload()
        .unwrap();

        let parsed: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(parsed["type"], "typing-indicator");
        assert_eq!(parsed["user_id"], user_id.to_string());
        assert_eq!(parsed["conversation_id"], conversation_id.to_string());
        assert_eq!(parsed["typing"], true);
    }

    #[test]
    fn test_presence_update_status_is_lowercase() {
        let payload = WsOutboundEvent::PresenceUpdate {
            user_id: Uuid::new_v4(),
            status: PresenceStatus::Offline,
            total_online: 3,
        }
        .to_payload()
        .unwrap();

        let parsed: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(parsed["type"], "presence-update");
        assert_eq!(parsed["status"], "offline");
        assert_eq!(parsed["total_online"], 3);
    }

    #[test]
    fn test_persistence_error_frame_hides_details() {
        let evt = WsOutboundEvent::from_error(&AppError::Persistence("pool exhausted".into()));
        match &evt {
            WsOutboundEvent::MessageError { code, reason } => {
                assert_eq!(code, error_codes::DELIVERY_FAILED);
                assert_eq!(reason, "message delivery failed");
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(evt.event_type(), "message-error");
    }
}

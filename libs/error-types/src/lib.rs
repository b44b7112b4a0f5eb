use serde::{Deserialize, Serialize};

/// JSON error body returned by every HTTP endpoint of the chat service.
///
/// WebSocket clients receive the same `code` strings inside `message-error`
/// frames, so clients can share one error table across both channels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Short reason phrase ("Bad Request", "Forbidden", ...)
    pub error: String,

    /// Human readable description
    pub message: String,

    /// HTTP status code
    pub status: u16,

    /// Error class, one of the constants in [`error_types`]
    pub error_type: String,

    /// Stable machine code, one of the constants in [`error_codes`]
    pub code: String,

    /// RFC 3339 timestamp
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn new(error: &str, message: &str, status: u16, error_type: &str, code: &str) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
            status,
            error_type: error_type.to_string(),
            code: code.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Stable error codes
pub mod error_codes {
    // Input
    pub const VALIDATION_FAILED: &str = "VALIDATION_FAILED";
    pub const EMPTY_MESSAGE_BODY: &str = "EMPTY_MESSAGE_BODY";
    pub const MISSING_ATTACHMENT: &str = "MISSING_ATTACHMENT";
    pub const TOO_FEW_PARTICIPANTS: &str = "TOO_FEW_PARTICIPANTS";
    pub const IDENTITY_REQUIRED: &str = "IDENTITY_REQUIRED";
    pub const CANNOT_DELETE_SELF: &str = "CANNOT_DELETE_SELF";

    // Authentication / authorization
    pub const TOKEN_INVALID: &str = "TOKEN_INVALID";
    pub const NOT_CONVERSATION_MEMBER: &str = "NOT_CONVERSATION_MEMBER";
    pub const ADMIN_REQUIRED: &str = "ADMIN_REQUIRED";
    pub const NOT_MESSAGE_SENDER: &str = "NOT_MESSAGE_SENDER";

    // Lookup
    pub const CONVERSATION_NOT_FOUND: &str = "CONVERSATION_NOT_FOUND";
    pub const MESSAGE_NOT_FOUND: &str = "MESSAGE_NOT_FOUND";
    pub const USER_NOT_FOUND: &str = "USER_NOT_FOUND";

    // Storage / system
    pub const DELIVERY_FAILED: &str = "DELIVERY_FAILED";
    pub const STORAGE_UNAVAILABLE: &str = "STORAGE_UNAVAILABLE";
    pub const INTERNAL_SERVER_ERROR: &str = "INTERNAL_SERVER_ERROR";
}

/// Error classes used for client-side routing of failures
pub mod error_types {
    pub const VALIDATION_ERROR: &str = "validation_error";
    pub const AUTHENTICATION_ERROR: &str = "authentication_error";
    pub const AUTHORIZATION_ERROR: &str = "authorization_error";
    pub const NOT_FOUND_ERROR: &str = "not_found_error";
    pub const SERVER_ERROR: &str = "server_error";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_creation() {
        let error = ErrorResponse::new(
            "Not Found",
            "conversation not found",
            404,
            error_types::NOT_FOUND_ERROR,
            error_codes::CONVERSATION_NOT_FOUND,
        );

        assert_eq!(error.status, 404);
        assert_eq!(error.error_type, error_types::NOT_FOUND_ERROR);
        assert_eq!(error.code, error_codes::CONVERSATION_NOT_FOUND);
    }

    #[test]
    fn test_serialized_field_names() {
        let bare = ErrorResponse::new(
            "Bad Request",
            "message body is empty",
            400,
            error_types::VALIDATION_ERROR,
            error_codes::EMPTY_MESSAGE_BODY,
        );
        let json = serde_json::to_value(&bare).unwrap();
        assert_eq!(json["code"], "EMPTY_MESSAGE_BODY");
        assert_eq!(json["error_type"], "validation_error");
        assert_eq!(json["status"], 400);
    }
}

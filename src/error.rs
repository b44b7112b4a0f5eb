use crate::middleware::error_handling;
use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use error_types::error_codes;
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error, Clone)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("server start failure: {0}")]
    StartServer(String),

    /// Malformed input. Reported to the originator only.
    #[error("{message}")]
    Validation { code: &'static str, message: String },

    /// Missing or invalid bearer token
    #[error("unauthorized")]
    Unauthorized,

    /// Caller is not a participant of the conversation it addressed
    #[error("not a participant of this conversation")]
    NotAuthorized,

    /// Authenticated, but lacks the role the operation needs
    #[error("forbidden")]
    Forbidden,

    /// Only the author of a message may change it
    #[error("only the sender may modify this message")]
    NotSender,

    #[error("{0} not found")]
    NotFound(&'static str),

    /// Storage unavailable or a write failed
    #[error("persistence failure: {0}")]
    Persistence(String),

    #[error("relay error: {0}")]
    Relay(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("internal server error")]
    Internal,
}

impl AppError {
    pub fn validation(code: &'static str, message: impl Into<String>) -> Self {
        AppError::Validation {
            code,
            message: message.into(),
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            AppError::Validation { .. } => 400,
            AppError::Unauthorized => 401,
            AppError::NotAuthorized | AppError::Forbidden | AppError::NotSender => 403,
            AppError::NotFound(_) => 404,
            AppError::Persistence(_) => 503,
            _ => 500,
        }
    }

    /// Stable code shared by HTTP bodies and `message-error` frames.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation { code, .. } => code,
            AppError::Unauthorized => error_codes::TOKEN_INVALID,
            AppError::NotAuthorized => error_codes::NOT_CONVERSATION_MEMBER,
            AppError::Forbidden => error_codes::ADMIN_REQUIRED,
            AppError::NotSender => error_codes::NOT_MESSAGE_SENDER,
            AppError::NotFound("conversation") => error_codes::CONVERSATION_NOT_FOUND,
            AppError::NotFound("message") => error_codes::MESSAGE_NOT_FOUND,
            AppError::NotFound(_) => error_codes::USER_NOT_FOUND,
            AppError::Persistence(_) => error_codes::STORAGE_UNAVAILABLE,
            _ => error_codes::INTERNAL_SERVER_ERROR,
        }
    }

    /// Text safe to hand back over the live channel. Storage details stay in logs.
    pub fn client_reason(&self) -> String {
        match self {
            AppError::Persistence(_) => "message delivery failed".to_string(),
            AppError::Config(_)
            | AppError::StartServer(_)
            | AppError::Relay(_)
            | AppError::Serialization(_)
            | AppError::Internal => "internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    fn error_response(&self) -> HttpResponse {
        error_handling::into_response(self)
    }
}

impl From<tokio_postgres::Error> for AppError {
    fn from(e: tokio_postgres::Error) -> Self {
        AppError::Persistence(e.to_string())
    }
}

impl From<deadpool_postgres::PoolError> for AppError {
    fn from(e: deadpool_postgres::PoolError) -> Self {
        AppError::Persistence(e.to_string())
    }
}

impl From<redis::RedisError> for AppError {
    fn from(e: redis::RedisError) -> Self {
        AppError::Relay(e.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            AppError::validation(error_codes::EMPTY_MESSAGE_BODY, "empty").http_status(),
            400
        );
        assert_eq!(AppError::Unauthorized.http_status(), 401);
        assert_eq!(AppError::NotAuthorized.http_status(), 403);
        assert_eq!(AppError::NotFound("conversation").http_status(), 404);
        assert_eq!(AppError::Persistence("down".into()).http_status(), 503);
        assert_eq!(AppError::Internal.http_status(), 500);
    }

    #[test]
    fn test_not_found_codes_follow_resource() {
        assert_eq!(
            AppError::NotFound("conversation").code(),
            error_codes::CONVERSATION_NOT_FOUND
        );
        assert_eq!(
            AppError::NotFound("message").code(),
            error_codes::MESSAGE_NOT_FOUND
        );
        assert_eq!(AppError::NotFound("user").code(), error_codes::USER_NOT_FOUND);
    }

    #[test]
    fn test_persistence_reason_hides_storage_detail() {
        let err = AppError::Persistence("connection refused (os error 111)".into());
        assert_eq!(err.client_reason(), "message delivery failed");
        assert!(!err.client_reason().contains("111"));
    }
}

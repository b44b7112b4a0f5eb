use crate::error::AppError;
use actix_web::{http::StatusCode, HttpResponse};
use error_types::{error_types as kinds, ErrorResponse};

/// Map a domain error to its HTTP status and JSON body.
pub fn map_error(err: &AppError) -> (StatusCode, ErrorResponse) {
    let status =
        StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let error_type = match err {
        AppError::Validation { .. } => kinds::VALIDATION_ERROR,
        AppError::Unauthorized => kinds::AUTHENTICATION_ERROR,
        AppError::NotAuthorized | AppError::Forbidden | AppError::NotSender => {
            kinds::AUTHORIZATION_ERROR
        }
        AppError::NotFound(_) => kinds::NOT_FOUND_ERROR,
        _ => kinds::SERVER_ERROR,
    };

    if status.is_server_error() {
        tracing::error!(error = %err, status = status.as_u16(), "request failed");
    }

    let response = ErrorResponse::new(
        status.canonical_reason().unwrap_or("Error"),
        &err.client_reason(),
        status.as_u16(),
        error_type,
        err.code(),
    );

    (status, response)
}

pub fn into_response(err: &AppError) -> HttpResponse {
    let (status, response) = map_error(err);
    HttpResponse::build(status).json(response)
}

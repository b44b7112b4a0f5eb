use crate::error::AppError;
use crate::middleware::guards::AuthUser;
use crate::models::MessageType;
use crate::services::IncomingMessage;
use crate::state::AppState;
use actix_web::{delete, get, post, put, web, HttpResponse};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Deserialize)]
pub struct SendMessageRequest {
    pub conversation_id: Uuid,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub message_type: MessageType,
    #[serde(default)]
    pub attachment_url: Option<String>,
}

#[get("/messages/{conversation_id}")]
pub async fn get_messages(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let history = state.messages.history(path.into_inner(), user.id).await?;
    Ok(HttpResponse::Ok().json(history))
}

/// Same pipeline as the socket path, so live participants see it too.
#[post("/messages")]
pub async fn send_message(
    state: web::Data<AppState>,
    user: AuthUser,
    body: web::Json<SendMessageRequest>,
) -> Result<HttpResponse, AppError> {
    let body = body.into_inner();
    let view = state
        .messages
        .ingest(IncomingMessage {
            conversation_id: body.conversation_id,
            sender_id: user.id,
            body: body.text,
            message_type: body.message_type,
            attachment_url: body.attachment_url,
        })
        .await?;
    Ok(HttpResponse::Created().json(view))
}

#[put("/messages/{message_id}/read")]
pub async fn mark_read(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let message = state.messages.mark_read(path.into_inner(), user.id).await?;
    Ok(HttpResponse::Ok().json(message))
}

#[delete("/messages/{message_id}")]
pub async fn delete_message(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    state.messages.soft_delete(path.into_inner(), user.id).await?;
    Ok(HttpResponse::NoContent().finish())
}

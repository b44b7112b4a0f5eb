use crate::error::AppError;
use crate::middleware::guards::AuthUser;
use crate::state::AppState;
use actix_web::{get, post, web, HttpResponse};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Deserialize)]
pub struct CreateConversationRequest {
    /// Other participants; the caller is always added
    pub participants: Vec<Uuid>,
}

#[get("/conversations")]
pub async fn get_conversations(
    state: web::Data<AppState>,
    user: AuthUser,
) -> Result<HttpResponse, AppError> {
    let conversations = state.conversations.list_for_user(user.id).await?;
    Ok(HttpResponse::Ok().json(conversations))
}

#[post("/conversations")]
pub async fn create_conversation(
    state: web::Data<AppState>,
    user: AuthUser,
    body: web::Json<CreateConversationRequest>,
) -> Result<HttpResponse, AppError> {
    let conversation = state
        .conversations
        .create_conversation(&body.participants, user.id)
        .await?;
    Ok(HttpResponse::Created().json(conversation))
}

use crate::error::AppError;
use crate::middleware::guards::AdminUser;
use crate::models::{ActivityStatus, PageRequest, UserRole};
use crate::services::admin_service::{
    UserQuery, DEFAULT_CONVERSATION_PAGE, DEFAULT_MESSAGE_PAGE,
};
use crate::state::AppState;
use actix_web::{delete, get, put, web, HttpResponse};
use chrono::Utc;
use error_types::error_codes;
use serde::Deserialize;
use uuid::Uuid;

#[derive(Deserialize)]
pub struct UserListQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    /// Substring of name or email
    pub search: Option<String>,
    pub role: Option<String>,
    /// `active` or `offline`; absent lists everyone
    pub status: Option<String>,
}

impl UserListQuery {
    fn parse(self) -> Result<UserQuery, AppError> {
        let status = match self.status.as_deref() {
            None | Some("") | Some("all") => None,
            Some(raw) => Some(ActivityStatus::from_query(raw).ok_or_else(|| {
                AppError::validation(
                    error_codes::VALIDATION_FAILED,
                    format!("unknown status filter: {raw}"),
                )
            })?),
        };
        let role = match self.role.as_deref() {
            None | Some("") | Some("all") => None,
            Some(raw) => Some(UserRole::from_db(raw).ok_or_else(|| {
                AppError::validation(
                    error_codes::VALIDATION_FAILED,
                    format!("unknown role filter: {raw}"),
                )
            })?),
        };
        Ok(UserQuery {
            page: self.page,
            limit: self.limit,
            search: self.search,
            role,
            status,
        })
    }
}

#[derive(Deserialize)]
pub struct MessageListQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub conversation_id: Option<Uuid>,
}

#[derive(Deserialize)]
pub struct PageQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Deserialize)]
pub struct UserStatusRequest {
    pub is_active: bool,
}

#[get("/admin/presence")]
pub async fn get_presence(
    state: web::Data<AppState>,
    _admin: AdminUser,
) -> Result<HttpResponse, AppError> {
    Ok(HttpResponse::Ok().json(state.presence.snapshot()))
}

#[get("/admin/users")]
pub async fn list_users(
    state: web::Data<AppState>,
    _admin: AdminUser,
    query: web::Query<UserListQuery>,
) -> Result<HttpResponse, AppError> {
    let query = query.into_inner().parse()?;
    let users = state.admin.list_users(query, Utc::now()).await?;
    Ok(HttpResponse::Ok().json(users))
}

#[get("/admin/messages")]
pub async fn list_messages(
    state: web::Data<AppState>,
    _admin: AdminUser,
    query: web::Query<MessageListQuery>,
) -> Result<HttpResponse, AppError> {
    let request = PageRequest::new(query.page, query.limit, DEFAULT_MESSAGE_PAGE);
    let messages = state
        .admin
        .list_messages(query.conversation_id, request)
        .await?;
    Ok(HttpResponse::Ok().json(messages))
}

#[get("/admin/conversations")]
pub async fn list_conversations(
    state: web::Data<AppState>,
    _admin: AdminUser,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, AppError> {
    let request = PageRequest::new(query.page, query.limit, DEFAULT_CONVERSATION_PAGE);
    Ok(HttpResponse::Ok().json(state.admin.list_conversations(request).await?))
}

#[put("/admin/users/{user_id}/status")]
pub async fn set_user_status(
    state: web::Data<AppState>,
    _admin: AdminUser,
    path: web::Path<Uuid>,
    body: web::Json<UserStatusRequest>,
) -> Result<HttpResponse, AppError> {
    let user = state
        .admin
        .set_user_active(path.into_inner(), body.is_active)
        .await?;
    Ok(HttpResponse::Ok().json(user))
}

#[delete("/admin/users/{user_id}")]
pub async fn delete_user(
    state: web::Data<AppState>,
    admin: AdminUser,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let user_id = path.into_inner();
    tracing::info!(admin_id = %admin.0.id, %user_id, "admin deleting user");
    let removal = state.admin.delete_user(admin.0.id, user_id).await?;
    Ok(HttpResponse::Ok().json(removal))
}

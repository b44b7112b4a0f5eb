use crate::error::AppError;
use crate::middleware::guards::AuthUser;
use crate::models::ProfileUpdate;
use crate::state::AppState;
use actix_web::{get, put, web, HttpResponse};
use uuid::Uuid;

#[get("/profile")]
pub async fn get_own_profile(
    state: web::Data<AppState>,
    user: AuthUser,
) -> Result<HttpResponse, AppError> {
    Ok(HttpResponse::Ok().json(state.profiles.own(user.id).await?))
}

#[put("/profile")]
pub async fn update_profile(
    state: web::Data<AppState>,
    user: AuthUser,
    body: web::Json<ProfileUpdate>,
) -> Result<HttpResponse, AppError> {
    let updated = state.profiles.update(user.id, body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(updated))
}

#[get("/profile/search/{query}")]
pub async fn search_users(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let hits = state.profiles.search(&path.into_inner(), user.id).await?;
    Ok(HttpResponse::Ok().json(hits))
}

#[get("/profile/{user_id}")]
pub async fn get_public_profile(
    state: web::Data<AppState>,
    _user: AuthUser,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    Ok(HttpResponse::Ok().json(state.profiles.public(path.into_inner()).await?))
}

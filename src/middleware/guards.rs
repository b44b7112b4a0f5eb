//! Request extractors that enforce authentication and roles at the type level,
//! so a handler cannot forget the check.

use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use futures::future::{ready, Ready};
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::auth::{bearer_token, verify_jwt};
use crate::models::UserRole;
use crate::state::AppState;

/// Caller identity taken from a verified bearer token
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub id: Uuid,
    pub role: UserRole,
}

impl AuthUser {
    pub fn from_http_request(req: &HttpRequest) -> Result<Self, AppError> {
        let state = req
            .app_data::<web::Data<AppState>>()
            .ok_or(AppError::Internal)?;
        let token = bearer_token(req).ok_or(AppError::Unauthorized)?;
        let claims = verify_jwt(&token, &state.config.jwt_secret)?;
        Ok(AuthUser {
            id: claims.user_id()?,
            role: claims.role,
        })
    }
}

impl FromRequest for AuthUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(AuthUser::from_http_request(req))
    }
}

/// An `AuthUser` whose role is `admin`
#[derive(Debug, Clone, Copy)]
pub struct AdminUser(pub AuthUser);

impl FromRequest for AdminUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(AuthUser::from_http_request(req).and_then(|user| {
            if user.role.is_admin() {
                Ok(AdminUser(user))
            } else {
                tracing::warn!(user_id = %user.id, role = %user.role, "admin route refused");
                Err(AppError::Forbidden)
            }
        }))
    }
}

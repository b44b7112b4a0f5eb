use actix_web::{http::header, HttpRequest};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::UserRole;

/// Claims of the bearer tokens issued by the auth collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Some issuers put the user id under `id`
    #[serde(alias = "id")]
    pub sub: String,
    #[serde(default)]
    pub role: UserRole,
    pub exp: usize,
}

impl Claims {
    pub fn user_id(&self) -> AppResult<Uuid> {
        Uuid::parse_str(&self.sub).map_err(|_| AppError::Unauthorized)
    }
}

pub fn verify_jwt(token: &str, secret: &str) -> AppResult<Claims> {
    let validation = Validation::new(Algorithm::HS256);
    decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map(|data| data.claims)
        .map_err(|e| {
            tracing::debug!(error = %e, "token rejected");
            AppError::Unauthorized
        })
}

/// `Authorization: Bearer <token>`, if present.
pub fn bearer_token(req: &HttpRequest) -> Option<String> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn token(sub: &str, role: UserRole, exp: usize, secret: &str) -> String {
        let claims = Claims {
            sub: sub.to_string(),
            role,
            exp,
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn in_an_hour() -> usize {
        (chrono::Utc::now().timestamp() + 3600) as usize
    }

    #[test]
    fn test_valid_token_yields_user() {
        let user = Uuid::new_v4();
        let t = token(&user.to_string(), UserRole::Admin, in_an_hour(), "k");
        let claims = verify_jwt(&t, "k").unwrap();
        assert_eq!(claims.user_id().unwrap(), user);
        assert!(claims.role.is_admin());
    }

    #[test]
    fn test_wrong_secret_and_expired_are_rejected() {
        let user = Uuid::new_v4().to_string();
        let t = token(&user, UserRole::Customer, in_an_hour(), "k");
        assert!(matches!(verify_jwt(&t, "other"), Err(AppError::Unauthorized)));

        let stale = token(&user, UserRole::Customer, 1_000, "k");
        assert!(matches!(verify_jwt(&stale, "k"), Err(AppError::Unauthorized)));
    }

    #[test]
    fn test_id_claim_is_accepted_as_subject() {
        let user = Uuid::new_v4();
        let t = encode(
            &Header::new(Algorithm::HS256),
            &serde_json::json!({ "id": user.to_string(), "exp": in_an_hour() }),
            &EncodingKey::from_secret(b"k"),
        )
        .unwrap();
        let claims = verify_jwt(&t, "k").unwrap();
        assert_eq!(claims.user_id().unwrap(), user);
        assert_eq!(claims.role, UserRole::default());
    }

    #[test]
    fn test_non_uuid_subject_is_unauthorized() {
        let t = token("alice", UserRole::Customer, in_an_hour(), "k");
        let claims = verify_jwt(&t, "k").unwrap();
        assert!(matches!(claims.user_id(), Err(AppError::Unauthorized)));
    }

    #[test]
    fn test_bearer_header_parsing() {
        let req = actix_web::test::TestRequest::default()
            .insert_header((header::AUTHORIZATION, "Bearer abc"))
            .to_http_request();
        assert_eq!(bearer_token(&req).as_deref(), Some("abc"));

        let req = actix_web::test::TestRequest::default()
            .insert_header((header::AUTHORIZATION, "Basic abc"))
            .to_http_request();
        assert!(bearer_token(&req).is_none());
    }
}

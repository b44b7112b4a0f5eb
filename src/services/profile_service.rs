use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{ProfileUpdate, PublicProfile, User, UserFilter, UserRole};
use crate::store::ChatStore;
use error_types::error_codes;

pub const SEARCH_LIMIT: u64 = 10;

/// One user-search hit.
#[derive(Debug, Clone, Serialize)]
pub struct ProfileMatch {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: UserRole,
    pub profile_photo: String,
}

impl From<User> for ProfileMatch {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            role: user.role,
            profile_photo: user.profile_photo,
        }
    }
}

/// Self-service profile reads and edits, plus user lookup for starting chats.
#[derive(Clone)]
pub struct ProfileService {
    store: Arc<dyn ChatStore>,
}

impl ProfileService {
    pub fn new(store: Arc<dyn ChatStore>) -> Self {
        Self { store }
    }

    pub async fn own(&self, user_id: Uuid) -> AppResult<User> {
        self.store
            .find_user(user_id)
            .await?
            .ok_or(AppError::NotFound("user"))
    }

    pub async fn public(&self, user_id: Uuid) -> AppResult<PublicProfile> {
        Ok(self.own(user_id).await?.public_profile())
    }

    /// Apply `update` to the caller's own profile. A supplied name is trimmed
    /// and must not be blank.
    pub async fn update(&self, user_id: Uuid, mut update: ProfileUpdate) -> AppResult<User> {
        if let Some(name) = update.name.take() {
            let name = name.trim();
            if name.is_empty() {
                return Err(AppError::validation(
                    error_codes::VALIDATION_FAILED,
                    "name cannot be empty",
                ));
            }
            update.name = Some(name.to_string());
        }

        let user = self
            .store
            .update_profile(user_id, &update)
            .await?
            .ok_or(AppError::NotFound("user"))?;
        tracing::info!(%user_id, "profile updated");
        Ok(user)
    }

    /// Users whose name or email contains `query`, never the caller.
    pub async fn search(&self, query: &str, caller: Uuid) -> AppResult<Vec<ProfileMatch>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let filter = UserFilter {
            search: Some(query.to_string()),
            exclude: Some(caller),
            ..Default::default()
        };
        let users = self.store.list_users_page(&filter, 0, SEARCH_LIMIT).await?;
        Ok(users.into_iter().map(ProfileMatch::from).collect())
    }
}

//! Persistence seams.
//!
//! The core depends on these traits only. `PgStore` backs production,
//! `MemoryStore` backs tests and local runs without a database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{Conversation, Message, NewMessage, ProfileUpdate, User, UserFilter};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_user(&self, id: Uuid) -> AppResult<Option<User>>;

    /// Newest accounts first.
    async fn list_users_page(
        &self,
        filter: &UserFilter,
        offset: u64,
        limit: u64,
    ) -> AppResult<Vec<User>>;

    async fn count_users(&self, filter: &UserFilter) -> AppResult<u64>;

    async fn update_profile(&self, id: Uuid, update: &ProfileUpdate) -> AppResult<Option<User>>;

    async fn touch_last_seen(&self, id: Uuid, at: DateTime<Utc>) -> AppResult<()>;

    /// Bulk variant used by the presence sweep. Returns rows updated.
    async fn touch_last_seen_many(&self, ids: &[Uuid], at: DateTime<Utc>) -> AppResult<u64>;

    async fn set_user_active(&self, id: Uuid, is_active: bool) -> AppResult<Option<User>>;

    async fn delete_user(&self, id: Uuid) -> AppResult<bool>;
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// The conversation `id`, only if `user_id` is among its participants.
    async fn find_conversation_for(
        &self,
        id: Uuid,
        user_id: Uuid,
    ) -> AppResult<Option<Conversation>>;

    /// Most recently updated first.
    async fn list_conversations_for(&self, user_id: Uuid) -> AppResult<Vec<Conversation>>;

    async fn create_conversation(&self, participants: &[Uuid]) -> AppResult<Conversation>;

    /// Points the conversation at `message_id` unless it already references a
    /// message created after `created_at`. `Ok(false)` when left unchanged.
    async fn set_last_message(
        &self,
        conversation_id: Uuid,
        message_id: Uuid,
        created_at: DateTime<Utc>,
    ) -> AppResult<bool>;

    /// Removes `user_id` from one conversation. `false` if it was not a participant.
    async fn pull_participant(&self, conversation_id: Uuid, user_id: Uuid) -> AppResult<bool>;

    /// Removes `user_id` from every conversation. Returns conversations touched.
    async fn pull_participant_everywhere(&self, user_id: Uuid) -> AppResult<u64>;

    /// Deletes conversations whose participant set is empty. Returns rows deleted.
    async fn delete_empty_conversations(&self) -> AppResult<u64>;

    /// Every conversation, most recently updated first.
    async fn list_conversations_page(&self, offset: u64, limit: u64) -> AppResult<Vec<Conversation>>;

    async fn count_conversations(&self) -> AppResult<u64>;
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persists with `read_by = {sender}` and `is_deleted = false`.
    async fn create_message(&self, new: NewMessage) -> AppResult<Message>;

    async fn find_message(&self, id: Uuid) -> AppResult<Option<Message>>;

    /// Non-deleted messages, oldest first.
    async fn find_messages_by_conversation(&self, conversation_id: Uuid) -> AppResult<Vec<Message>>;

    /// Newest first, deleted messages included. `None` spans all conversations.
    async fn list_messages_page(
        &self,
        conversation_id: Option<Uuid>,
        offset: u64,
        limit: u64,
    ) -> AppResult<Vec<Message>>;

    async fn count_messages(&self, conversation_id: Option<Uuid>) -> AppResult<u64>;

    /// Set-add semantics: adding an existing reader is a no-op.
    async fn add_reader(&self, message_id: Uuid, user_id: Uuid) -> AppResult<Option<Message>>;

    async fn soft_delete_message(&self, message_id: Uuid) -> AppResult<Option<Message>>;

    async fn soft_delete_messages_by_sender(&self, sender_id: Uuid) -> AppResult<u64>;
}

/// Everything the core needs from storage, behind one object.
pub trait ChatStore: UserStore + ConversationStore + MessageStore {}

impl<T> ChatStore for T where T: UserStore + ConversationStore + MessageStore {}

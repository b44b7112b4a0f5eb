use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;
use tokio_postgres::types::Json;
use tokio_postgres::Row;
use uuid::Uuid;

use super::{ConversationStore, MessageStore, UserStore};
use crate::error::{AppError, AppResult};
use crate::models::{
    Address, Conversation, LastSeen, Message, MessageType, NewMessage, Preferences, ProfileUpdate,
    User, UserFilter, UserRole,
};

const USER_COLUMNS: &str = "id, name, email, role, profile_photo, bio, phone, address, \
                            preferences, is_active, last_seen, created_at";

// Every criterion is optional; a NULL parameter disables it.
const USER_FILTER: &str = "($1::text IS NULL \
                               OR strpos(lower(name), lower($1)) > 0 \
                               OR strpos(lower(email), lower($1)) > 0) \
                           AND ($2::text IS NULL OR role = $2) \
                           AND ($3::timestamptz IS NULL OR last_seen > $3) \
                           AND ($4::timestamptz IS NULL OR last_seen <= $4) \
                           AND ($5::uuid IS NULL OR id <> $5)";
const CONVERSATION_COLUMNS: &str = "id, participants, last_message_id, created_at, updated_at";
const MESSAGE_COLUMNS: &str = "id, conversation_id, sender_id, body, message_type, \
                               attachment_url, read_by, is_deleted, created_at";

/// PostgreSQL-backed store. Participant and receipt sets are `uuid[]` columns.
#[derive(Clone)]
pub struct PgStore {
    pool: Pool,
}

impl PgStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

fn user_from_row(row: &Row) -> AppResult<User> {
    let role: String = row.get("role");
    Ok(User {
        id: row.get("id"),
        name: row.get("name"),
        email: row.get("email"),
        role: UserRole::from_db(&role)
            .ok_or_else(|| AppError::Persistence(format!("unknown role in users table: {role}")))?,
        profile_photo: row.get("profile_photo"),
        bio: row.get("bio"),
        phone: row.get("phone"),
        address: row.get::<_, Json<Address>>("address").0,
        preferences: row.get::<_, Json<Preferences>>("preferences").0,
        is_active: row.get("is_active"),
        last_seen: row.get("last_seen"),
        created_at: row.get("created_at"),
    })
}

/// Bind values for `USER_FILTER`, in placeholder order.
struct FilterParams {
    search: Option<String>,
    role: Option<&'static str>,
    after: Option<DateTime<Utc>>,
    at_or_before: Option<DateTime<Utc>>,
    exclude: Option<Uuid>,
}

impl From<&UserFilter> for FilterParams {
    fn from(filter: &UserFilter) -> Self {
        let (after, at_or_before) = match filter.last_seen {
            Some(LastSeen::After(at)) => (Some(at), None),
            Some(LastSeen::AtOrBefore(at)) => (None, Some(at)),
            None => (None, None),
        };
        Self {
            search: filter.search.clone(),
            role: filter.role.map(|r| r.to_db()),
            after,
            at_or_before,
            exclude: filter.exclude,
        }
    }
}

fn to_i64(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn conversation_from_row(row: &Row) -> Conversation {
    let participants: Vec<Uuid> = row.get("participants");
    Conversation {
        id: row.get("id"),
        participants: participants.into_iter().collect(),
        last_message_id: row.get("last_message_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn message_from_row(row: &Row) -> AppResult<Message> {
    let message_type: String = row.get("message_type");
    let read_by: Vec<Uuid> = row.get("read_by");
    Ok(Message {
        id: row.get("id"),
        conversation_id: row.get("conversation_id"),
        sender_id: row.get("sender_id"),
        body: row.get("body"),
        message_type: MessageType::from_db(&message_type).ok_or_else(|| {
            AppError::Persistence(format!("unknown message_type: {message_type}"))
        })?,
        attachment_url: row.get("attachment_url"),
        read_by: read_by.into_iter().collect(),
        is_deleted: row.get("is_deleted"),
        created_at: row.get("created_at"),
    })
}

#[async_trait]
impl UserStore for PgStore {
    async fn find_user(&self, id: Uuid) -> AppResult<Option<User>> {
        let client = self.pool.get().await?;
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        client
            .query_opt(sql.as_str(), &[&id])
            .await?
            .as_ref()
            .map(user_from_row)
            .transpose()
    }

    async fn list_users_page(
        &self,
        filter: &UserFilter,
        offset: u64,
        limit: u64,
    ) -> AppResult<Vec<User>> {
        let client = self.pool.get().await?;
        let p = FilterParams::from(filter);
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE {USER_FILTER} \
             ORDER BY created_at DESC, id ASC LIMIT $6 OFFSET $7"
        );
        client
            .query(
                sql.as_str(),
                &[
                    &p.search,
                    &p.role,
                    &p.after,
                    &p.at_or_before,
                    &p.exclude,
                    &to_i64(limit),
                    &to_i64(offset),
                ],
            )
            .await?
            .iter()
            .map(user_from_row)
            .collect()
    }

    async fn count_users(&self, filter: &UserFilter) -> AppResult<u64> {
        let client = self.pool.get().await?;
        let p = FilterParams::from(filter);
        let sql = format!("SELECT COUNT(*) AS total FROM users WHERE {USER_FILTER}");
        let row = client
            .query_one(
                sql.as_str(),
                &[&p.search, &p.role, &p.after, &p.at_or_before, &p.exclude],
            )
            .await?;
        let total: i64 = row.get("total");
        Ok(total.max(0) as u64)
    }

    async fn update_profile(&self, id: Uuid, update: &ProfileUpdate) -> AppResult<Option<User>> {
        let client = self.pool.get().await?;
        let sql = format!(
            "UPDATE users SET \
                 name = COALESCE($2, name), \
                 bio = COALESCE($3, bio), \
                 phone = COALESCE($4, phone), \
                 address = COALESCE($5, address), \
                 preferences = COALESCE($6, preferences) \
             WHERE id = $1 RETURNING {USER_COLUMNS}"
        );
        client
            .query_opt(
                sql.as_str(),
                &[
                    &id,
                    &update.name,
                    &update.bio,
                    &update.phone,
                    &update.address.as_ref().map(Json),
                    &update.preferences.map(Json),
                ],
            )
            .await?
            .as_ref()
            .map(user_from_row)
            .transpose()
    }

    async fn touch_last_seen(&self, id: Uuid, at: DateTime<Utc>) -> AppResult<()> {
        let client = self.pool.get().await?;
        client
            .execute("UPDATE users SET last_seen = $2 WHERE id = $1", &[&id, &at])
            .await?;
        Ok(())
    }

    async fn touch_last_seen_many(&self, ids: &[Uuid], at: DateTime<Utc>) -> AppResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let client = self.pool.get().await?;
        let updated = client
            .execute(
                "UPDATE users SET last_seen = $2 WHERE id = ANY($1)",
                &[&ids, &at],
            )
            .await?;
        Ok(updated)
    }

    async fn set_user_active(&self, id: Uuid, is_active: bool) -> AppResult<Option<User>> {
        let client = self.pool.get().await?;
        let sql = format!("UPDATE users SET is_active = $2 WHERE id = $1 RETURNING {USER_COLUMNS}");
        client
            .query_opt(sql.as_str(), &[&id, &is_active])
            .await?
            .as_ref()
            .map(user_from_row)
            .transpose()
    }

    async fn delete_user(&self, id: Uuid) -> AppResult<bool> {
        let client = self.pool.get().await?;
        let deleted = client
            .execute("DELETE FROM users WHERE id = $1", &[&id])
            .await?;
        Ok(deleted > 0)
    }
}

#[async_trait]
impl ConversationStore for PgStore {
    async fn find_conversation_for(
        &self,
        id: Uuid,
        user_id: Uuid,
    ) -> AppResult<Option<Conversation>> {
        let client = self.pool.get().await?;
        let sql = format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = $1 AND $2 = ANY(participants)"
        );
        Ok(client
            .query_opt(sql.as_str(), &[&id, &user_id])
            .await?
            .as_ref()
            .map(conversation_from_row))
    }

    async fn list_conversations_for(&self, user_id: Uuid) -> AppResult<Vec<Conversation>> {
        let client = self.pool.get().await?;
        let sql = format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations \
             WHERE $1 = ANY(participants) ORDER BY updated_at DESC"
        );
        Ok(client
            .query(sql.as_str(), &[&user_id])
            .await?
            .iter()
            .map(conversation_from_row)
            .collect())
    }

    async fn create_conversation(&self, participants: &[Uuid]) -> AppResult<Conversation> {
        let client = self.pool.get().await?;
        let id = Uuid::new_v4();
        let sql = format!(
            "INSERT INTO conversations (id, participants) VALUES ($1, $2) \
             RETURNING {CONVERSATION_COLUMNS}"
        );
        let row = client.query_one(sql.as_str(), &[&id, &participants]).await?;
        Ok(conversation_from_row(&row))
    }

    async fn set_last_message(
        &self,
        conversation_id: Uuid,
        message_id: Uuid,
        created_at: DateTime<Utc>,
    ) -> AppResult<bool> {
        let client = self.pool.get().await?;
        let updated = client
            .execute(
                "UPDATE conversations c SET last_message_id = $2, updated_at = NOW() \
                 WHERE c.id = $1 AND NOT EXISTS ( \
                     SELECT 1 FROM messages m \
                     WHERE m.id = c.last_message_id AND m.created_at > $3)",
                &[&conversation_id, &message_id, &created_at],
            )
            .await?;
        if updated > 0 {
            return Ok(true);
        }
        let exists = client
            .query_opt("SELECT 1 FROM conversations WHERE id = $1", &[&conversation_id])
            .await?
            .is_some();
        if exists {
            Ok(false)
        } else {
            Err(AppError::NotFound("conversation"))
        }
    }

    async fn pull_participant(&self, conversation_id: Uuid, user_id: Uuid) -> AppResult<bool> {
        let client = self.pool.get().await?;
        let updated = client
            .execute(
                "UPDATE conversations \
                 SET participants = array_remove(participants, $2), updated_at = NOW() \
                 WHERE id = $1 AND $2 = ANY(participants)",
                &[&conversation_id, &user_id],
            )
            .await?;
        Ok(updated > 0)
    }

    async fn pull_participant_everywhere(&self, user_id: Uuid) -> AppResult<u64> {
        let client = self.pool.get().await?;
        let updated = client
            .execute(
                "UPDATE conversations \
                 SET participants = array_remove(participants, $1), updated_at = NOW() \
                 WHERE $1 = ANY(participants)",
                &[&user_id],
            )
            .await?;
        Ok(updated)
    }

    async fn delete_empty_conversations(&self) -> AppResult<u64> {
        let client = self.pool.get().await?;
        let deleted = client
            .execute(
                "DELETE FROM conversations WHERE cardinality(participants) = 0",
                &[],
            )
            .await?;
        Ok(deleted)
    }

    async fn list_conversations_page(&self, offset: u64, limit: u64) -> AppResult<Vec<Conversation>> {
        let client = self.pool.get().await?;
        let sql = format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations \
             ORDER BY updated_at DESC, id ASC LIMIT $1 OFFSET $2"
        );
        Ok(client
            .query(sql.as_str(), &[&to_i64(limit), &to_i64(offset)])
            .await?
            .iter()
            .map(conversation_from_row)
            .collect())
    }

    async fn count_conversations(&self) -> AppResult<u64> {
        let client = self.pool.get().await?;
        let row = client
            .query_one("SELECT COUNT(*) AS total FROM conversations", &[])
            .await?;
        let total: i64 = row.get("total");
        Ok(total.max(0) as u64)
    }
}

#[async_trait]
impl MessageStore for PgStore {
    async fn create_message(&self, new: NewMessage) -> AppResult<Message> {
        let client = self.pool.get().await?;
        let id = Uuid::new_v4();
        let read_by = vec![new.sender_id];
        let sql = format!(
            "INSERT INTO messages \
             (id, conversation_id, sender_id, body, message_type, attachment_url, read_by) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {MESSAGE_COLUMNS}"
        );
        let row = client
            .query_one(
                sql.as_str(),
                &[
                    &id,
                    &new.conversation_id,
                    &new.sender_id,
                    &new.body,
                    &new.message_type.to_db(),
                    &new.attachment_url,
                    &read_by,
                ],
            )
            .await?;
        message_from_row(&row)
    }

    async fn find_message(&self, id: Uuid) -> AppResult<Option<Message>> {
        let client = self.pool.get().await?;
        let sql = format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1");
        client
            .query_opt(sql.as_str(), &[&id])
            .await?
            .as_ref()
            .map(message_from_row)
            .transpose()
    }

    async fn find_messages_by_conversation(&self, conversation_id: Uuid) -> AppResult<Vec<Message>> {
        let client = self.pool.get().await?;
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages \
             WHERE conversation_id = $1 AND NOT is_deleted ORDER BY created_at ASC, id ASC"
        );
        client
            .query(sql.as_str(), &[&conversation_id])
            .await?
            .iter()
            .map(message_from_row)
            .collect()
    }

    async fn list_messages_page(
        &self,
        conversation_id: Option<Uuid>,
        offset: u64,
        limit: u64,
    ) -> AppResult<Vec<Message>> {
        let client = self.pool.get().await?;
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages \
             WHERE ($1::uuid IS NULL OR conversation_id = $1) \
             ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3"
        );
        client
            .query(
                sql.as_str(),
                &[&conversation_id, &to_i64(limit), &to_i64(offset)],
            )
            .await?
            .iter()
            .map(message_from_row)
            .collect()
    }

    async fn count_messages(&self, conversation_id: Option<Uuid>) -> AppResult<u64> {
        let client = self.pool.get().await?;
        let row = client
            .query_one(
                "SELECT COUNT(*) AS total FROM messages \
                 WHERE ($1::uuid IS NULL OR conversation_id = $1)",
                &[&conversation_id],
            )
            .await?;
        let total: i64 = row.get("total");
        Ok(total.max(0) as u64)
    }

    async fn add_reader(&self, message_id: Uuid, user_id: Uuid) -> AppResult<Option<Message>> {
        let client = self.pool.get().await?;
        let sql = format!(
            "UPDATE messages SET read_by = CASE \
                 WHEN $2 = ANY(read_by) THEN read_by \
                 ELSE array_append(read_by, $2) END \
             WHERE id = $1 RETURNING {MESSAGE_COLUMNS}"
        );
        client
            .query_opt(sql.as_str(), &[&message_id, &user_id])
            .await?
            .as_ref()
            .map(message_from_row)
            .transpose()
    }

    async fn soft_delete_message(&self, message_id: Uuid) -> AppResult<Option<Message>> {
        let client = self.pool.get().await?;
        let sql = format!(
            "UPDATE messages SET is_deleted = TRUE WHERE id = $1 RETURNING {MESSAGE_COLUMNS}"
        );
        client
            .query_opt(sql.as_str(), &[&message_id])
            .await?
            .as_ref()
            .map(message_from_row)
            .transpose()
    }

    async fn soft_delete_messages_by_sender(&self, sender_id: Uuid) -> AppResult<u64> {
        let client = self.pool.get().await?;
        let deleted = client
            .execute(
                "UPDATE messages SET is_deleted = TRUE WHERE sender_id = $1 AND NOT is_deleted",
                &[&sender_id],
            )
            .await?;
        Ok(deleted)
    }
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{ConversationStore, MessageStore, UserStore};
use crate::error::{AppError, AppResult};
use crate::models::{
    Address, Conversation, Message, NewMessage, Preferences, ProfileUpdate, User, UserFilter,
    UserRole,
};

/// In-process store.
///
/// Write failures can be switched on to exercise the storage-outage and
/// best-effort presence paths.
#[derive(Default)]
pub struct MemoryStore {
    users: RwLock<HashMap<Uuid, User>>,
    conversations: RwLock<HashMap<Uuid, Conversation>>,
    messages: RwLock<Vec<Message>>,
    fail_message_writes: AtomicBool,
    fail_last_seen_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds an account. Account creation belongs to the auth collaborator,
    /// so this is not part of `UserStore`.
    pub async fn insert_user(&self, name: &str, email: &str, role: UserRole) -> User {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: email.to_string(),
            role,
            profile_photo: String::new(),
            bio: String::new(),
            phone: String::new(),
            address: Address::default(),
            preferences: Preferences::default(),
            is_active: true,
            last_seen: now,
            created_at: now,
        };
        self.users.write().await.insert(user.id, user.clone());
        user
    }

    /// Overwrites `last_seen`, used to age accounts in tests.
    pub async fn backdate_last_seen(&self, id: Uuid, at: DateTime<Utc>) {
        if let Some(user) = self.users.write().await.get_mut(&id) {
            user.last_seen = at;
        }
    }

    pub fn fail_message_writes(&self, fail: bool) {
        self.fail_message_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_last_seen_writes(&self, fail: bool) {
        self.fail_last_seen_writes.store(fail, Ordering::SeqCst);
    }

    pub async fn message_count(&self) -> usize {
        self.messages.read().await.len()
    }

    fn check_message_writes(&self) -> AppResult<()> {
        if self.fail_message_writes.load(Ordering::SeqCst) {
            return Err(AppError::Persistence("message store unavailable".into()));
        }
        Ok(())
    }

    fn check_last_seen_writes(&self) -> AppResult<()> {
        if self.fail_last_seen_writes.load(Ordering::SeqCst) {
            return Err(AppError::Persistence("user store unavailable".into()));
        }
        Ok(())
    }
}

fn page_of<T>(items: Vec<T>, offset: u64, limit: u64) -> Vec<T> {
    items
        .into_iter()
        .skip(usize::try_from(offset).unwrap_or(usize::MAX))
        .take(usize::try_from(limit).unwrap_or(usize::MAX))
        .collect()
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_user(&self, id: Uuid) -> AppResult<Option<User>> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn list_users_page(
        &self,
        filter: &UserFilter,
        offset: u64,
        limit: u64,
    ) -> AppResult<Vec<User>> {
        let mut users: Vec<User> = self
            .users
            .read()
            .await
            .values()
            .filter(|u| filter.matches(u))
            .cloned()
            .collect();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(page_of(users, offset, limit))
    }

    async fn count_users(&self, filter: &UserFilter) -> AppResult<u64> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .filter(|u| filter.matches(u))
            .count() as u64)
    }

    async fn update_profile(&self, id: Uuid, update: &ProfileUpdate) -> AppResult<Option<User>> {
        let mut users = self.users.write().await;
        Ok(users.get_mut(&id).map(|user| {
            user.apply(update);
            user.clone()
        }))
    }

    async fn touch_last_seen(&self, id: Uuid, at: DateTime<Utc>) -> AppResult<()> {
        self.check_last_seen_writes()?;
        if let Some(user) = self.users.write().await.get_mut(&id) {
            user.last_seen = at;
        }
        Ok(())
    }

    async fn touch_last_seen_many(&self, ids: &[Uuid], at: DateTime<Utc>) -> AppResult<u64> {
        self.check_last_seen_writes()?;
        let mut users = self.users.write().await;
        let mut updated = 0;
        for id in ids {
            if let Some(user) = users.get_mut(id) {
                user.last_seen = at;
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn set_user_active(&self, id: Uuid, is_active: bool) -> AppResult<Option<User>> {
        let mut users = self.users.write().await;
        Ok(users.get_mut(&id).map(|user| {
            user.is_active = is_active;
            user.clone()
        }))
    }

    async fn delete_user(&self, id: Uuid) -> AppResult<bool> {
        Ok(self.users.write().await.remove(&id).is_some())
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn find_conversation_for(
        &self,
        id: Uuid,
        user_id: Uuid,
    ) -> AppResult<Option<Conversation>> {
        Ok(self
            .conversations
            .read()
            .await
            .get(&id)
            .filter(|c| c.has_participant(user_id))
            .cloned())
    }

    async fn list_conversations_for(&self, user_id: Uuid) -> AppResult<Vec<Conversation>> {
        let mut found: Vec<Conversation> = self
            .conversations
            .read()
            .await
            .values()
            .filter(|c| c.has_participant(user_id))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(found)
    }

    async fn create_conversation(&self, participants: &[Uuid]) -> AppResult<Conversation> {
        let now = Utc::now();
        let conversation = Conversation {
            id: Uuid::new_v4(),
            participants: participants.iter().copied().collect(),
            last_message_id: None,
            created_at: now,
            updated_at: now,
        };
        self.conversations
            .write()
            .await
            .insert(conversation.id, conversation.clone());
        Ok(conversation)
    }

    async fn set_last_message(
        &self,
        conversation_id: Uuid,
        message_id: Uuid,
        created_at: DateTime<Utc>,
    ) -> AppResult<bool> {
        self.check_message_writes()?;
        // Lock order: conversations, then messages
        let mut conversations = self.conversations.write().await;
        let conversation = conversations
            .get_mut(&conversation_id)
            .ok_or(AppError::NotFound("conversation"))?;

        if let Some(current) = conversation.last_message_id {
            let messages = self.messages.read().await;
            let newer_exists = messages
                .iter()
                .any(|m| m.id == current && m.created_at > created_at);
            if newer_exists {
                return Ok(false);
            }
        }
        conversation.last_message_id = Some(message_id);
        conversation.updated_at = Utc::now();
        Ok(true)
    }

    async fn pull_participant(&self, conversation_id: Uuid, user_id: Uuid) -> AppResult<bool> {
        let mut conversations = self.conversations.write().await;
        Ok(match conversations.get_mut(&conversation_id) {
            Some(conversation) => {
                let removed = conversation.participants.remove(&user_id);
                if removed {
                    conversation.updated_at = Utc::now();
                }
                removed
            }
            None => false,
        })
    }

    async fn pull_participant_everywhere(&self, user_id: Uuid) -> AppResult<u64> {
        let mut conversations = self.conversations.write().await;
        let now = Utc::now();
        let mut touched = 0;
        for conversation in conversations.values_mut() {
            if conversation.participants.remove(&user_id) {
                conversation.updated_at = now;
                touched += 1;
            }
        }
        Ok(touched)
    }

    async fn delete_empty_conversations(&self) -> AppResult<u64> {
        let mut conversations = self.conversations.write().await;
        let before = conversations.len();
        conversations.retain(|_, c| !c.participants.is_empty());
        Ok((before - conversations.len()) as u64)
    }

    async fn list_conversations_page(&self, offset: u64, limit: u64) -> AppResult<Vec<Conversation>> {
        let mut all: Vec<Conversation> = self.conversations.read().await.values().cloned().collect();
        all.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(a.id.cmp(&b.id)));
        Ok(page_of(all, offset, limit))
    }

    async fn count_conversations(&self) -> AppResult<u64> {
        Ok(self.conversations.read().await.len() as u64)
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn create_message(&self, new: NewMessage) -> AppResult<Message> {
        self.check_message_writes()?;
        let message = Message {
            id: Uuid::new_v4(),
            conversation_id: new.conversation_id,
            sender_id: new.sender_id,
            body: new.body,
            message_type: new.message_type,
            attachment_url: new.attachment_url,
            read_by: BTreeSet::from([new.sender_id]),
            is_deleted: false,
            created_at: Utc::now(),
        };
        self.messages.write().await.push(message.clone());
        Ok(message)
    }

    async fn find_message(&self, id: Uuid) -> AppResult<Option<Message>> {
        Ok(self
            .messages
            .read()
            .await
            .iter()
            .find(|m| m.id == id)
            .cloned())
    }

    async fn find_messages_by_conversation(&self, conversation_id: Uuid) -> AppResult<Vec<Message>> {
        // Insertion order is creation order.
        Ok(self
            .messages
            .read()
            .await
            .iter()
            .filter(|m| m.conversation_id == conversation_id && !m.is_deleted)
            .cloned()
            .collect())
    }

    async fn list_messages_page(
        &self,
        conversation_id: Option<Uuid>,
        offset: u64,
        limit: u64,
    ) -> AppResult<Vec<Message>> {
        let newest_first: Vec<Message> = self
            .messages
            .read()
            .await
            .iter()
            .rev()
            .filter(|m| conversation_id.map_or(true, |c| m.conversation_id == c))
            .cloned()
            .collect();
        Ok(page_of(newest_first, offset, limit))
    }

    async fn count_messages(&self, conversation_id: Option<Uuid>) -> AppResult<u64> {
        Ok(self
            .messages
            .read()
            .await
            .iter()
            .filter(|m| conversation_id.map_or(true, |c| m.conversation_id == c))
            .count() as u64)
    }

    async fn add_reader(&self, message_id: Uuid, user_id: Uuid) -> AppResult<Option<Message>> {
        self.check_message_writes()?;
        let mut messages = self.messages.write().await;
        Ok(messages.iter_mut().find(|m| m.id == message_id).map(|m| {
            m.read_by.insert(user_id);
            m.clone()
        }))
    }

    async fn soft_delete_message(&self, message_id: Uuid) -> AppResult<Option<Message>> {
        self.check_message_writes()?;
        let mut messages = self.messages.write().await;
        Ok(messages.iter_mut().find(|m| m.id == message_id).map(|m| {
            m.is_deleted = true;
            m.clone()
        }))
    }

    async fn soft_delete_messages_by_sender(&self, sender_id: Uuid) -> AppResult<u64> {
        self.check_message_writes()?;
        let mut messages = self.messages.write().await;
        let mut deleted = 0;
        for message in messages.iter_mut().filter(|m| m.sender_id == sender_id) {
            if !message.is_deleted {
                message.is_deleted = true;
                deleted += 1;
            }
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MessageType;

    #[tokio::test]
    async fn test_add_reader_is_set_add() {
        let store = MemoryStore::new();
        let alice = store.insert_user("alice", "alice@example.com", UserRole::Customer).await;
        let bob = store.insert_user("bob", "bob@example.com", UserRole::Agent).await;
        let conv = store.create_conversation(&[alice.id, bob.id]).await.unwrap();

        let msg = store
            .create_message(NewMessage {
                conversation_id: conv.id,
                sender_id: alice.id,
                body: "hi".into(),
                message_type: MessageType::Text,
                attachment_url: None,
            })
            .await
            .unwrap();
        assert_eq!(msg.read_by, BTreeSet::from([alice.id]));

        store.add_reader(msg.id, bob.id).await.unwrap();
        let again = store.add_reader(msg.id, bob.id).await.unwrap().unwrap();
        assert_eq!(again.read_by.len(), 2);
    }

    fn text(conversation_id: Uuid, sender_id: Uuid, body: &str) -> NewMessage {
        NewMessage {
            conversation_id,
            sender_id,
            body: body.into(),
            message_type: MessageType::Text,
            attachment_url: None,
        }
    }

    #[tokio::test]
    async fn test_pull_participant_reports_membership() {
        let store = MemoryStore::new();
        let (a, b, outsider) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let conv = store.create_conversation(&[a, b]).await.unwrap();

        assert!(!store.pull_participant(conv.id, outsider).await.unwrap());
        assert!(store.pull_participant(conv.id, a).await.unwrap());
        assert!(!store.pull_participant(conv.id, a).await.unwrap());
        assert!(!store.pull_participant(Uuid::new_v4(), b).await.unwrap());
    }

    #[tokio::test]
    async fn test_last_message_never_moves_backwards() {
        let store = MemoryStore::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let conv = store.create_conversation(&[a, b]).await.unwrap();
        let older = store.create_message(text(conv.id, a, "first")).await.unwrap();
        let newer = store.create_message(text(conv.id, b, "second")).await.unwrap();

        // The later write lands first, the earlier one arrives late
        assert!(store
            .set_last_message(conv.id, newer.id, newer.created_at)
            .await
            .unwrap());
        assert!(!store
            .set_last_message(conv.id, older.id, older.created_at - chrono::Duration::milliseconds(1))
            .await
            .unwrap());

        let conv = store.find_conversation_for(conv.id, a).await.unwrap().unwrap();
        assert_eq!(conv.last_message_id, Some(newer.id));
        assert!(matches!(
            store.set_last_message(Uuid::new_v4(), newer.id, newer.created_at).await,
            Err(AppError::NotFound("conversation"))
        ));
    }

    #[tokio::test]
    async fn test_listing_pages_are_newest_first() {
        let store = MemoryStore::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let conv = store.create_conversation(&[a, b]).await.unwrap();
        let other = store.create_conversation(&[a, b]).await.unwrap();
        for i in 0..5 {
            store.create_message(text(conv.id, a, &format!("m{i}"))).await.unwrap();
        }
        store.create_message(text(other.id, b, "elsewhere")).await.unwrap();

        let page = store.list_messages_page(Some(conv.id), 0, 2).await.unwrap();
        let bodies: Vec<&str> = page.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, vec!["m4", "m3"]);
        assert_eq!(store.count_messages(Some(conv.id)).await.unwrap(), 5);
        assert_eq!(store.count_messages(None).await.unwrap(), 6);
        assert_eq!(store.list_messages_page(None, 5, 10).await.unwrap().len(), 1);

        assert_eq!(store.list_conversations_page(0, 10).await.unwrap().len(), 2);
        assert_eq!(store.list_conversations_page(1, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_conversations_are_deleted_after_pull() {
        let store = MemoryStore::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let conv = store.create_conversation(&[a, b]).await.unwrap();

        assert_eq!(store.pull_participant_everywhere(a).await.unwrap(), 1);
        assert_eq!(store.delete_empty_conversations().await.unwrap(), 0);
        assert!(store.pull_participant(conv.id, b).await.unwrap());
        assert_eq!(store.delete_empty_conversations().await.unwrap(), 1);
        assert_eq!(store.count_conversations().await.unwrap(), 0);
    }
}

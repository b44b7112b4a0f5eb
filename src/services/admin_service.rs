use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{
    ActivityStatus, Conversation, Message, MessageView, Page, PageRequest, User, UserFilter,
    UserRole, UserSummary,
};
use crate::services::conversation_service::ConversationService;
use crate::services::message_service::MessageService;
use crate::services::presence_service::PresenceService;
use crate::store::ChatStore;
use error_types::error_codes;

pub const DEFAULT_USER_PAGE: u64 = 20;
pub const DEFAULT_MESSAGE_PAGE: u64 = 50;
pub const DEFAULT_CONVERSATION_PAGE: u64 = 20;

/// A user as the admin surface sees it.
///
/// `status` is the `last_seen` classification; `online` is live registry state.
#[derive(Debug, Clone, Serialize)]
pub struct UserOverview {
    #[serde(flatten)]
    pub user: User,
    pub status: ActivityStatus,
    pub online: bool,
}

/// A conversation with its members and newest message resolved.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationOverview {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub members: Vec<UserSummary>,
    pub last_message: Option<Message>,
}

#[derive(Debug, Clone, Default)]
pub struct UserQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub search: Option<String>,
    pub role: Option<UserRole>,
    pub status: Option<ActivityStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccountRemoval {
    pub user_id: Uuid,
    pub messages_deleted: u64,
    pub conversations_left: u64,
    pub conversations_deleted: u64,
    pub connections_closed: usize,
}

#[derive(Clone)]
pub struct AdminService {
    store: Arc<dyn ChatStore>,
    conversations: ConversationService,
    messages: MessageService,
    presence: PresenceService,
}

impl AdminService {
    pub fn new(
        store: Arc<dyn ChatStore>,
        conversations: ConversationService,
        messages: MessageService,
        presence: PresenceService,
    ) -> Self {
        Self {
            store,
            conversations,
            messages,
            presence,
        }
    }

    /// Newest accounts first, filtered and paged in the store.
    pub async fn list_users(
        &self,
        query: UserQuery,
        now: DateTime<Utc>,
    ) -> AppResult<Page<UserOverview>> {
        let request = PageRequest::new(query.page, query.limit, DEFAULT_USER_PAGE);
        let filter = UserFilter {
            search: query
                .search
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            role: query.role,
            last_seen: query
                .status
                .map(|status| self.presence.last_seen_bound(status, now)),
            exclude: None,
        };

        let total = self.store.count_users(&filter).await?;
        let users = self
            .store
            .list_users_page(&filter, request.offset(), request.limit)
            .await?;
        let items = users
            .into_iter()
            .map(|user| UserOverview {
                status: self.presence.activity_status(&user, now),
                online: self.presence.is_online(user.id),
                user,
            })
            .collect();
        Ok(Page::new(items, total, request))
    }

    /// Every stored message, deleted ones included, newest first.
    pub async fn list_messages(
        &self,
        conversation_id: Option<Uuid>,
        request: PageRequest,
    ) -> AppResult<Page<MessageView>> {
        let total = self.store.count_messages(conversation_id).await?;
        let messages = self
            .store
            .list_messages_page(conversation_id, request.offset(), request.limit)
            .await?;
        let items = self.messages.with_senders(messages).await?;
        Ok(Page::new(items, total, request))
    }

    /// Most recently active conversations first.
    pub async fn list_conversations(
        &self,
        request: PageRequest,
    ) -> AppResult<Page<ConversationOverview>> {
        let total = self.store.count_conversations().await?;
        let conversations = self
            .store
            .list_conversations_page(request.offset(), request.limit)
            .await?;

        let mut members_seen: HashMap<Uuid, Option<UserSummary>> = HashMap::new();
        let mut items = Vec::with_capacity(conversations.len());
        for conversation in conversations {
            let mut members = Vec::with_capacity(conversation.participants.len());
            for id in &conversation.participants {
                if !members_seen.contains_key(id) {
                    let found = self.store.find_user(*id).await?.map(|u| u.summary());
                    members_seen.insert(*id, found);
                }
                if let Some(Some(member)) = members_seen.get(id) {
                    members.push(member.clone());
                }
            }
            let last_message = match conversation.last_message_id {
                Some(id) => self.store.find_message(id).await?,
                None => None,
            };
            items.push(ConversationOverview {
                conversation,
                members,
                last_message,
            });
        }
        Ok(Page::new(items, total, request))
    }

    pub async fn set_user_active(&self, user_id: Uuid, is_active: bool) -> AppResult<User> {
        let user = self
            .store
            .set_user_active(user_id, is_active)
            .await?
            .ok_or(AppError::NotFound("user"))?;
        tracing::info!(%user_id, is_active, "user status changed");
        Ok(user)
    }

    /// Delete an account: its live sockets are closed, its messages are
    /// soft-deleted, it leaves every conversation, and conversations left
    /// empty are removed.
    pub async fn delete_user(&self, acting_admin: Uuid, user_id: Uuid) -> AppResult<AccountRemoval> {
        if acting_admin == user_id {
            return Err(AppError::validation(
                error_codes::CANNOT_DELETE_SELF,
                "cannot delete your own account",
            ));
        }
        if self.store.find_user(user_id).await?.is_none() {
            return Err(AppError::NotFound("user"));
        }

        // Unregistering drops the outbound channel, which stops the socket actor
        let mut connections_closed = 0;
        for connection in self.presence.connections_of(user_id) {
            if self.presence.disconnect(connection).await.is_some() {
                connections_closed += 1;
            }
        }

        let messages_deleted = self.store.soft_delete_messages_by_sender(user_id).await?;
        let (conversations_left, conversations_deleted) =
            self.conversations.remove_user_everywhere(user_id).await?;
        self.store.delete_user(user_id).await?;

        tracing::info!(
            %acting_admin,
            %user_id,
            messages_deleted,
            conversations_left,
            conversations_deleted,
            connections_closed,
            "user deleted"
        );
        Ok(AccountRemoval {
            user_id,
            messages_deleted,
            conversations_left,
            conversations_deleted,
            connections_closed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MessageType, NewMessage};
    use crate::store::{ConversationStore, MemoryStore, MessageStore, UserStore};
    use crate::websocket::broadcast::BroadcastRouter;
    use crate::websocket::{ConnectionId, ConnectionRegistry};
    use std::time::Duration;
    use tokio::sync::mpsc::unbounded_channel;

    struct Fixture {
        store: Arc<MemoryStore>,
        registry: ConnectionRegistry,
        presence: PresenceService,
        admin: AdminService,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let registry = ConnectionRegistry::new();
        let router = BroadcastRouter::new(registry.clone());
        let conversations = ConversationService::new(store.clone());
        let messages = MessageService::new(store.clone(), conversations.clone(), router.clone());
        let presence = PresenceService::new(store.clone(), router, Duration::from_secs(300));
        let admin = AdminService::new(store.clone(), conversations, messages, presence.clone());
        Fixture {
            store,
            registry,
            presence,
            admin,
        }
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
    async fn test_list_filters_by_activity() {
        let fx = fixture();
        let fresh = fx.store.insert_user("fresh", "fresh@example.com", UserRole::Customer).await;
        let idle = fx.store.insert_user("idle", "idle@example.com", UserRole::Customer).await;
        fx.store
            .backdate_last_seen(idle.id, Utc::now() - chrono::Duration::minutes(10))
            .await;

        let now = Utc::now();
        let active = fx
            .admin
            .list_users(
                UserQuery {
                    status: Some(ActivityStatus::Active),
                    ..Default::default()
                },
                now,
            )
            .await
            .unwrap();
        assert_eq!(active.total, 1);
        assert_eq!(active.items[0].user.id, fresh.id);
        assert!(!active.items[0].online);

        let offline = fx
            .admin
            .list_users(
                UserQuery {
                    status: Some(ActivityStatus::Offline),
                    ..Default::default()
                },
                now,
            )
            .await
            .unwrap();
        assert_eq!(offline.items.len(), 1);
        assert_eq!(offline.items[0].user.id, idle.id);

        let all = fx.admin.list_users(UserQuery::default(), now).await.unwrap();
        assert_eq!(all.total, 2);
    }

    #[tokio::test]
    async fn test_list_users_search_role_and_paging() {
        let fx = fixture();
        for i in 0..5 {
            fx.store
                .insert_user(&format!("agent{i}"), &format!("agent{i}@example.com"), UserRole::Agent)
                .await;
        }
        fx.store.insert_user("Carol", "carol@shop.example", UserRole::Customer).await;

        let page = fx
            .admin
            .list_users(
                UserQuery {
                    page: Some(2),
                    limit: Some(2),
                    role: Some(UserRole::Agent),
                    ..Default::default()
                },
                Utc::now(),
            )
            .await
            .unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.current_page, 2);
        assert_eq!(page.items.len(), 2);

        let found = fx
            .admin
            .list_users(
                UserQuery {
                    search: Some("  SHOP ".into()),
                    ..Default::default()
                },
                Utc::now(),
            )
            .await
            .unwrap();
        assert_eq!(found.total, 1);
        assert_eq!(found.items[0].user.name, "Carol");
    }

    #[tokio::test]
    async fn test_list_messages_and_conversations() {
        let fx = fixture();
        let a = fx.store.insert_user("a", "a@example.com", UserRole::Customer).await;
        let b = fx.store.insert_user("b", "b@example.com", UserRole::Agent).await;
        let conv = fx.store.create_conversation(&[a.id, b.id]).await.unwrap();
        let first = fx.store.create_message(text(conv.id, a.id, "one")).await.unwrap();
        let second = fx.store.create_message(text(conv.id, b.id, "two")).await.unwrap();
        fx.store
            .set_last_message(conv.id, second.id, second.created_at)
            .await
            .unwrap();
        fx.store.soft_delete_message(first.id).await.unwrap();

        let messages = fx
            .admin
            .list_messages(Some(conv.id), PageRequest::new(None, None, DEFAULT_MESSAGE_PAGE))
            .await
            .unwrap();
        assert_eq!(messages.total, 2);
        assert_eq!(messages.items[0].message.id, second.id);
        assert!(messages.items[1].message.is_deleted);
        assert_eq!(messages.items[1].sender.as_ref().unwrap().id, a.id);

        let conversations = fx
            .admin
            .list_conversations(PageRequest::new(None, None, DEFAULT_CONVERSATION_PAGE))
            .await
            .unwrap();
        assert_eq!(conversations.total, 1);
        let overview = &conversations.items[0];
        assert_eq!(overview.members.len(), 2);
        assert_eq!(overview.last_message.as_ref().unwrap().id, second.id);
    }

    #[tokio::test]
    async fn test_set_active_unknown_user() {
        let fx = fixture();
        let user = fx.store.insert_user("u", "u@example.com", UserRole::Merchant).await;

        assert!(!fx.admin.set_user_active(user.id, false).await.unwrap().is_active);
        assert!(matches!(
            fx.admin.set_user_active(Uuid::new_v4(), true).await,
            Err(AppError::NotFound("user"))
        ));
    }

    #[tokio::test]
    async fn test_delete_user_cascades() {
        let fx = fixture();
        let root = fx.store.insert_user("root", "root@example.com", UserRole::Admin).await;
        let a = fx.store.insert_user("a", "a@example.com", UserRole::Customer).await;
        let b = fx.store.insert_user("b", "b@example.com", UserRole::Customer).await;
        let c = fx.store.insert_user("c", "c@example.com", UserRole::Customer).await;
        let pair = fx.store.create_conversation(&[a.id, b.id]).await.unwrap();
        let group = fx.store.create_conversation(&[a.id, b.id, c.id]).await.unwrap();
        fx.store.create_message(text(pair.id, a.id, "bye")).await.unwrap();

        fx.admin.delete_user(root.id, b.id).await.unwrap();
        let removal = fx.admin.delete_user(root.id, a.id).await.unwrap();
        assert_eq!(removal.messages_deleted, 1);
        assert_eq!(removal.conversations_left, 2);
        assert_eq!(removal.conversations_deleted, 1);
        assert_eq!(removal.connections_closed, 0);

        assert!(fx.store.find_user(a.id).await.unwrap().is_none());
        assert!(fx.store.find_messages_by_conversation(pair.id).await.unwrap().is_empty());
        let remaining = fx.store.list_conversations_for(c.id).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, group.id);

        assert!(matches!(
            fx.admin.delete_user(root.id, a.id).await,
            Err(AppError::NotFound("user"))
        ));
    }

    #[tokio::test]
    async fn test_admin_cannot_delete_own_account() {
        let fx = fixture();
        let root = fx.store.insert_user("root", "root@example.com", UserRole::Admin).await;

        let err = fx.admin.delete_user(root.id, root.id).await.unwrap_err();
        assert_eq!(err.code(), error_codes::CANNOT_DELETE_SELF);
        assert!(fx.store.find_user(root.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_user_closes_live_connections() {
        let fx = fixture();
        let root = fx.store.insert_user("root", "root@example.com", UserRole::Admin).await;
        let a = fx.store.insert_user("a", "a@example.com", UserRole::Customer).await;
        let conv = fx
            .store
            .create_conversation(&[a.id, root.id])
            .await
            .unwrap();

        let mut receivers = Vec::new();
        for _ in 0..2 {
            let (tx, rx) = unbounded_channel();
            let connection = ConnectionId::new();
            fx.registry.open(connection, tx);
            fx.presence.connect(a.id, connection).await.unwrap();
            fx.registry.join_group(connection, conv.id).unwrap();
            receivers.push(rx);
        }
        assert!(fx.registry.is_online(a.id));

        let removal = fx.admin.delete_user(root.id, a.id).await.unwrap();
        assert_eq!(removal.connections_closed, 2);
        assert!(!fx.registry.is_online(a.id));
        assert!(fx.registry.group_members(conv.id).is_empty());

        // Every sender is gone, so each socket's outbound stream ends
        for mut rx in receivers {
            while rx.try_recv().is_ok() {}
            assert!(rx.recv().await.is_none());
        }
    }
}

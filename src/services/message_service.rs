use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::metrics;
use crate::models::{Message, MessageType, MessageView, NewMessage, UserSummary};
use crate::services::conversation_service::ConversationService;
use crate::services::presence_service::touch_last_seen_best_effort;
use crate::store::ChatStore;
use crate::websocket::broadcast::BroadcastRouter;
use error_types::error_codes;

/// Input to the ingestion pipeline, from either the socket or HTTP.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub body: String,
    pub message_type: MessageType,
    pub attachment_url: Option<String>,
}

#[derive(Clone)]
pub struct MessageService {
    store: Arc<dyn ChatStore>,
    conversations: ConversationService,
    router: BroadcastRouter,
}

impl MessageService {
    pub fn new(
        store: Arc<dyn ChatStore>,
        conversations: ConversationService,
        router: BroadcastRouter,
    ) -> Self {
        Self {
            store,
            conversations,
            router,
        }
    }

    /// Validate, persist, then fan out a message.
    ///
    /// Nothing is written unless the sender participates in the conversation.
    /// Delivery happens only after the message and the conversation's
    /// last-message pointer are both stored.
    pub async fn ingest(&self, incoming: IncomingMessage) -> AppResult<MessageView> {
        let conversation_id = incoming.conversation_id;
        let sender_id = incoming.sender_id;

        self.conversations
            .authorize(conversation_id, sender_id)
            .await
            .map_err(|e| match e {
                AppError::NotFound(_) => AppError::NotAuthorized,
                other => other,
            })?;

        let attachment_url = validate(&incoming)?;

        let sender = self
            .store
            .find_user(sender_id)
            .await?
            .ok_or(AppError::NotFound("user"))?;

        let message = self
            .store
            .create_message(NewMessage {
                conversation_id,
                sender_id,
                body: incoming.body,
                message_type: incoming.message_type,
                attachment_url,
            })
            .await?;
        let advanced = self
            .store
            .set_last_message(conversation_id, message.id, message.created_at)
            .await?;
        if !advanced {
            tracing::debug!(
                message_id = %message.id,
                %conversation_id,
                "newer message already recorded as last"
            );
        }
        metrics::MESSAGES_INGESTED_TOTAL.inc();

        let view = MessageView {
            message,
            sender: Some(sender.summary()),
        };
        self.router.deliver_message(&view);

        touch_last_seen_best_effort(self.store.as_ref(), sender_id, Utc::now()).await;

        tracing::info!(
            message_id = %view.message.id,
            %conversation_id,
            %sender_id,
            message_type = view.message.message_type.to_db(),
            "message ingested"
        );
        Ok(view)
    }

    /// Non-deleted messages of a conversation the caller belongs to, oldest first.
    pub async fn history(&self, conversation_id: Uuid, user_id: Uuid) -> AppResult<Vec<MessageView>> {
        self.conversations.authorize(conversation_id, user_id).await?;
        let messages = self
            .store
            .find_messages_by_conversation(conversation_id)
            .await?;
        self.with_senders(messages).await
    }

    /// Pair each message with its sender's summary, looking each sender up once.
    pub async fn with_senders(&self, messages: Vec<Message>) -> AppResult<Vec<MessageView>> {
        let mut senders: HashMap<Uuid, Option<UserSummary>> = HashMap::new();
        let mut views = Vec::with_capacity(messages.len());
        for message in messages {
            let sender = match senders.get(&message.sender_id) {
                Some(cached) => cached.clone(),
                None => {
                    let found = self
                        .store
                        .find_user(message.sender_id)
                        .await?
                        .map(|u| u.summary());
                    senders.insert(message.sender_id, found.clone());
                    found
                }
            };
            views.push(MessageView { message, sender });
        }
        Ok(views)
    }

    /// Record `user_id` as a reader. Repeating it changes nothing.
    pub async fn mark_read(&self, message_id: Uuid, user_id: Uuid) -> AppResult<Message> {
        let message = self.visible_message(message_id).await?;
        self.conversations
            .authorize(message.conversation_id, user_id)
            .await
            .map_err(|e| match e {
                AppError::NotFound(_) => AppError::NotAuthorized,
                other => other,
            })?;

        self.store
            .add_reader(message_id, user_id)
            .await?
            .ok_or(AppError::NotFound("message"))
    }

    /// Hide a message from history. Only its sender may do this.
    pub async fn soft_delete(&self, message_id: Uuid, user_id: Uuid) -> AppResult<Message> {
        let message = self.visible_message(message_id).await?;
        if message.sender_id != user_id {
            return Err(AppError::NotSender);
        }

        let deleted = self
            .store
            .soft_delete_message(message_id)
            .await?
            .ok_or(AppError::NotFound("message"))?;
        tracing::info!(%message_id, conversation_id = %deleted.conversation_id, "message deleted");
        Ok(deleted)
    }

    async fn visible_message(&self, message_id: Uuid) -> AppResult<Message> {
        self.store
            .find_message(message_id)
            .await?
            .filter(|m| !m.is_deleted)
            .ok_or(AppError::NotFound("message"))
    }
}

/// Checks the body/attachment rules and returns the normalized attachment URL.
fn validate(incoming: &IncomingMessage) -> AppResult<Option<String>> {
    let attachment_url = incoming
        .attachment_url
        .as_deref()
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .map(str::to_string);

    if incoming.message_type.needs_attachment() {
        if attachment_url.is_none() {
            return Err(AppError::validation(
                error_codes::MISSING_ATTACHMENT,
                format!(
                    "{} messages require an attachment url",
                    incoming.message_type.to_db()
                ),
            ));
        }
    } else if incoming.body.trim().is_empty() {
        return Err(AppError::validation(
            error_codes::EMPTY_MESSAGE_BODY,
            "message text cannot be empty",
        ));
    }
    Ok(attachment_url)
}

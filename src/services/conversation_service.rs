use std::collections::BTreeSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::Conversation;
use crate::store::ChatStore;
use error_types::error_codes;

/// Membership resolver. `authorize` is the only gate in front of message
/// reads and writes.
#[derive(Clone)]
pub struct ConversationService {
    store: Arc<dyn ChatStore>,
}

impl ConversationService {
    pub fn new(store: Arc<dyn ChatStore>) -> Self {
        Self { store }
    }

    /// The conversation, if `user_id` participates in it.
    ///
    /// An unknown id and a non-participant look the same to the caller.
    pub async fn authorize(&self, conversation_id: Uuid, user_id: Uuid) -> AppResult<Conversation> {
        self.store
            .find_conversation_for(conversation_id, user_id)
            .await?
            .ok_or(AppError::NotFound("conversation"))
    }

    /// Creates a conversation over `participants` plus the creator.
    pub async fn create_conversation(
        &self,
        participants: &[Uuid],
        creator_id: Uuid,
    ) -> AppResult<Conversation> {
        let mut members: BTreeSet<Uuid> = participants.iter().copied().collect();
        members.insert(creator_id);
        if members.len() < 2 {
            return Err(AppError::validation(
                error_codes::TOO_FEW_PARTICIPANTS,
                "a conversation needs at least 2 participants",
            ));
        }

        let members: Vec<Uuid> = members.into_iter().collect();
        let conversation = self.store.create_conversation(&members).await?;
        tracing::info!(
            conversation_id = %conversation.id,
            %creator_id,
            participants = members.len(),
            "conversation created"
        );
        Ok(conversation)
    }

    /// Pulls one participant; a conversation left empty is deleted.
    pub async fn remove_participant(&self, conversation_id: Uuid, user_id: Uuid) -> AppResult<bool> {
        let removed = self.store.pull_participant(conversation_id, user_id).await?;
        if removed {
            let dropped = self.store.delete_empty_conversations().await?;
            tracing::debug!(%conversation_id, %user_id, dropped, "participant removed");
        }
        Ok(removed)
    }

    /// Pulls the user from every conversation and deletes the ones left empty.
    /// Returns (conversations touched, conversations deleted).
    pub async fn remove_user_everywhere(&self, user_id: Uuid) -> AppResult<(u64, u64)> {
        let touched = self.store.pull_participant_everywhere(user_id).await?;
        let deleted = self.store.delete_empty_conversations().await?;
        Ok((touched, deleted))
    }

    pub async fn list_for_user(&self, user_id: Uuid) -> AppResult<Vec<Conversation>> {
        self.store.list_conversations_for(user_id).await
    }
}

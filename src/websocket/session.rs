//! Per-connection event processing.
//!
//! The socket actor only parses frames; every parsed event is queued to one
//! worker task per connection, which handles them strictly in arrival order.
//! A failure is reported back to that connection as `message-error` and the
//! connection stays open. Teardown always runs when the queue closes.

use tokio::sync::mpsc::UnboundedReceiver;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::services::IncomingMessage;
use crate::state::AppState;
use crate::websocket::message_types::WsInboundEvent;
use crate::websocket::ConnectionId;
use error_types::error_codes;

/// Who is on the other end of a connection.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionContext {
    pub connection: ConnectionId,
    /// Subject of the token the socket was upgraded with
    pub authenticated_user: Uuid,
}

#[derive(Debug)]
pub enum SessionEvent {
    Inbound(WsInboundEvent),
    Closed,
}

fn require_identity(state: &AppState, ctx: &ConnectionContext) -> AppResult<Uuid> {
    state.registry.user_of(ctx.connection).ok_or_else(|| {
        AppError::validation(
            error_codes::IDENTITY_REQUIRED,
            "send identity-join before other events",
        )
    })
}

pub async fn handle_event(
    state: &AppState,
    ctx: &ConnectionContext,
    evt: WsInboundEvent,
) -> AppResult<()> {
    match evt {
        WsInboundEvent::IdentityJoin { user_id } => {
            if user_id != ctx.authenticated_user {
                return Err(AppError::NotAuthorized);
            }
            state.presence.connect(user_id, ctx.connection).await?;
        }

        WsInboundEvent::GroupJoin { conversation_id } => {
            require_identity(state, ctx)?;
            state.registry.join_group(ctx.connection, conversation_id)?;
        }

        WsInboundEvent::GroupLeave { conversation_id } => {
            require_identity(state, ctx)?;
            state.registry.leave_group(ctx.connection, conversation_id);
        }

        WsInboundEvent::SendMessage {
            conversation_id,
            text,
            sender_id,
            message_type,
            attachment_url,
        } => {
            let bound = require_identity(state, ctx)?;
            if sender_id.is_some_and(|claimed| claimed != bound) {
                return Err(AppError::NotAuthorized);
            }
            state
                .messages
                .ingest(IncomingMessage {
                    conversation_id,
                    sender_id: bound,
                    body: text,
                    message_type: message_type.unwrap_or_default(),
                    attachment_url,
                })
                .await?;
        }

        WsInboundEvent::TypingStart { conversation_id } => {
            let bound = require_identity(state, ctx)?;
            state
                .router
                .broadcast_typing(conversation_id, bound, ctx.connection, true);
        }

        WsInboundEvent::TypingStop { conversation_id } => {
            let bound = require_identity(state, ctx)?;
            state
                .router
                .broadcast_typing(conversation_id, bound, ctx.connection, false);
        }
    }
    Ok(())
}

/// Drain a connection's event queue, then tear the connection down.
pub async fn run_session(
    state: AppState,
    ctx: ConnectionContext,
    mut events: UnboundedReceiver<SessionEvent>,
) {
    while let Some(event) = events.recv().await {
        let evt = match event {
            SessionEvent::Inbound(evt) => evt,
            SessionEvent::Closed => break,
        };
        let kind = evt.event_type();

        if let Err(e) = handle_event(&state, &ctx, evt).await {
            if e.http_status() >= 500 {
                tracing::error!(connection = %ctx.connection, event = kind, error = %e, "event failed");
            } else {
                tracing::debug!(connection = %ctx.connection, event = kind, error = %e, "event rejected");
            }
            state.router.send_error(ctx.connection, &e);
        }
    }

    state.presence.disconnect(ctx.connection).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::models::UserRole;
    use crate::store::MemoryStore;
    use crate::websocket::broadcast::BroadcastRouter;
    use crate::websocket::ConnectionRegistry;
    use std::sync::Arc;
    use tokio::sync::mpsc::unbounded_channel;

    fn state() -> (Arc<MemoryStore>, AppState) {
        let store = Arc::new(MemoryStore::new());
        let router = BroadcastRouter::new(ConnectionRegistry::new());
        let state = AppState::new(store.clone(), router, Arc::new(Config::test_defaults()));
        (store, state)
    }

    fn open(state: &AppState, user: Uuid) -> (ConnectionContext, UnboundedReceiver<String>) {
        let (tx, rx) = unbounded_channel();
        let connection = ConnectionId::new();
        state.registry.open(connection, tx);
        (
            ConnectionContext {
                connection,
                authenticated_user: user,
            },
            rx,
        )
    }

    #[tokio::test]
    async fn test_events_before_identity_are_rejected() {
        let (_, state) = state();
        let (ctx, _rx) = open(&state, Uuid::new_v4());

        let err = handle_event(
            &state,
            &ctx,
            WsInboundEvent::GroupJoin {
                conversation_id: Uuid::new_v4(),
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.code(), error_codes::IDENTITY_REQUIRED);
    }

    #[tokio::test]
    async fn test_identity_must_match_token() {
        let (_, state) = state();
        let (ctx, _rx) = open(&state, Uuid::new_v4());

        let err = handle_event(
            &state,
            &ctx,
            WsInboundEvent::IdentityJoin {
                user_id: Uuid::new_v4(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::NotAuthorized));
        assert!(state.registry.user_of(ctx.connection).is_none());
    }

    #[tokio::test]
    async fn test_spoofed_sender_is_rejected() {
        let (store, state) = state();
        let a = store.insert_user("a", "a@example.com", UserRole::Customer).await;
        let b = store.insert_user("b", "b@example.com", UserRole::Customer).await;
        let conv = state.conversations.create_conversation(&[b.id], a.id).await.unwrap();
        let (ctx, _rx) = open(&state, a.id);
        handle_event(&state, &ctx, WsInboundEvent::IdentityJoin { user_id: a.id })
            .await
            .unwrap();

        let err = handle_event(
            &state,
            &ctx,
            WsInboundEvent::SendMessage {
                conversation_id: conv.id,
                text: "as b".into(),
                sender_id: Some(b.id),
                message_type: None,
                attachment_url: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::NotAuthorized));
        assert_eq!(store.message_count().await, 0);
    }

    #[tokio::test]
    async fn test_worker_reports_errors_and_cleans_up() {
        let (store, state) = state();
        let a = store.insert_user("a", "a@example.com", UserRole::Customer).await;
        let b = store.insert_user("b", "b@example.com", UserRole::Customer).await;
        let foreign = state
            .conversations
            .create_conversation(&[b.id], Uuid::new_v4())
            .await
            .unwrap();
        let (ctx, mut rx) = open(&state, a.id);

        let (events_tx, events_rx) = unbounded_channel();
        let worker = tokio::spawn(run_session(state.clone(), ctx, events_rx));

        events_tx
            .send(SessionEvent::Inbound(WsInboundEvent::IdentityJoin { user_id: a.id }))
            .unwrap();
        events_tx
            .send(SessionEvent::Inbound(WsInboundEvent::SendMessage {
                conversation_id: foreign.id,
                text: "let me in".into(),
                sender_id: None,
                message_type: None,
                attachment_url: None,
            }))
            .unwrap();
        events_tx.send(SessionEvent::Closed).unwrap();
        worker.await.unwrap();

        let mut frames = Vec::new();
        while let Ok(raw) = rx.try_recv() {
            frames.push(serde_json::from_str::<serde_json::Value>(&raw).unwrap());
        }
        // Own presence-update, then the rejection
        let error = frames
            .iter()
            .find(|f| f["type"] == "message-error")
            .expect("error frame");
        assert_eq!(error["code"], error_codes::NOT_CONVERSATION_MEMBER);

        assert!(!state.registry.is_open(ctx.connection));
        assert!(!state.registry.is_online(a.id));
        assert_eq!(store.message_count().await, 0);
    }
}

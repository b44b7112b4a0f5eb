use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::AppResult;
use crate::metrics;
use crate::models::{ActivityStatus, LastSeen, User};
use crate::store::ChatStore;
use crate::websocket::broadcast::BroadcastRouter;
use crate::websocket::{ClosedConnection, ConnectionId, ConnectionRegistry, PresenceChange};

/// Write `last_seen`, logging instead of failing.
pub async fn touch_last_seen_best_effort(store: &dyn ChatStore, user_id: Uuid, at: DateTime<Utc>) {
    if let Err(e) = store.touch_last_seen(user_id, at).await {
        metrics::PRESENCE_WRITE_FAILURES_TOTAL.inc();
        tracing::warn!(%user_id, error = %e, "last_seen update failed");
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PresenceSnapshot {
    pub total_online: usize,
    pub open_connections: usize,
    pub online_users: Vec<Uuid>,
}

/// Online/offline transitions and `last_seen` upkeep.
///
/// "Online" comes from the registry. "Active" comes from `last_seen` and the
/// activity window; the sweep keeps the two from drifting apart.
#[derive(Clone)]
pub struct PresenceService {
    store: Arc<dyn ChatStore>,
    router: BroadcastRouter,
    activity_window: Duration,
}

impl PresenceService {
    pub fn new(store: Arc<dyn ChatStore>, router: BroadcastRouter, activity_window: Duration) -> Self {
        Self {
            store,
            router,
            activity_window,
        }
    }

    fn registry(&self) -> &ConnectionRegistry {
        self.router.registry()
    }

    /// Bind the connection to `user_id`, refresh `last_seen`, and announce the
    /// user if this was their first live connection.
    pub async fn connect(&self, user_id: Uuid, connection: ConnectionId) -> AppResult<PresenceChange> {
        let change = self.registry().register(user_id, connection)?;
        touch_last_seen_best_effort(self.store.as_ref(), user_id, Utc::now()).await;

        if change == PresenceChange::CameOnline {
            let total = self.registry().total_online();
            self.router.broadcast_presence(user_id, true, total);
        }
        tracing::info!(%user_id, %connection, ?change, "user connected");
        Ok(change)
    }

    /// Tear down a connection. Safe to call more than once.
    pub async fn disconnect(&self, connection: ConnectionId) -> Option<ClosedConnection> {
        let closed = self.registry().unregister(connection)?;

        if let Some(user_id) = closed.user_id {
            touch_last_seen_best_effort(self.store.as_ref(), user_id, Utc::now()).await;
            if closed.change == PresenceChange::WentOffline {
                let total = self.registry().total_online();
                self.router.broadcast_presence(user_id, false, total);
            }
            tracing::info!(%user_id, %connection, change = ?closed.change, "user disconnected");
        }
        Some(closed)
    }

    /// Refresh `last_seen` for everyone online. Returns rows updated.
    pub async fn sweep_once(&self) -> u64 {
        let online = self.registry().online_users();
        if online.is_empty() {
            return 0;
        }
        match self.store.touch_last_seen_many(&online, Utc::now()).await {
            Ok(updated) => {
                tracing::debug!(online = online.len(), updated, "presence sweep");
                updated
            }
            Err(e) => {
                metrics::PRESENCE_WRITE_FAILURES_TOTAL.inc();
                tracing::warn!(online = online.len(), error = %e, "presence sweep failed");
                0
            }
        }
    }

    /// Run `sweep_once` every `interval` on its own task.
    pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let service = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                service.sweep_once().await;
            }
        })
    }

    pub fn activity_status(&self, user: &User, now: DateTime<Utc>) -> ActivityStatus {
        user.activity_status(now, self.activity_window)
    }

    /// The `last_seen` bound selecting users with `status` at `now`.
    pub fn last_seen_bound(&self, status: ActivityStatus, now: DateTime<Utc>) -> LastSeen {
        LastSeen::for_status(status, now, self.activity_window)
    }

    pub fn is_online(&self, user_id: Uuid) -> bool {
        self.registry().is_online(user_id)
    }

    pub fn connections_of(&self, user_id: Uuid) -> Vec<ConnectionId> {
        self.registry().connections_for(user_id)
    }

    pub fn snapshot(&self) -> PresenceSnapshot {
        let registry = self.registry();
        PresenceSnapshot {
            total_online: registry.total_online(),
            open_connections: registry.open_connections(),
            online_users: registry.online_users(),
        }
    }
}

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::metrics;
use error_types::error_codes;

pub mod broadcast;
pub mod events;
pub mod message_types;
pub mod pubsub;
pub mod session;

/// Handle of one live WebSocket connection.
///
/// Every upgraded socket gets a fresh id, so a user with two tabs holds two
/// handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Presence effect of a registry mutation on the user it touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceChange {
    CameOnline,
    WentOffline,
    Unchanged,
}

/// What `unregister` tore down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosedConnection {
    pub user_id: Option<Uuid>,
    pub change: PresenceChange,
    pub groups_left: usize,
}

struct ConnectionEntry {
    sender: UnboundedSender<String>,
    user_id: Option<Uuid>,
    groups: HashSet<Uuid>,
}

/// Live connections, their bound identities and their conversation groups.
///
/// Each map is sharded; a mutation holds at most one shard guard at a time,
/// so updates are atomic per user key and per group key. Operations on a
/// single connection are expected to be issued in order by its session worker.
#[derive(Default, Clone)]
pub struct ConnectionRegistry {
    connections: Arc<DashMap<ConnectionId, ConnectionEntry>>,
    // user_id -> live connections bound to that user
    users: Arc<DashMap<Uuid, HashSet<ConnectionId>>>,
    // conversation_id -> connections joined to the group
    groups: Arc<DashMap<Uuid, HashSet<ConnectionId>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a connection before it has identified itself.
    pub fn open(&self, connection: ConnectionId, sender: UnboundedSender<String>) {
        let entry = ConnectionEntry {
            sender,
            user_id: None,
            groups: HashSet::new(),
        };
        if self.connections.insert(connection, entry).is_none() {
            metrics::OPEN_CONNECTIONS.inc();
        }
        tracing::debug!(%connection, "connection opened");
    }

    /// Bind `connection` to `user_id`.
    pub fn register(&self, user_id: Uuid, connection: ConnectionId) -> AppResult<PresenceChange> {
        {
            let mut entry = self.connections.get_mut(&connection).ok_or_else(|| {
                AppError::validation(error_codes::VALIDATION_FAILED, "connection is not open")
            })?;
            let current = entry.user_id;
            match current {
                Some(bound) if bound == user_id => return Ok(PresenceChange::Unchanged),
                Some(_) => {
                    return Err(AppError::validation(
                        error_codes::VALIDATION_FAILED,
                        "connection is already bound to another user",
                    ))
                }
                None => entry.user_id = Some(user_id),
            }
        }

        let mut devices = self.users.entry(user_id).or_default();
        let came_online = devices.is_empty();
        devices.insert(connection);
        let count = devices.len();
        drop(devices);

        tracing::debug!(%user_id, %connection, devices = count, "identity registered");
        if came_online {
            metrics::ONLINE_USERS.inc();
            Ok(PresenceChange::CameOnline)
        } else {
            Ok(PresenceChange::Unchanged)
        }
    }

    /// Drop a connection with its identity binding and group memberships.
    ///
    /// `None` when the handle is unknown, which makes a repeated call a no-op.
    pub fn unregister(&self, connection: ConnectionId) -> Option<ClosedConnection> {
        let (_, entry) = self.connections.remove(&connection)?;
        metrics::OPEN_CONNECTIONS.dec();

        let groups_left = entry.groups.len();
        for group in &entry.groups {
            self.remove_from_group(*group, connection);
        }

        let mut change = PresenceChange::Unchanged;
        if let Some(user_id) = entry.user_id {
            if let Entry::Occupied(mut devices) = self.users.entry(user_id) {
                devices.get_mut().remove(&connection);
                if devices.get().is_empty() {
                    devices.remove();
                    change = PresenceChange::WentOffline;
                    metrics::ONLINE_USERS.dec();
                }
            }
        }

        tracing::debug!(%connection, user_id = ?entry.user_id, groups_left, "connection closed");
        Some(ClosedConnection {
            user_id: entry.user_id,
            change,
            groups_left,
        })
    }

    /// Returns `false` if the connection was already in the group.
    pub fn join_group(&self, connection: ConnectionId, conversation_id: Uuid) -> AppResult<bool> {
        let inserted = {
            let mut entry = self.connections.get_mut(&connection).ok_or_else(|| {
                AppError::validation(error_codes::VALIDATION_FAILED, "connection is not open")
            })?;
            entry.groups.insert(conversation_id)
        };
        if inserted {
            self.groups
                .entry(conversation_id)
                .or_default()
                .insert(connection);
        }
        Ok(inserted)
    }

    /// Returns `false` if the connection was not in the group.
    pub fn leave_group(&self, connection: ConnectionId, conversation_id: Uuid) -> bool {
        let removed = self
            .connections
            .get_mut(&connection)
            .map(|mut entry| entry.groups.remove(&conversation_id))
            .unwrap_or(false);
        if removed {
            self.remove_from_group(conversation_id, connection);
        }
        removed
    }

    fn remove_from_group(&self, conversation_id: Uuid, connection: ConnectionId) {
        if let Entry::Occupied(mut members) = self.groups.entry(conversation_id) {
            members.get_mut().remove(&connection);
            // Clean up empty group entries
            if members.get().is_empty() {
                members.remove();
            }
        }
    }

    pub fn user_of(&self, connection: ConnectionId) -> Option<Uuid> {
        self.connections.get(&connection).and_then(|e| e.user_id)
    }

    pub fn is_open(&self, connection: ConnectionId) -> bool {
        self.connections.contains_key(&connection)
    }

    pub fn is_online(&self, user_id: Uuid) -> bool {
        self.users.contains_key(&user_id)
    }

    pub fn connections_for(&self, user_id: Uuid) -> Vec<ConnectionId> {
        self.users
            .get(&user_id)
            .map(|devices| devices.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn online_users(&self) -> Vec<Uuid> {
        self.users.iter().map(|e| *e.key()).collect()
    }

    pub fn total_online(&self) -> usize {
        self.users.len()
    }

    pub fn open_connections(&self) -> usize {
        self.connections.len()
    }

    pub fn groups_of(&self, connection: ConnectionId) -> Vec<Uuid> {
        self.connections
            .get(&connection)
            .map(|e| e.groups.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn group_members(&self, conversation_id: Uuid) -> Vec<ConnectionId> {
        self.groups
            .get(&conversation_id)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Queue a frame on one connection. `false` if it is gone.
    pub fn send_to(&self, connection: ConnectionId, payload: String) -> bool {
        self.connections
            .get(&connection)
            .map(|e| e.sender.send(payload).is_ok())
            .unwrap_or(false)
    }

    /// Send to every connection joined to the group, minus `exclude`.
    /// Returns how many connections accepted the frame.
    pub fn send_group(
        &self,
        conversation_id: Uuid,
        payload: &str,
        exclude: Option<ConnectionId>,
    ) -> usize {
        // Snapshot first so no group guard is held while touching connections
        let members = self.group_members(conversation_id);
        members
            .into_iter()
            .filter(|c| Some(*c) != exclude)
            .filter(|c| self.send_to(*c, payload.to_string()))
            .count()
    }

    /// Send to every open connection.
    pub fn send_all(&self, payload: &str) -> usize {
        let targets: Vec<ConnectionId> = self.connections.iter().map(|e| *e.key()).collect();
        targets
            .into_iter()
            .filter(|c| self.send_to(*c, payload.to_string()))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

    fn open(registry: &ConnectionRegistry) -> (ConnectionId, UnboundedReceiver<String>) {
        let (tx, rx) = unbounded_channel();
        let id = ConnectionId::new();
        registry.open(id, tx);
        (id, rx)
    }

    #[test]
    fn test_first_device_fires_online_and_last_fires_offline() {
        let registry = ConnectionRegistry::new();
        let user = Uuid::new_v4();
        let (phone, _rx1) = open(&registry);
        let (laptop, _rx2) = open(&registry);

        assert_eq!(registry.register(user, phone).unwrap(), PresenceChange::CameOnline);
        assert_eq!(registry.register(user, laptop).unwrap(), PresenceChange::Unchanged);
        assert!(registry.is_online(user));
        assert_eq!(registry.connections_for(user).len(), 2);

        let closed = registry.unregister(phone).unwrap();
        assert_eq!(closed.change, PresenceChange::Unchanged);
        assert!(registry.is_online(user));

        let closed = registry.unregister(laptop).unwrap();
        assert_eq!(closed.user_id, Some(user));
        assert_eq!(closed.change, PresenceChange::WentOffline);
        assert!(!registry.is_online(user));
        assert!(registry.connections_for(user).is_empty());
    }

    #[test]
    fn test_rebinding_same_user_is_noop_and_other_user_is_rejected() {
        let registry = ConnectionRegistry::new();
        let alice = Uuid::new_v4();
        let (conn, _rx) = open(&registry);

        registry.register(alice, conn).unwrap();
        assert_eq!(registry.register(alice, conn).unwrap(), PresenceChange::Unchanged);
        assert_eq!(registry.connections_for(alice).len(), 1);

        let err = registry.register(Uuid::new_v4(), conn).unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
        assert_eq!(registry.user_of(conn), Some(alice));
    }

    #[test]
    fn test_unregister_unknown_handle_is_noop() {
        let registry = ConnectionRegistry::new();
        let (conn, _rx) = open(&registry);
        assert!(registry.unregister(conn).is_some());
        assert!(registry.unregister(conn).is_none());
        assert!(registry.unregister(ConnectionId::new()).is_none());
    }

    #[test]
    fn test_close_drops_every_group_membership() {
        let registry = ConnectionRegistry::new();
        let (conn, _rx) = open(&registry);
        let (other, _rx2) = open(&registry);
        let g1 = Uuid::new_v4();
        let g2 = Uuid::new_v4();

        assert!(registry.join_group(conn, g1).unwrap());
        assert!(!registry.join_group(conn, g1).unwrap());
        registry.join_group(conn, g2).unwrap();
        registry.join_group(other, g2).unwrap();

        let closed = registry.unregister(conn).unwrap();
        assert_eq!(closed.groups_left, 2);
        assert!(registry.group_members(g1).is_empty());
        assert_eq!(registry.group_members(g2), vec![other]);
    }

    #[test]
    fn test_send_group_honors_exclude_and_membership() {
        let registry = ConnectionRegistry::new();
        let group = Uuid::new_v4();
        let (a, mut rx_a) = open(&registry);
        let (b, mut rx_b) = open(&registry);
        let (_c, mut rx_c) = open(&registry);
        registry.join_group(a, group).unwrap();
        registry.join_group(b, group).unwrap();

        assert_eq!(registry.send_group(group, "hello", Some(a)), 1);
        assert!(rx_a.try_recv().is_err());
        assert_eq!(rx_b.try_recv().unwrap(), "hello");
        assert!(rx_c.try_recv().is_err());

        assert!(registry.leave_group(b, group));
        assert!(!registry.leave_group(b, group));
        assert_eq!(registry.send_group(group, "again", None), 1);
        assert_eq!(rx_a.try_recv().unwrap(), "again");
    }

    #[test]
    fn test_dead_receiver_is_skipped() {
        let registry = ConnectionRegistry::new();
        let group = Uuid::new_v4();
        let (a, rx_a) = open(&registry);
        let (b, mut rx_b) = open(&registry);
        registry.join_group(a, group).unwrap();
        registry.join_group(b, group).unwrap();
        drop(rx_a);

        assert_eq!(registry.send_group(group, "x", None), 1);
        assert_eq!(rx_b.try_recv().unwrap(), "x");
        assert_eq!(registry.send_all("y"), 1);
    }

    #[test]
    fn test_concurrent_devices_fire_exactly_one_transition_each_way() {
        let registry = ConnectionRegistry::new();
        let user = Uuid::new_v4();
        let mut receivers = Vec::new();
        let mut conns = Vec::new();
        for _ in 0..32 {
            let (conn, rx) = open(&registry);
            conns.push(conn);
            receivers.push(rx);
        }

        let online: usize = std::thread::scope(|s| {
            let handles: Vec<_> = conns
                .iter()
                .map(|conn| {
                    let registry = &registry;
                    s.spawn(move || registry.register(user, *conn).unwrap())
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|c| *c == PresenceChange::CameOnline)
                .count()
        });
        assert_eq!(online, 1);
        assert_eq!(registry.connections_for(user).len(), 32);

        let offline: usize = std::thread::scope(|s| {
            let handles: Vec<_> = conns
                .iter()
                .map(|conn| {
                    let registry = &registry;
                    s.spawn(move || registry.unregister(*conn).unwrap().change)
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|c| *c == PresenceChange::WentOffline)
                .count()
        });
        assert_eq!(offline, 1);
        assert!(!registry.is_online(user));
        assert_eq!(registry.total_online(), 0);
    }
}

//! Live connection registry.
//!
//! The scope-bucket maps here are the only shared mutable state in the
//! fabric. All mutation goes through [`ConnectionRegistry::register`] and
//! [`ConnectionRegistry::deregister`]; readers get snapshots, never live
//! views, so a concurrent broadcast can never observe a torn bucket.

use crate::error::FabricError;
use crate::types::{ConnectionId, RoomId, ServerId, UserId};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::fmt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;

/// Broadcast group identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeKey {
    /// Platform-wide presence scope.
    Global,
    /// All sessions watching one community server.
    Server(ServerId),
    /// One text room's chat scope.
    Room(RoomId),
    /// One room's call-signaling scope.
    Call(RoomId),
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => write!(f, "global"),
            Self::Server(id) => write!(f, "server:{id}"),
            Self::Room(id) => write!(f, "room:{id}"),
            Self::Call(id) => write!(f, "call:{id}"),
        }
    }
}

/// Cloneable handle to one live connection's outbound queue.
///
/// The WebSocket itself stays with the session task; everything else in the
/// process talks to the connection through this handle.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub id: ConnectionId,
    pub user_id: UserId,
    pub joined_at: DateTime<Utc>,
    outbound: mpsc::Sender<WsMessage>,
}

impl ConnectionHandle {
    pub fn new(user_id: UserId, outbound: mpsc::Sender<WsMessage>) -> Self {
        Self {
            id: ConnectionId::new_v4(),
            user_id,
            joined_at: Utc::now(),
            outbound,
        }
    }

    /// Enqueue a text payload without waiting.
    ///
    /// A full queue means the peer cannot keep up; a closed queue means it
    /// is gone. Either way the caller treats the connection as dead.
    pub fn send(&self, payload: &str) -> Result<(), FabricError> {
        self.send_frame(WsMessage::Text(payload.to_string()))
    }

    /// Enqueue an arbitrary frame (pong replies, close notices).
    pub fn send_frame(&self, frame: WsMessage) -> Result<(), FabricError> {
        self.outbound
            .try_send(frame)
            .map_err(|_| FabricError::Transient(self.id))
    }
}

/// Registry of live connections keyed by scope.
#[derive(Default)]
pub struct ConnectionRegistry {
    /// Scope buckets. Empty buckets are deleted eagerly so churn of
    /// ephemeral room/server ids does not grow the map.
    scopes: DashMap<ScopeKey, HashMap<ConnectionId, ConnectionHandle>>,
    /// Reverse index: which scopes each connection is registered under.
    connections: DashMap<ConnectionId, HashSet<ScopeKey>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection under a scope. Idempotent per (scope, connection);
    /// the scope bucket is created lazily.
    ///
    /// Returns true when this is the user's first connection in the scope.
    /// The check runs under the bucket lock, so concurrent registrations
    /// of the same user see the transition exactly once.
    pub fn register(&self, scope: ScopeKey, handle: ConnectionHandle) -> bool {
        self.connections
            .entry(handle.id)
            .or_default()
            .insert(scope);
        let mut bucket = self.scopes.entry(scope).or_default();
        let already_present = bucket.contains_key(&handle.id);
        let first_for_user = !already_present
            && !bucket.values().any(|c| c.user_id == handle.user_id);
        bucket.insert(handle.id, handle);
        first_for_user
    }

    /// Remove a connection from one scope bucket.
    ///
    /// Deregistering an absent connection is a no-op, not an error:
    /// disconnect races are expected.
    pub fn deregister(&self, scope: ScopeKey, id: ConnectionId) {
        if let Some(mut scopes) = self.connections.get_mut(&id) {
            scopes.remove(&scope);
        }
        self.connections.remove_if(&id, |_, scopes| scopes.is_empty());

        if let Some(mut bucket) = self.scopes.get_mut(&scope) {
            bucket.remove(&id);
        }
        self.scopes.remove_if(&scope, |_, bucket| bucket.is_empty());
    }

    /// Remove a connection from every scope it was registered under.
    ///
    /// This is the disconnect path; it must leave no trace of the
    /// connection regardless of how many scopes it had joined.
    ///
    /// Returns the scopes the user vacated, i.e. where this was their last
    /// connection. Decided under each bucket lock, so concurrent removals
    /// of one user's connections report each vacated scope exactly once.
    pub fn remove_connection(&self, id: ConnectionId) -> Vec<ScopeKey> {
        let scopes = self
            .connections
            .remove(&id)
            .map(|(_, scopes)| scopes)
            .unwrap_or_default();
        let mut vacated = Vec::new();
        for scope in scopes {
            if let Some(mut bucket) = self.scopes.get_mut(&scope) {
                if let Some(removed) = bucket.remove(&id) {
                    let user_gone = !bucket.values().any(|c| c.user_id == removed.user_id);
                    if user_gone {
                        vacated.push(scope);
                    }
                }
            }
            self.scopes.remove_if(&scope, |_, bucket| bucket.is_empty());
        }
        vacated
    }

    /// Snapshot of the members currently registered under `scope`.
    pub fn members_of(&self, scope: ScopeKey) -> Vec<ConnectionHandle> {
        self.scopes
            .get(&scope)
            .map(|bucket| bucket.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Distinct user ids currently present under `scope`.
    pub fn users_in(&self, scope: ScopeKey) -> HashSet<UserId> {
        self.scopes
            .get(&scope)
            .map(|bucket| bucket.values().map(|c| c.user_id).collect())
            .unwrap_or_default()
    }

    /// Number of connections registered under `scope`.
    pub fn connection_count(&self, scope: ScopeKey) -> usize {
        self.scopes.get(&scope).map(|b| b.len()).unwrap_or(0)
    }

    /// Whether `user` holds at least one connection under `scope`.
    pub fn user_present(&self, scope: ScopeKey, user: UserId) -> bool {
        self.scopes
            .get(&scope)
            .map(|bucket| bucket.values().any(|c| c.user_id == user))
            .unwrap_or(false)
    }

    /// Whether the connection is still registered anywhere.
    pub fn is_registered(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    /// Number of live scope buckets (for gauges and leak checks).
    pub fn scope_count(&self) -> usize {
        self.scopes.len()
    }
}

//! WebSocket endpoint path grammar.
//!
//! Each connection declares its purpose in the upgrade path:
//!
//! - `/ws/main/{user_id}` - global presence and platform announcements
//! - `/ws/server/{server_id}/{user_id}` - one community server's feed
//! - `/ws/textroom/{room_id}/{user_id}` - one text room's chat
//! - `/ws/callroom/{room_id}/{user_id}` - one room's call signaling
//!
//! A call connection also joins the global scope, so a user whose only
//! socket is a call still counts as online and their media state is torn
//! down together with their presence.

use crate::registry::ScopeKey;
use crate::types::{RoomId, ServerId, UserId};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Main { user: UserId },
    Server { server: ServerId, user: UserId },
    TextRoom { room: RoomId, user: UserId },
    CallRoom { room: RoomId, user: UserId },
}

impl Endpoint {
    /// Parse an upgrade request path. `None` rejects the handshake.
    pub fn parse(path: &str) -> Option<Self> {
        let mut parts = path.trim_start_matches('/').split('/');
        if parts.next()? != "ws" {
            return None;
        }
        let kind = parts.next()?;
        let endpoint = match kind {
            "main" => Self::Main {
                user: parts.next()?.parse().ok()?,
            },
            "server" => Self::Server {
                server: parts.next()?.parse().ok()?,
                user: parts.next()?.parse().ok()?,
            },
            "textroom" => Self::TextRoom {
                room: parts.next()?.parse().ok()?,
                user: parts.next()?.parse().ok()?,
            },
            "callroom" => Self::CallRoom {
                room: parts.next()?.parse().ok()?,
                user: parts.next()?.parse().ok()?,
            },
            _ => return None,
        };
        // Trailing segments are a malformed path, not extra data.
        if parts.next().is_some() {
            return None;
        }
        Some(endpoint)
    }

    /// The scopes this connection registers under.
    pub fn scopes(&self) -> Vec<ScopeKey> {
        match self {
            Self::Main { .. } => vec![ScopeKey::Global],
            Self::Server { server, .. } => vec![ScopeKey::Server(*server)],
            Self::TextRoom { room, .. } => vec![ScopeKey::Room(*room)],
            Self::CallRoom { room, .. } => vec![ScopeKey::Global, ScopeKey::Call(*room)],
        }
    }

    pub fn user(&self) -> UserId {
        match self {
            Self::Main { user }
            | Self::Server { user, .. }
            | Self::TextRoom { user, .. }
            | Self::CallRoom { user, .. } => *user,
        }
    }

    /// The call room id, when this is a call connection.
    pub fn call_room(&self) -> Option<RoomId> {
        match self {
            Self::CallRoom { room, .. } => Some(*room),
            _ => None,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Main { user } => write!(f, "main/{user}"),
            Self::Server { server, user } => write!(f, "server/{server}/{user}"),
            Self::TextRoom { room, user } => write!(f, "textroom/{room}/{user}"),
            Self::CallRoom { room, user } => write!(f, "callroom/{room}/{user}"),
        }
    }
}

//! Restricted-room message visibility.
//!
//! In a restricted room (office hours, help desk), a regular member sees a
//! private thread with the room's elevated users: their own messages, plus
//! staff messages that are either broadcast to everyone or replies into
//! their thread. Elevated users see the full transcript. The filter is
//! pure over a message snapshot; callers fetch and persist elsewhere.

use crate::directory::Role;
use crate::types::{RoomId, UserId};
use chrono::{DateTime, Utc};
use std::collections::HashSet;

/// Message id as stored by the platform.
pub type MessageId = String;

/// The fields the visibility filter needs from a stored message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageEnvelope {
    pub id: MessageId,
    pub author_id: UserId,
    pub room_id: RoomId,
    pub created_at: DateTime<Utc>,
    /// `None` for a top-level message.
    pub reply_to: Option<MessageId>,
    /// Marks a staff message addressed to one member's thread rather than
    /// the whole room.
    pub private: bool,
}

/// Map legacy "no parent" encodings to the canonical sentinel.
///
/// Older rows carry `"0"` or `""` where no parent exists; both mean
/// top-level.
pub fn normalize_reply_to(raw: Option<String>) -> Option<MessageId> {
    match raw.as_deref() {
        None | Some("0") | Some("") => None,
        Some(_) => raw,
    }
}

/// Filter a room transcript down to what `requester` may see.
///
/// `staff` is the set of elevated user ids for the room's server, owner
/// included. The result is ordered by creation time regardless of input
/// order.
pub fn visible_messages(
    messages: Vec<MessageEnvelope>,
    requester: UserId,
    requester_role: Role,
    staff: &HashSet<UserId>,
) -> Vec<MessageEnvelope> {
    let mut visible = if requester_role.is_elevated() {
        messages
    } else {
        let own_ids: HashSet<&MessageId> = messages
            .iter()
            .filter(|m| m.author_id == requester)
            .map(|m| &m.id)
            .collect();

        messages
            .iter()
            .filter(|m| {
                if m.author_id == requester {
                    return true;
                }
                if !staff.contains(&m.author_id) {
                    return false;
                }
                match &m.reply_to {
                    // Broadcast: top-level staff message not marked private.
                    None => !m.private,
                    // Reply into the requester's own thread, private or not.
                    Some(parent) => own_ids.contains(parent),
                }
            })
            .cloned()
            .collect()
    };

    visible.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    visible
}

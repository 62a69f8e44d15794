//! Call signaling.
//!
//! Frames flow peer-to-peer through the room's call scope; the coordinator
//! relays every frame verbatim and mirrors the state-bearing events into a
//! per-room [`CallRoom`] so late joiners and the roster UI can see who is
//! in voice, sharing, or on camera without replaying the stream. State for
//! a room exists only while the room's call scope has connections.

pub mod event;

pub use event::SignalEvent;

use crate::broadcast::BroadcastRouter;
use crate::metrics;
use crate::registry::{ConnectionRegistry, ScopeKey};
use crate::types::{RoomId, UserId};
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Mirrored media state for one room's call.
#[derive(Debug, Default)]
pub struct CallRoom {
    in_voice: HashSet<UserId>,
    sharing_screen: HashSet<UserId>,
    camera_on: HashSet<UserId>,
}

impl CallRoom {
    /// Apply one state-bearing event. Last write wins; removing an absent
    /// user is a no-op because teardown races with explicit leave frames.
    fn apply(&mut self, user: UserId, event: SignalEvent) {
        match event {
            SignalEvent::JoinedCall => {
                self.in_voice.insert(user);
            }
            // Leaving voice says nothing about screen or camera; those
            // have their own stop events. Only connection close clears
            // everything at once.
            SignalEvent::LeftCall => {
                self.in_voice.remove(&user);
            }
            SignalEvent::StartedSharingScreen => {
                self.sharing_screen.insert(user);
            }
            SignalEvent::StoppedSharingScreen => {
                self.sharing_screen.remove(&user);
            }
            SignalEvent::CameraOn => {
                self.camera_on.insert(user);
            }
            SignalEvent::CameraOff => {
                self.camera_on.remove(&user);
            }
        }
    }

    fn remove_user(&mut self, user: UserId) {
        self.in_voice.remove(&user);
        self.sharing_screen.remove(&user);
        self.camera_on.remove(&user);
    }

    fn is_empty(&self) -> bool {
        self.in_voice.is_empty() && self.sharing_screen.is_empty() && self.camera_on.is_empty()
    }
}

/// Per-room signaling relay and state mirror.
pub struct CallSignalingCoordinator {
    registry: Arc<ConnectionRegistry>,
    router: Arc<BroadcastRouter>,
    rooms: DashMap<RoomId, CallRoom>,
}

impl CallSignalingCoordinator {
    pub fn new(registry: Arc<ConnectionRegistry>, router: Arc<BroadcastRouter>) -> Self {
        Self {
            registry,
            router,
            rooms: DashMap::new(),
        }
    }

    /// A session joined the room's call scope. Announce it to everyone in
    /// the scope, the joiner included, so all peers share one view of the
    /// participant list.
    pub fn connection_opened(&self, room: RoomId, user: UserId) {
        let notice = serde_json::json!({"type": "user-joined", "userId": user});
        self.router
            .broadcast(ScopeKey::Call(room), &notice.to_string());
    }

    /// Relay one inbound frame and mirror its state if it carries any.
    pub fn handle_frame(&self, room: RoomId, user: UserId, payload: &str) {
        if let Some(event) = SignalEvent::decode(payload) {
            self.rooms.entry(room).or_default().apply(user, event);
            metrics::record_signal_event(event.keyword());
            debug!(room, user, event = event.keyword(), "call state updated");
        }
        self.router.broadcast(ScopeKey::Call(room), payload);
    }

    /// A session left the room's call scope. The user's media state is
    /// cleared whether or not they sent `left_call` first, and the peers
    /// are told to drop their RTC connections.
    ///
    /// Call after the connection is deregistered so the emptiness check
    /// sees the post-departure scope.
    pub fn connection_closed(&self, room: RoomId, user: UserId) {
        if let Some(mut state) = self.rooms.get_mut(&room) {
            state.remove_user(user);
        }
        if self.registry.connection_count(ScopeKey::Call(room)) == 0 {
            self.rooms.remove_if(&room, |_, state| state.is_empty());
        }

        let notice = serde_json::json!({"type": "user-left", "userId": user});
        self.router
            .broadcast(ScopeKey::Call(room), &notice.to_string());
    }

    /// Users currently in voice, sorted for stable display.
    pub fn list_voice_users(&self, room: RoomId) -> Vec<UserId> {
        let mut users: Vec<UserId> = self
            .rooms
            .get(&room)
            .map(|state| state.in_voice.iter().copied().collect())
            .unwrap_or_default();
        users.sort_unstable();
        users
    }

    /// Users currently sharing their screen.
    pub fn list_screen_sharers(&self, room: RoomId) -> Vec<UserId> {
        let mut users: Vec<UserId> = self
            .rooms
            .get(&room)
            .map(|state| state.sharing_screen.iter().copied().collect())
            .unwrap_or_default();
        users.sort_unstable();
        users
    }

    /// Users currently on camera.
    pub fn list_camera_users(&self, room: RoomId) -> Vec<UserId> {
        let mut users: Vec<UserId> = self
            .rooms
            .get(&room)
            .map(|state| state.camera_on.iter().copied().collect())
            .unwrap_or_default();
        users.sort_unstable();
        users
    }

    /// Number of rooms holding live call state (for gauges and leak
    /// checks).
    pub fn tracked_rooms(&self) -> usize {
        self.rooms.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ConnectionHandle;
    use tokio::sync::mpsc;
    use tokio_tungstenite::tungstenite::Message as WsMessage;

    fn fixture() -> (CallSignalingCoordinator, Arc<ConnectionRegistry>) {
        let registry = Arc::new(ConnectionRegistry::new());
        let router = Arc::new(BroadcastRouter::new(registry.clone()));
        (CallSignalingCoordinator::new(registry.clone(), router), registry)
    }

    fn peer(
        registry: &ConnectionRegistry,
        room: RoomId,
        user: UserId,
    ) -> (ConnectionHandle, mpsc::Receiver<WsMessage>) {
        let (tx, rx) = mpsc::channel(16);
        let handle = ConnectionHandle::new(user, tx);
        registry.register(ScopeKey::Call(room), handle.clone());
        (handle, rx)
    }

    #[tokio::test]
    async fn voice_roster_follows_join_and_leave_events() {
        let (calls, registry) = fixture();
        let (_h1, _rx1) = peer(&registry, 7, 1);
        let (_h2, _rx2) = peer(&registry, 7, 2);

        calls.handle_frame(7, 2, r#"{"message":"joined_call"}"#);
        assert_eq!(calls.list_voice_users(7), vec![2]);

        calls.handle_frame(7, 1, r#"{"message":"joined_call"}"#);
        assert_eq!(calls.list_voice_users(7), vec![1, 2]);

        calls.handle_frame(7, 2, r#"{"message":"left_call"}"#);
        assert_eq!(calls.list_voice_users(7), vec![1]);
    }

    #[tokio::test]
    async fn frames_are_relayed_verbatim_to_all_peers() {
        let (calls, registry) = fixture();
        let (_h1, mut rx1) = peer(&registry, 7, 1);
        let (_h2, mut rx2) = peer(&registry, 7, 2);

        let offer = r#"{"sdp":"v=0 o=- 46117 2","target":2}"#;
        calls.handle_frame(7, 1, offer);

        assert_eq!(rx1.recv().await, Some(WsMessage::Text(offer.into())));
        assert_eq!(rx2.recv().await, Some(WsMessage::Text(offer.into())));
        // Relay-only frames leave the mirror untouched.
        assert_eq!(calls.tracked_rooms(), 0);
    }

    #[tokio::test]
    async fn media_flags_follow_last_write() {
        let (calls, registry) = fixture();
        let (_h, _rx) = peer(&registry, 7, 3);

        calls.handle_frame(7, 3, r#"{"message":"joined_call"}"#);
        calls.handle_frame(7, 3, r#"{"message":"camera_on"}"#);
        calls.handle_frame(7, 3, r#"{"message":"started_sharing_screen"}"#);
        assert_eq!(calls.list_camera_users(7), vec![3]);
        assert_eq!(calls.list_screen_sharers(7), vec![3]);

        calls.handle_frame(7, 3, r#"{"message":"camera_off"}"#);
        assert_eq!(calls.list_camera_users(7), Vec::<UserId>::new());

        calls.handle_frame(7, 3, r#"{"message":"stopped_sharing_screen"}"#);
        assert_eq!(calls.list_screen_sharers(7), Vec::<UserId>::new());

        calls.handle_frame(7, 3, r#"{"message":"left_call"}"#);
        assert_eq!(calls.list_voice_users(7), Vec::<UserId>::new());
    }

    #[tokio::test]
    async fn leaving_voice_keeps_independent_media_flags() {
        let (calls, registry) = fixture();
        let (_h, _rx) = peer(&registry, 7, 3);

        calls.handle_frame(7, 3, r#"{"message":"joined_call"}"#);
        calls.handle_frame(7, 3, r#"{"message":"started_sharing_screen"}"#);
        calls.handle_frame(7, 3, r#"{"message":"camera_on"}"#);

        // A user can stay on screen/camera after dropping out of voice.
        calls.handle_frame(7, 3, r#"{"message":"left_call"}"#);
        assert_eq!(calls.list_voice_users(7), Vec::<UserId>::new());
        assert_eq!(calls.list_screen_sharers(7), vec![3]);
        assert_eq!(calls.list_camera_users(7), vec![3]);
    }

    #[tokio::test]
    async fn leave_for_absent_user_is_a_noop() {
        let (calls, registry) = fixture();
        let (_h, _rx) = peer(&registry, 7, 1);

        calls.handle_frame(7, 1, r#"{"message":"left_call"}"#);
        assert_eq!(calls.list_voice_users(7), Vec::<UserId>::new());
    }

    #[tokio::test]
    async fn disconnect_clears_state_without_a_leave_frame() {
        let (calls, registry) = fixture();
        let (h1, _rx1) = peer(&registry, 7, 1);
        let (_h2, mut rx2) = peer(&registry, 7, 2);

        calls.handle_frame(7, 1, r#"{"message":"joined_call"}"#);
        // Drain the join frame relay.
        rx2.recv().await.unwrap();

        registry.remove_connection(h1.id);
        calls.connection_closed(7, 1);

        assert_eq!(calls.list_voice_users(7), Vec::<UserId>::new());
        let notice = rx2.recv().await.unwrap();
        assert_eq!(
            notice,
            WsMessage::Text(r#"{"type":"user-left","userId":1}"#.into())
        );
    }

    #[tokio::test]
    async fn room_state_is_dropped_when_the_scope_empties() {
        let (calls, registry) = fixture();
        let (h, _rx) = peer(&registry, 7, 1);

        calls.handle_frame(7, 1, r#"{"message":"joined_call"}"#);
        assert_eq!(calls.tracked_rooms(), 1);

        registry.remove_connection(h.id);
        calls.connection_closed(7, 1);
        assert_eq!(calls.tracked_rooms(), 0);
    }

    #[tokio::test]
    async fn join_notice_reaches_every_peer_including_the_joiner() {
        let (calls, registry) = fixture();
        let (_h1, mut rx1) = peer(&registry, 7, 1);
        let (_h2, mut rx2) = peer(&registry, 7, 2);

        calls.connection_opened(7, 2);
        let expected = WsMessage::Text(r#"{"type":"user-joined","userId":2}"#.into());
        assert_eq!(rx1.recv().await.unwrap(), expected);
        assert_eq!(rx2.recv().await.unwrap(), expected);
    }
}

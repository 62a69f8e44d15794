//! Scope fan-out.
//!
//! Delivery to one scope is a snapshot-then-iterate pass over the registry:
//! the member list is fixed before the first send, so connections added
//! mid-broadcast see nothing and connections that die mid-broadcast cannot
//! disturb the iteration. Dead connections are collected during the pass
//! and deregistered afterwards.

use crate::metrics;
use crate::registry::{ConnectionRegistry, ScopeKey};
use crate::types::ConnectionId;
use std::sync::Arc;
use tracing::debug;

/// Fan-out engine over the shared registry.
pub struct BroadcastRouter {
    registry: Arc<ConnectionRegistry>,
}

impl BroadcastRouter {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Deliver `payload` to every connection currently in `scope`.
    ///
    /// Best-effort per receiver: a connection whose queue is full or closed
    /// is dropped from the registry entirely, and the remaining members
    /// still receive the payload. Returns the number of successful
    /// deliveries. An empty scope delivers to nobody and is not an error.
    pub fn broadcast(&self, scope: ScopeKey, payload: &str) -> usize {
        let members = self.registry.members_of(scope);
        let mut dead: Vec<ConnectionId> = Vec::new();
        let mut delivered = 0usize;

        for handle in &members {
            match handle.send(payload) {
                Ok(()) => delivered += 1,
                Err(_) => dead.push(handle.id),
            }
        }

        metrics::record_broadcast(delivered, dead.len());
        if !dead.is_empty() {
            debug!(scope = %scope, dropped = dead.len(), "dropping unresponsive connections");
        }
        // Mutate only after the snapshot pass is complete.
        for id in dead {
            self.registry.remove_connection(id);
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ConnectionHandle;
    use tokio::sync::mpsc;
    use tokio_tungstenite::tungstenite::Message as WsMessage;

    fn wired_handle(
        user: i64,
        capacity: usize,
    ) -> (ConnectionHandle, mpsc::Receiver<WsMessage>) {
        let (tx, rx) = mpsc::channel(capacity);
        (ConnectionHandle::new(user, tx), rx)
    }

    #[tokio::test]
    async fn delivers_in_send_order_per_receiver() {
        let registry = Arc::new(ConnectionRegistry::new());
        let router = BroadcastRouter::new(registry.clone());
        let (handle, mut rx) = wired_handle(1, 8);
        registry.register(ScopeKey::Room(7), handle);

        assert_eq!(router.broadcast(ScopeKey::Room(7), "first"), 1);
        assert_eq!(router.broadcast(ScopeKey::Room(7), "second"), 1);

        assert_eq!(rx.recv().await, Some(WsMessage::Text("first".into())));
        assert_eq!(rx.recv().await, Some(WsMessage::Text("second".into())));
    }

    #[tokio::test]
    async fn dead_member_does_not_block_the_rest() {
        let registry = Arc::new(ConnectionRegistry::new());
        let router = BroadcastRouter::new(registry.clone());

        let (dead, dead_rx) = wired_handle(1, 8);
        drop(dead_rx);
        let (alive, mut rx) = wired_handle(2, 8);

        let dead_id = dead.id;
        registry.register(ScopeKey::Room(7), dead);
        registry.register(ScopeKey::Room(7), alive);

        assert_eq!(router.broadcast(ScopeKey::Room(7), "hello"), 1);
        assert_eq!(rx.recv().await, Some(WsMessage::Text("hello".into())));
        assert!(!registry.is_registered(dead_id));
    }

    #[tokio::test]
    async fn slow_consumer_is_disconnected_on_overflow() {
        let registry = Arc::new(ConnectionRegistry::new());
        let router = BroadcastRouter::new(registry.clone());

        let (slow, _rx) = wired_handle(1, 1);
        let slow_id = slow.id;
        registry.register(ScopeKey::Global, slow);

        assert_eq!(router.broadcast(ScopeKey::Global, "fills the queue"), 1);
        assert_eq!(router.broadcast(ScopeKey::Global, "overflows"), 0);
        assert!(!registry.is_registered(slow_id));
    }

    #[tokio::test]
    async fn empty_scope_is_not_an_error() {
        let registry = Arc::new(ConnectionRegistry::new());
        let router = BroadcastRouter::new(registry);
        assert_eq!(router.broadcast(ScopeKey::Server(99), "nobody home"), 0);
    }
}

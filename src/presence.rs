//! Derived presence.
//!
//! A user is online while they hold at least one global-scope connection;
//! there is no separate presence store to drift out of sync. Status change
//! fan-out goes to every server the user belongs to, so members watching
//! those servers see "10: online" / "10: offline" lines as global
//! connections come and go. The gating (only the first connection fires
//! online, only the last fires offline) lives in the session lifecycle,
//! which can order the check against registration; this module just fans
//! out and answers roster queries.

use crate::broadcast::BroadcastRouter;
use crate::directory::Directory;
use crate::error::FabricResult;
use crate::registry::{ConnectionRegistry, ScopeKey};
use crate::types::{ServerId, UserId};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

pub struct PresenceTracker {
    registry: Arc<ConnectionRegistry>,
    router: Arc<BroadcastRouter>,
    directory: Arc<dyn Directory>,
}

impl PresenceTracker {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        router: Arc<BroadcastRouter>,
        directory: Arc<dyn Directory>,
    ) -> Self {
        Self {
            registry,
            router,
            directory,
        }
    }

    /// Announce that `user` came online. Call only for the user's first
    /// global connection.
    pub async fn on_connect(&self, user: UserId) {
        info!(user, "user online");
        self.fan_out_status(user, "online").await;
    }

    /// Announce that `user` went offline. Call only after the user's last
    /// global connection is gone.
    pub async fn on_disconnect(&self, user: UserId) {
        info!(user, "user offline");
        self.fan_out_status(user, "offline").await;
    }

    /// Status changes are best-effort: a directory outage degrades the
    /// announcement, never the connection that triggered it.
    async fn fan_out_status(&self, user: UserId, status: &str) {
        let servers = match self.directory.membership_of(user).await {
            Ok(servers) => servers,
            Err(err) => {
                warn!(user, error = %err, "presence fan-out skipped");
                return;
            }
        };
        let payload = format!("{user}: {status}");
        for server in servers {
            self.router.broadcast(ScopeKey::Server(server), &payload);
        }
    }

    /// Members of `server` who currently hold a global connection.
    pub async fn connected_server_users(
        &self,
        server: ServerId,
    ) -> FabricResult<HashSet<UserId>> {
        let members = self.directory.server_members(server).await?;
        let online = self.registry.users_in(ScopeKey::Global);
        Ok(members.intersection(&online).copied().collect())
    }

    /// Whether the user currently counts as online.
    pub fn is_online(&self, user: UserId) -> bool {
        self.registry.user_present(ScopeKey::Global, user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{Role, StaticDirectory};
    use crate::error::{FabricError, FabricResult};
    use crate::registry::ConnectionHandle;
    use crate::rooms::OrderableItem;
    use crate::types::ItemId;
    use async_trait::async_trait;
    use tokio::sync::mpsc;
    use tokio_tungstenite::tungstenite::Message as WsMessage;

    fn fixture() -> (PresenceTracker, Arc<ConnectionRegistry>, Arc<StaticDirectory>) {
        let registry = Arc::new(ConnectionRegistry::new());
        let router = Arc::new(BroadcastRouter::new(registry.clone()));
        let directory = Arc::new(StaticDirectory::new());
        directory.add_server(5, 1, &[], &[10, 11]);
        directory.add_server(6, 1, &[], &[10]);
        let tracker = PresenceTracker::new(registry.clone(), router, directory.clone() as Arc<dyn Directory>);
        (tracker, registry, directory)
    }

    fn watcher(
        registry: &ConnectionRegistry,
        scope: ScopeKey,
        user: UserId,
    ) -> mpsc::Receiver<WsMessage> {
        let (tx, rx) = mpsc::channel(8);
        registry.register(scope, ConnectionHandle::new(user, tx));
        rx
    }

    #[tokio::test]
    async fn status_reaches_every_membership_server() {
        let (tracker, registry, _) = fixture();
        let mut on_five = watcher(&registry, ScopeKey::Server(5), 11);
        let mut on_six = watcher(&registry, ScopeKey::Server(6), 1);

        tracker.on_connect(10).await;

        assert_eq!(on_five.recv().await, Some(WsMessage::Text("10: online".into())));
        assert_eq!(on_six.recv().await, Some(WsMessage::Text("10: online".into())));

        tracker.on_disconnect(10).await;
        assert_eq!(on_five.recv().await, Some(WsMessage::Text("10: offline".into())));
    }

    #[tokio::test]
    async fn roster_intersects_membership_with_global_presence() {
        let (tracker, registry, _) = fixture();
        let _a = watcher(&registry, ScopeKey::Global, 10);
        // User 99 is online but belongs to no server.
        let _b = watcher(&registry, ScopeKey::Global, 99);

        let online = tracker.connected_server_users(5).await.unwrap();
        assert_eq!(online, HashSet::from([10]));
        assert!(tracker.is_online(10));
        assert!(!tracker.is_online(11));
    }

    #[tokio::test]
    async fn unknown_server_roster_is_not_found() {
        let (tracker, _, _) = fixture();
        assert!(matches!(
            tracker.connected_server_users(99).await,
            Err(FabricError::NotFound(_))
        ));
    }

    struct FailingDirectory;

    #[async_trait]
    impl Directory for FailingDirectory {
        async fn membership_of(&self, _user: UserId) -> FabricResult<Vec<ServerId>> {
            Err(FabricError::Directory("store offline".into()))
        }
        async fn server_members(&self, _server: ServerId) -> FabricResult<HashSet<UserId>> {
            Err(FabricError::Directory("store offline".into()))
        }
        async fn owned_servers(&self, _user: UserId) -> FabricResult<Vec<ServerId>> {
            Err(FabricError::Directory("store offline".into()))
        }
        async fn role_of(&self, _server: ServerId, _user: UserId) -> FabricResult<Role> {
            Err(FabricError::Directory("store offline".into()))
        }
        async fn siblings_of(&self, _parent: ItemId) -> FabricResult<Vec<OrderableItem>> {
            Err(FabricError::Directory("store offline".into()))
        }
        async fn persist(&self, _parent: ItemId, _items: &[OrderableItem]) -> FabricResult<()> {
            Err(FabricError::Directory("store offline".into()))
        }
    }

    #[tokio::test]
    async fn directory_outage_does_not_panic_the_announcement() {
        let registry = Arc::new(ConnectionRegistry::new());
        let router = Arc::new(BroadcastRouter::new(registry.clone()));
        let tracker = PresenceTracker::new(registry, router, Arc::new(FailingDirectory));
        tracker.on_connect(10).await;
        tracker.on_disconnect(10).await;
    }
}

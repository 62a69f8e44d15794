//! Shared state wiring.
//!
//! One [`Hub`] is built at startup and handed to every session by `Arc`;
//! nothing in the fabric lives in a global. The registry and router are
//! shared between the coordinators so presence, chat, and call signaling
//! all see the same connection set.

use crate::broadcast::BroadcastRouter;
use crate::call::CallSignalingCoordinator;
use crate::config::LimitsConfig;
use crate::directory::Directory;
use crate::presence::PresenceTracker;
use crate::registry::ConnectionRegistry;
use std::sync::Arc;

pub struct Hub {
    pub registry: Arc<ConnectionRegistry>,
    pub router: Arc<BroadcastRouter>,
    pub presence: PresenceTracker,
    pub calls: CallSignalingCoordinator,
    pub directory: Arc<dyn Directory>,
    pub limits: LimitsConfig,
}

impl Hub {
    pub fn new(directory: Arc<dyn Directory>, limits: LimitsConfig) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let router = Arc::new(BroadcastRouter::new(registry.clone()));
        let presence = PresenceTracker::new(registry.clone(), router.clone(), directory.clone());
        let calls = CallSignalingCoordinator::new(registry.clone(), router.clone());
        Self {
            registry,
            router,
            presence,
            calls,
            directory,
            limits,
        }
    }
}

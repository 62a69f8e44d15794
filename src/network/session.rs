//! Per-connection session lifecycle.
//!
//! One task per connection reads frames and dispatches them by endpoint;
//! a second task drains the bounded outbound queue into the socket so a
//! slow peer never blocks a broadcast. The registry reports first/last
//! per-user scope transitions atomically with registration, so presence
//! announcements fire exactly once per online/offline transition even
//! when a user's connections open or close concurrently.

use crate::hub::Hub;
use crate::metrics;
use crate::network::Endpoint;
use crate::registry::{ConnectionHandle, ScopeKey};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};

pub struct Session {
    endpoint: Endpoint,
    hub: Arc<Hub>,
}

impl Session {
    pub fn new(endpoint: Endpoint, hub: Arc<Hub>) -> Self {
        Self { endpoint, hub }
    }

    /// Drive the session to completion. Returns when the peer closes, the
    /// socket errors, or the fabric drops the connection.
    pub async fn run(self, ws: WebSocketStream<TcpStream>, addr: SocketAddr) {
        let (mut sink, mut stream) = ws.split();
        let (tx, mut rx) = mpsc::channel::<WsMessage>(self.hub.limits.send_queue);
        let handle = ConnectionHandle::new(self.endpoint.user(), tx);
        let connection_id = handle.id;
        let user = self.endpoint.user();
        let scopes = self.endpoint.scopes();

        info!(%addr, endpoint = %self.endpoint, connection = %connection_id, "session opened");
        metrics::session_opened();

        // Writer task: drains the outbound queue into the socket. Ends
        // when the handle is dropped everywhere.
        let writer = tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                if sink.send(frame).await.is_err() {
                    break;
                }
            }
            let _ = sink.close().await;
        });

        // The registry reports first-connection-per-user transitions under
        // its bucket lock, so two tabs opening at once announce once.
        let mut first_global = false;
        for scope in &scopes {
            let first_for_user = self.hub.registry.register(*scope, handle.clone());
            if *scope == ScopeKey::Global && first_for_user {
                first_global = true;
            }
        }
        metrics::set_active_scopes(self.hub.registry.scope_count());
        if first_global {
            self.hub.presence.on_connect(user).await;
        }
        if let Some(room) = self.endpoint.call_room() {
            self.hub.calls.connection_opened(room, user);
        }

        // Read loop.
        while let Some(frame) = stream.next().await {
            match frame {
                Ok(WsMessage::Text(text)) => self.dispatch(&text).await,
                Ok(WsMessage::Binary(data)) => {
                    let text = String::from_utf8_lossy(&data);
                    self.dispatch(&text).await;
                }
                Ok(WsMessage::Ping(payload)) => {
                    if handle.send_frame(WsMessage::Pong(payload)).is_err() {
                        break;
                    }
                }
                Ok(WsMessage::Pong(_)) | Ok(WsMessage::Frame(_)) => {}
                Ok(WsMessage::Close(_)) => {
                    debug!(connection = %connection_id, "peer closed");
                    break;
                }
                Err(e) => {
                    warn!(connection = %connection_id, error = %e, "socket error");
                    break;
                }
            }
            // A broadcaster may have dropped us for backpressure.
            if !self.hub.registry.is_registered(connection_id) {
                break;
            }
        }

        // Teardown. Deregister first so the call cleanup sees the
        // post-departure scope state; the registry reports which scopes
        // the user vacated, so concurrent closes announce offline once.
        let vacated = self.hub.registry.remove_connection(connection_id);
        metrics::set_active_scopes(self.hub.registry.scope_count());
        drop(handle);
        if let Some(room) = self.endpoint.call_room() {
            self.hub.calls.connection_closed(room, user);
        }
        if vacated.contains(&ScopeKey::Global) {
            self.hub.presence.on_disconnect(user).await;
        }

        metrics::session_closed();
        let _ = writer.await;
        info!(%addr, endpoint = %self.endpoint, connection = %connection_id, "session closed");
    }

    /// Route one inbound text frame by endpoint kind.
    async fn dispatch(&self, text: &str) {
        match self.endpoint {
            Endpoint::Main { user } => {
                let payload = format!("Main Server Update for User {user}: {text}");
                self.hub.router.broadcast(ScopeKey::Global, &payload);
            }
            Endpoint::Server { server, .. } => {
                self.hub.router.broadcast(ScopeKey::Server(server), text);
            }
            Endpoint::TextRoom { room, .. } => {
                self.hub.router.broadcast(ScopeKey::Room(room), text);
            }
            Endpoint::CallRoom { room, user } => {
                self.hub.calls.handle_frame(room, user, text);
            }
        }
    }
}

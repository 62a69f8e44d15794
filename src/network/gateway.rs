//! Gateway - WebSocket listener that accepts incoming connections.
//!
//! The Gateway binds one TCP socket and spawns a Session task per client.
//! Endpoint and origin validation both happen inside the upgrade
//! handshake, so a bad path or disallowed origin is rejected with an HTTP
//! status before any session state exists.

use crate::config::ListenConfig;
use crate::hub::Hub;
use crate::network::{Endpoint, Session};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::accept_hdr_async;
use tracing::{error, info, instrument, warn};

pub struct Gateway {
    listener: TcpListener,
    hub: Arc<Hub>,
    allow_origins: Arc<Vec<String>>,
}

impl Gateway {
    /// Bind the gateway to the configured address.
    pub async fn bind(config: &ListenConfig, hub: Arc<Hub>) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(config.address).await?;
        info!(address = %config.address, "WebSocket listener bound");
        Ok(Self {
            listener,
            hub,
            allow_origins: Arc::new(config.allow_origins.clone()),
        })
    }

    /// The actual bound address (tests bind port 0).
    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Run the gateway, accepting connections forever.
    #[instrument(skip(self), name = "gateway")]
    pub async fn run(self) -> anyhow::Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let hub = Arc::clone(&self.hub);
                    let allowed = Arc::clone(&self.allow_origins);
                    tokio::spawn(async move {
                        handle_connection(stream, addr, hub, allowed).await;
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }
}

/// Perform the upgrade handshake, then hand the socket to a Session.
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    hub: Arc<Hub>,
    allowed: Arc<Vec<String>>,
) {
    // The request is only visible inside the handshake callback; the
    // parsed endpoint is smuggled out through this slot.
    let endpoint_slot: Arc<Mutex<Option<Endpoint>>> = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&endpoint_slot);

    let callback = move |req: &http::Request<()>, response: http::Response<()>| {
        // Origin validation. An empty allow list accepts all origins.
        if !allowed.is_empty() {
            let origin = req
                .headers()
                .get("Origin")
                .and_then(|o| o.to_str().ok());
            let permitted = origin
                .map(|o| allowed.iter().any(|a| a == o || a == "*"))
                .unwrap_or(false);
            if !permitted {
                warn!(%addr, origin = origin.unwrap_or("<none>"), "handshake origin rejected");
                return Err(reject(http::StatusCode::FORBIDDEN, "origin not allowed"));
            }
        }

        match Endpoint::parse(req.uri().path()) {
            Some(endpoint) => {
                if let Ok(mut guard) = slot.lock() {
                    *guard = Some(endpoint);
                }
                Ok(response)
            }
            None => {
                warn!(%addr, path = req.uri().path(), "handshake path rejected");
                Err(reject(http::StatusCode::NOT_FOUND, "unknown endpoint"))
            }
        }
    };

    match accept_hdr_async(stream, callback).await {
        Ok(ws_stream) => {
            let endpoint = endpoint_slot.lock().ok().and_then(|guard| *guard);
            let Some(endpoint) = endpoint else {
                warn!(%addr, "handshake completed without an endpoint");
                return;
            };
            Session::new(endpoint, hub).run(ws_stream, addr).await;
        }
        Err(e) => {
            warn!(%addr, error = %e, "WebSocket handshake failed");
        }
    }
}

fn reject(status: http::StatusCode, body: &str) -> http::Response<Option<String>> {
    http::Response::builder()
        .status(status)
        .body(Some(body.to_string()))
        .unwrap_or_default()
}

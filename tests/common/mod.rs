//! Integration test common infrastructure.
//!
//! Spawns an in-process campusd gateway on an ephemeral port and provides
//! a WebSocket test client for asserting on frame flows. Running
//! in-process keeps the hub inspectable, so tests can assert on call and
//! presence state directly instead of inferring it from the wire.

use campusd::config::{LimitsConfig, ListenConfig};
use campusd::directory::StaticDirectory;
use campusd::hub::Hub;
use campusd::network::Gateway;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

/// An in-process test server.
pub struct TestServer {
    pub hub: Arc<Hub>,
    addr: std::net::SocketAddr,
}

impl TestServer {
    /// Start a gateway on an ephemeral port with a fixed roster:
    /// server 5 owned by user 1, staff user 2, members 10 and 11.
    pub async fn spawn() -> anyhow::Result<Self> {
        let directory = Arc::new(StaticDirectory::new());
        directory.add_server(5, 1, &[2], &[10, 11]);
        directory.add_server(6, 1, &[], &[10]);

        let hub = Arc::new(Hub::new(directory, LimitsConfig::default()));
        let listen = ListenConfig {
            address: "127.0.0.1:0".parse()?,
            allow_origins: Vec::new(),
        };
        let gateway = Gateway::bind(&listen, hub.clone()).await?;
        let addr = gateway.local_addr()?;
        tokio::spawn(gateway.run());

        Ok(Self { hub, addr })
    }

    pub fn url(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }
}

/// A WebSocket test client.
pub struct TestClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl TestClient {
    pub async fn connect(server: &TestServer, path: &str) -> anyhow::Result<Self> {
        let (ws, _) = connect_async(server.url(path)).await?;
        Ok(Self { ws })
    }

    pub async fn send_text(&mut self, text: &str) -> anyhow::Result<()> {
        self.ws.send(WsMessage::Text(text.to_string())).await?;
        Ok(())
    }

    /// Receive the next text frame, skipping control frames.
    pub async fn recv_text(&mut self) -> anyhow::Result<String> {
        loop {
            let frame = timeout(Duration::from_secs(5), self.ws.next())
                .await?
                .ok_or_else(|| anyhow::anyhow!("connection closed"))??;
            match frame {
                WsMessage::Text(text) => return Ok(text),
                WsMessage::Ping(_) | WsMessage::Pong(_) => continue,
                other => anyhow::bail!("unexpected frame: {other:?}"),
            }
        }
    }

    /// Receive text frames until the predicate matches, returning the
    /// matching frame. Frames before the match are discarded.
    pub async fn recv_until<F>(&mut self, mut predicate: F) -> anyhow::Result<String>
    where
        F: FnMut(&str) -> bool,
    {
        loop {
            let text = self.recv_text().await?;
            if predicate(&text) {
                return Ok(text);
            }
        }
    }

    pub async fn close(mut self) -> anyhow::Result<()> {
        self.ws.close(None).await?;
        Ok(())
    }
}

/// Yield until the condition holds or two seconds pass.
pub async fn wait_for<F>(mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

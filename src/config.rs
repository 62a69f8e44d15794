//! Configuration loading.
//!
//! A single TOML file with `[server]`, `[listen]`, `[limits]`, and an
//! optional `[directory]` section holding static server memberships for
//! standalone operation (the deployed platform wires its own directory).

use crate::types::{ServerId, UserId};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub listen: ListenConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub directory: DirectoryConfig,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

/// Daemon identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Instance name (e.g., "campus.local").
    pub name: String,
    /// Prometheus metrics HTTP port (default: 9420). 0 disables the
    /// endpoint (used by tests).
    pub metrics_port: Option<u16>,
}

/// WebSocket listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ListenConfig {
    /// Bind address for the WebSocket listener.
    pub address: SocketAddr,
    /// Allowed `Origin` header values for the upgrade handshake.
    /// Empty means all origins are accepted.
    #[serde(default)]
    pub allow_origins: Vec<String>,
}

/// Per-connection resource limits.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Outbound frames buffered per connection. A connection whose queue
    /// fills is treated as dead and deregistered rather than stalling the
    /// rest of a fan-out.
    #[serde(default = "default_send_queue")]
    pub send_queue: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            send_queue: default_send_queue(),
        }
    }
}

fn default_send_queue() -> usize {
    128
}

/// Static directory contents for standalone operation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DirectoryConfig {
    #[serde(default)]
    pub servers: Vec<ServerBlock>,
}

/// One community server's membership roster.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerBlock {
    pub id: ServerId,
    pub owner: UserId,
    #[serde(default)]
    pub staff: Vec<UserId>,
    #[serde(default)]
    pub members: Vec<UserId>,
}

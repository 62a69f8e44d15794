//! Unified error handling for campusd.
//!
//! One central hierarchy with a static code per variant for metric
//! labeling. Per-connection send failures are isolated by the router and
//! never reach callers of `broadcast`; signaling events that disagree with
//! current call state (a `left_call` for a user not in voice) are no-ops by
//! contract rather than error values, because disconnect races make them
//! common.

use crate::types::{ConnectionId, ItemId};
use thiserror::Error;

/// Errors surfaced by the fabric.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FabricError {
    /// A scope, room, or parent the caller named does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A structural move named a destination parent that does not exist.
    /// The whole reindex is aborted before any write.
    #[error("target parent {0} does not exist")]
    Conflict(ItemId),

    /// A single connection's send failed. Only that connection degrades;
    /// it is deregistered rather than retried.
    #[error("send failed for connection {0}")]
    Transient(ConnectionId),

    /// The external directory collaborator failed a lookup or write.
    #[error("directory error: {0}")]
    Directory(String),
}

impl FabricError {
    /// Static error code for metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::Transient(_) => "transient",
            Self::Directory(_) => "directory",
        }
    }
}

/// Result type used throughout the fabric.
pub type FabricResult<T> = Result<T, FabricError>;

//! campusd - realtime presence and broadcast fabric for the Campus
//! classroom platform.
//!
//! The surrounding application (servers, rooms, messages, assignments) is a
//! conventional CRUD system and lives elsewhere; this crate is the part
//! with actual concurrency: WebSocket sessions scoped to overlapping
//! broadcast groups, derived presence, per-call signaling state, and the
//! ordered sibling reindexer the room UI depends on.

pub mod access;
pub mod broadcast;
pub mod call;
pub mod config;
pub mod directory;
pub mod error;
pub mod http;
pub mod hub;
pub mod metrics;
pub mod network;
pub mod presence;
pub mod registry;
pub mod rooms;
pub mod types;

//! Shared identifier types.
//!
//! The relational store owns these ids; the fabric only routes by them.

/// A platform user id.
pub type UserId = i64;

/// A community server id.
pub type ServerId = i64;

/// A room id (text or call; the scope key disambiguates).
pub type RoomId = i64;

/// An orderable item id (room or category).
pub type ItemId = i64;

/// Process-unique id for one live connection.
pub type ConnectionId = uuid::Uuid;

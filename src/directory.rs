//! Directory collaborator.
//!
//! The fabric never reaches into the relational store directly; everything
//! it needs to know about servers, memberships, roles, and sibling lists
//! comes through the [`Directory`] trait. Production wires a database-backed
//! implementation; standalone operation and tests use [`StaticDirectory`]
//! populated from the config file.

use crate::config::DirectoryConfig;
use crate::error::{FabricError, FabricResult};
use crate::rooms::OrderableItem;
use crate::types::{ItemId, ServerId, UserId};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashSet;

/// A user's standing within one community server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Member,
    Elevated,
    Owner,
}

impl Role {
    /// Owners and staff see everything in restricted rooms.
    pub fn is_elevated(&self) -> bool {
        matches!(self, Self::Elevated | Self::Owner)
    }
}

/// Lookups and writes the fabric delegates to the platform's store.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Server ids the user belongs to (as owner or member).
    async fn membership_of(&self, user: UserId) -> FabricResult<Vec<ServerId>>;

    /// All user ids belonging to a server, owner included.
    async fn server_members(&self, server: ServerId) -> FabricResult<HashSet<UserId>>;

    /// Server ids the user owns.
    async fn owned_servers(&self, user: UserId) -> FabricResult<Vec<ServerId>>;

    /// The user's role within a server. `Member` for non-members too; the
    /// fabric only cares about elevation.
    async fn role_of(&self, server: ServerId, user: UserId) -> FabricResult<Role>;

    /// Ordered siblings under a parent container. `Err(NotFound)` if the
    /// parent itself does not exist; an existing but empty parent returns
    /// an empty list.
    async fn siblings_of(&self, parent: ItemId) -> FabricResult<Vec<OrderableItem>>;

    /// Persist a fully reindexed sibling list under `parent`. The parent
    /// id travels separately because the list may be empty.
    async fn persist(&self, parent: ItemId, items: &[OrderableItem]) -> FabricResult<()>;
}

#[derive(Debug, Clone)]
struct ServerRecord {
    owner: UserId,
    staff: HashSet<UserId>,
    members: HashSet<UserId>,
}

/// In-memory directory for standalone operation and tests.
#[derive(Default)]
pub struct StaticDirectory {
    servers: DashMap<ServerId, ServerRecord>,
    items: DashMap<ItemId, Vec<OrderableItem>>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &DirectoryConfig) -> Self {
        let directory = Self::new();
        for block in &config.servers {
            directory.servers.insert(
                block.id,
                ServerRecord {
                    owner: block.owner,
                    staff: block.staff.iter().copied().collect(),
                    members: block.members.iter().copied().collect(),
                },
            );
        }
        directory
    }

    pub fn add_server(
        &self,
        id: ServerId,
        owner: UserId,
        staff: &[UserId],
        members: &[UserId],
    ) {
        self.servers.insert(
            id,
            ServerRecord {
                owner,
                staff: staff.iter().copied().collect(),
                members: members.iter().copied().collect(),
            },
        );
    }

    /// Seed (or replace) the sibling list under a parent.
    pub fn set_siblings(&self, parent: ItemId, items: Vec<OrderableItem>) {
        self.items.insert(parent, items);
    }

    pub fn siblings_snapshot(&self, parent: ItemId) -> Vec<OrderableItem> {
        self.items.get(&parent).map(|v| v.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Directory for StaticDirectory {
    async fn membership_of(&self, user: UserId) -> FabricResult<Vec<ServerId>> {
        let mut servers: Vec<ServerId> = self
            .servers
            .iter()
            .filter(|entry| {
                let record = entry.value();
                record.owner == user
                    || record.staff.contains(&user)
                    || record.members.contains(&user)
            })
            .map(|entry| *entry.key())
            .collect();
        servers.sort_unstable();
        Ok(servers)
    }

    async fn server_members(&self, server: ServerId) -> FabricResult<HashSet<UserId>> {
        let record = self
            .servers
            .get(&server)
            .ok_or_else(|| FabricError::NotFound(format!("server {server}")))?;
        let mut members = record.members.clone();
        members.extend(record.staff.iter().copied());
        members.insert(record.owner);
        Ok(members)
    }

    async fn owned_servers(&self, user: UserId) -> FabricResult<Vec<ServerId>> {
        let mut servers: Vec<ServerId> = self
            .servers
            .iter()
            .filter(|entry| entry.value().owner == user)
            .map(|entry| *entry.key())
            .collect();
        servers.sort_unstable();
        Ok(servers)
    }

    async fn role_of(&self, server: ServerId, user: UserId) -> FabricResult<Role> {
        let record = self
            .servers
            .get(&server)
            .ok_or_else(|| FabricError::NotFound(format!("server {server}")))?;
        if record.owner == user {
            Ok(Role::Owner)
        } else if record.staff.contains(&user) {
            Ok(Role::Elevated)
        } else {
            Ok(Role::Member)
        }
    }

    async fn siblings_of(&self, parent: ItemId) -> FabricResult<Vec<OrderableItem>> {
        self.items
            .get(&parent)
            .map(|v| v.clone())
            .ok_or_else(|| FabricError::NotFound(format!("parent {parent}")))
    }

    async fn persist(&self, parent: ItemId, items: &[OrderableItem]) -> FabricResult<()> {
        self.items.insert(parent, items.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn membership_includes_owner_staff_and_members() {
        let directory = StaticDirectory::new();
        directory.add_server(5, 1, &[2], &[10, 11]);
        directory.add_server(6, 2, &[], &[10]);

        assert_eq!(directory.membership_of(10).await.unwrap(), vec![5, 6]);
        assert_eq!(directory.membership_of(1).await.unwrap(), vec![5]);
        assert_eq!(directory.membership_of(2).await.unwrap(), vec![5, 6]);
        assert!(directory.membership_of(99).await.unwrap().is_empty());

        assert_eq!(directory.owned_servers(1).await.unwrap(), vec![5]);
        assert_eq!(directory.owned_servers(2).await.unwrap(), vec![6]);
        assert!(directory.owned_servers(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn roles_reflect_the_roster() {
        let directory = StaticDirectory::new();
        directory.add_server(5, 1, &[2], &[10]);

        assert_eq!(directory.role_of(5, 1).await.unwrap(), Role::Owner);
        assert_eq!(directory.role_of(5, 2).await.unwrap(), Role::Elevated);
        assert_eq!(directory.role_of(5, 10).await.unwrap(), Role::Member);
        assert!(directory.role_of(6, 1).await.is_err());

        let members = directory.server_members(5).await.unwrap();
        assert_eq!(members, HashSet::from([1, 2, 10]));
    }

    #[tokio::test]
    async fn missing_parent_is_not_found() {
        let directory = StaticDirectory::new();
        assert!(matches!(
            directory.siblings_of(42).await,
            Err(FabricError::NotFound(_))
        ));

        directory.set_siblings(42, Vec::new());
        assert!(directory.siblings_of(42).await.unwrap().is_empty());
    }
}

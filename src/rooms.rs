//! Ordered sibling maintenance for rooms and categories.
//!
//! Rooms live either directly under a server or inside a category, and the
//! UI renders each sibling list by a dense `position` column. Every move
//! runs through [`move_item`], which rebuilds the affected list(s) with
//! contiguous positions starting at zero. The reindex itself is pure; the
//! surrounding function does the directory round-trips and validates the
//! destination before anything is written.

use crate::directory::Directory;
use crate::error::{FabricError, FabricResult};
use crate::types::ItemId;
use tracing::info;

/// One entry in an ordered sibling list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderableItem {
    pub id: ItemId,
    /// `None` for items sitting directly under the server root.
    pub parent_id: Option<ItemId>,
    pub position: usize,
}

impl OrderableItem {
    pub fn new(id: ItemId, parent_id: Option<ItemId>, position: usize) -> Self {
        Self {
            id,
            parent_id,
            position,
        }
    }
}

/// The two (or one) fully reindexed lists produced by a move.
#[derive(Debug, Clone)]
pub struct MoveOutcome {
    /// The source parent's list after removal, `None` when the move stayed
    /// within one parent.
    pub source: Option<Vec<OrderableItem>>,
    /// The destination parent's list with the item inserted.
    pub destination: Vec<OrderableItem>,
    /// The moved item as it now appears in the destination.
    pub item: OrderableItem,
}

/// Insert `moved` into `siblings` at `target_index` and renumber.
///
/// `siblings` is the destination list, which may still contain a stale copy
/// of the moved item (same-parent reorder); it is removed first so the
/// index refers to the list without it. An out-of-range index clamps to
/// append.
pub fn reconcile(
    mut siblings: Vec<OrderableItem>,
    mut moved: OrderableItem,
    target_index: usize,
) -> Vec<OrderableItem> {
    siblings.retain(|item| item.id != moved.id);
    siblings.sort_by_key(|item| item.position);

    let index = target_index.min(siblings.len());
    moved.position = index;
    siblings.insert(index, moved);

    for (position, item) in siblings.iter_mut().enumerate() {
        item.position = position;
    }
    siblings
}

/// Renumber a list after an item left it.
pub fn reindex_after_removal(
    mut siblings: Vec<OrderableItem>,
    removed: ItemId,
) -> Vec<OrderableItem> {
    siblings.retain(|item| item.id != removed);
    siblings.sort_by_key(|item| item.position);
    for (position, item) in siblings.iter_mut().enumerate() {
        item.position = position;
    }
    siblings
}

/// Move an item to `new_parent` at `target_index`, persisting the
/// reindexed sibling lists through the directory.
///
/// The destination parent is resolved before any write; a missing
/// destination aborts the whole move with `Conflict` and leaves the source
/// list untouched. Sentinel parent id 0 is treated as "under the server
/// root" and stored as `None`.
pub async fn move_item<D: Directory + ?Sized>(
    directory: &D,
    item: OrderableItem,
    new_parent: Option<ItemId>,
    target_index: usize,
) -> FabricResult<MoveOutcome> {
    let new_parent = new_parent.filter(|id| *id != 0);
    let source_parent = item.parent_id;

    let destination_key = parent_key(new_parent);
    let destination_siblings = match directory.siblings_of(destination_key).await {
        Ok(siblings) => siblings,
        Err(FabricError::NotFound(_)) => return Err(FabricError::Conflict(destination_key)),
        Err(other) => return Err(other),
    };

    let moved = OrderableItem::new(item.id, new_parent, target_index);
    let destination = reconcile(destination_siblings, moved, target_index);
    let placed = destination
        .iter()
        .find(|entry| entry.id == item.id)
        .cloned()
        .ok_or_else(|| FabricError::NotFound(format!("item {}", item.id)))?;

    // All reads happen before any write, and the destination is persisted
    // first: a failure between the two writes leaves the item duplicated
    // in the stale source list, never orphaned from both.
    let source = if source_parent != new_parent {
        let source_key = parent_key(source_parent);
        let source_siblings = directory.siblings_of(source_key).await?;
        Some((source_key, reindex_after_removal(source_siblings, item.id)))
    } else {
        None
    };

    directory.persist(destination_key, &destination).await?;
    let source = match source {
        Some((source_key, reindexed)) => {
            directory.persist(source_key, &reindexed).await?;
            Some(reindexed)
        }
        None => None,
    };
    info!(
        item = item.id,
        parent = destination_key,
        position = placed.position,
        "item moved"
    );

    Ok(MoveOutcome {
        source,
        destination,
        item: placed,
    })
}

/// Detach an item from its category, leaving it under the server root.
pub async fn uncategorize<D: Directory + ?Sized>(
    directory: &D,
    item: OrderableItem,
    target_index: usize,
) -> FabricResult<MoveOutcome> {
    move_item(directory, item, None, target_index).await
}

fn parent_key(parent: Option<ItemId>) -> ItemId {
    parent.unwrap_or(0)
}

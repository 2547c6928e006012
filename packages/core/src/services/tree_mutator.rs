//! Tree Mutator - Structural Mutations on the Forest
//!
//! This module implements every structural change to the forest as an
//! interval rewrite over a `NodeStore`:
//!
//! - `insert_root` / `insert_child` - open a width-2 gap and splice a row in
//! - `move_before` / `move_after` / `move_inside` / `make_root` - relocate a
//!   node with its whole subtree
//! - `delete_subtree` - remove a subtree and close the gap
//! - `rebuild` / `verify` - recompute or check one tree's encoding
//!
//! # Units of Work
//!
//! Each public call opens one transaction, runs a bounded sequence of bulk
//! updates in it and commits. Any error rolls the transaction back, so a
//! failed call leaves the store exactly as it found it.
//!
//! # Moves
//!
//! A move runs as:
//!
//! 1. **Park**: shift the moving unit to negative positions so later range
//!    filters cannot match it
//! 2. **Detach**: close the gap it left in the source tree
//! 3. **Widen**: open a gap of the same width at the destination
//! 4. **Relabel**: one affine shift of the parked unit into the gap, with
//!    level offset and destination tree id
//! 5. **Reparent**: point the moved node at its new parent
//!
//! Moving to the top level additionally shifts sequential tree ids to make
//! room between existing trees.
//!
//! # Maintenance Disabled
//!
//! With `MaintenanceContext::disabled()` no interval arithmetic runs. Inserts
//! write placeholder rows, moves rewrite `parent_id` and `tree_id` only, and
//! deletes follow parent pointers. Call `rebuild` afterwards.
//!
//! # Examples
//!
//! ```rust
//! use nodeforest_core::db::MemoryNodeStore;
//! use nodeforest_core::services::{MaintenanceContext, SequentialTreeIds, TreeMutator};
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mutator = TreeMutator::new(Arc::new(MemoryNodeStore::new()), Arc::new(SequentialTreeIds));
//! let ctx = MaintenanceContext::enabled();
//!
//! let root = mutator.insert_root(ctx, 1, None).await?;
//! let child = mutator.insert_child(ctx, 2, root).await?;
//! mutator.delete_subtree(ctx, child).await?;
//! # Ok(())
//! # }
//! ```

use crate::db::{ColumnUpdate, Condition, IntColumn, NodeFilter, NodeStore, NodeTransaction};
use crate::models::{NewNode, NodeId, TreeId, TreeNode, ROOT_LEVEL};
use crate::services::error::ForestError;
use crate::services::integrity::verify_tree;
use crate::services::maintenance::MaintenanceContext;
use crate::services::rebuild::{RebuildEngine, RebuildReport};
use crate::services::tree_ids::TreeIdAllocator;
use std::collections::HashSet;
use std::sync::Arc;

/// Where a new top-level tree goes relative to existing trees
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TreeSlot {
    Before(TreeId),
    After(TreeId),
    Append,
}

/// Resolved target of a move
#[derive(Debug, Clone)]
enum Destination {
    FirstChildOf(TreeNode),
    After(TreeNode),
    NewTree(TreeSlot),
}

impl Destination {
    fn parent_id(&self) -> Option<NodeId> {
        match self {
            Destination::FirstChildOf(parent) => Some(parent.id),
            Destination::After(sibling) => sibling.parent_id,
            Destination::NewTree(_) => None,
        }
    }

    /// Node whose position anchors the destination
    fn anchor(&self) -> Option<&TreeNode> {
        match self {
            Destination::FirstChildOf(node) | Destination::After(node) => Some(node),
            Destination::NewTree(_) => None,
        }
    }
}

/// Commit on success, roll back on failure
async fn finish<T>(
    mut tx: Box<dyn NodeTransaction>,
    result: Result<T, ForestError>,
) -> Result<T, ForestError> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback_err) = tx.rollback().await {
                tracing::warn!("Rollback failed after '{}': {}", e, rollback_err);
            }
            Err(e)
        }
    }
}

async fn load(tx: &mut dyn NodeTransaction, id: NodeId) -> Result<TreeNode, ForestError> {
    tx.get(id).await?.ok_or_else(|| ForestError::not_found(id))
}

/// Maintained mutations only build on rows with a well-formed interval
fn ensure_interval(node: &TreeNode) -> Result<(), ForestError> {
    if node.has_valid_interval() {
        return Ok(());
    }
    Err(ForestError::invalid_state(format!(
        "node {} in tree {} has interval ({}, {}); rebuild the tree first",
        node.id, node.tree_id, node.left, node.right
    )))
}

/// Structural mutations over a shared `NodeStore`
#[derive(Clone)]
pub struct TreeMutator {
    store: Arc<dyn NodeStore>,
    allocator: Arc<dyn TreeIdAllocator>,
    rebuild_engine: RebuildEngine,
}

impl TreeMutator {
    pub fn new(store: Arc<dyn NodeStore>, allocator: Arc<dyn TreeIdAllocator>) -> Self {
        Self {
            store,
            allocator,
            rebuild_engine: RebuildEngine::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn NodeStore> {
        &self.store
    }

    /// Insert the root of a tree
    ///
    /// Without `tree_id` a fresh id is allocated. With maintenance enabled,
    /// naming a tree that already holds nodes fails with `TreeExists`.
    pub async fn insert_root(
        &self,
        ctx: MaintenanceContext,
        payload_id: i64,
        tree_id: Option<TreeId>,
    ) -> Result<NodeId, ForestError> {
        let mut tx = self.store.begin().await?;
        let result = self
            .insert_root_in(tx.as_mut(), ctx, payload_id, tree_id)
            .await;
        finish(tx, result).await
    }

    async fn insert_root_in(
        &self,
        tx: &mut dyn NodeTransaction,
        ctx: MaintenanceContext,
        payload_id: i64,
        tree_id: Option<TreeId>,
    ) -> Result<NodeId, ForestError> {
        let tree_id = match tree_id {
            Some(tree_id) => tree_id,
            None => self.allocator.next_tree_id(tx).await?,
        };

        let row = if ctx.is_enabled() {
            if tx.max_right(tree_id).await?.is_some() {
                return Err(ForestError::TreeExists { tree_id });
            }
            NewNode::root(payload_id, tree_id)
        } else {
            NewNode::placeholder(payload_id, tree_id, None)
        };

        let id = tx.insert(row).await?;
        tracing::debug!("Inserted root {} of tree {}", id, tree_id);
        Ok(id)
    }

    /// Insert a node as the last child of `parent_id`
    pub async fn insert_child(
        &self,
        ctx: MaintenanceContext,
        payload_id: i64,
        parent_id: NodeId,
    ) -> Result<NodeId, ForestError> {
        let mut tx = self.store.begin().await?;
        let result = self
            .insert_child_in(tx.as_mut(), ctx, payload_id, parent_id)
            .await;
        finish(tx, result).await
    }

    async fn insert_child_in(
        &self,
        tx: &mut dyn NodeTransaction,
        ctx: MaintenanceContext,
        payload_id: i64,
        parent_id: NodeId,
    ) -> Result<NodeId, ForestError> {
        let parent = load(tx, parent_id).await?;

        if !ctx.is_enabled() {
            let id = tx
                .insert(NewNode::placeholder(payload_id, parent.tree_id, Some(parent.id)))
                .await?;
            tracing::debug!("Inserted placeholder {} under {}", id, parent.id);
            return Ok(id);
        }
        ensure_interval(&parent)?;

        let at = parent.right;
        let widened = tx
            .bulk_update(
                &NodeFilter::in_tree(parent.tree_id).with(Condition::ge(IntColumn::Right, at)),
                &[
                    ColumnUpdate::Shift {
                        column: IntColumn::Right,
                        delta: 2,
                    },
                    ColumnUpdate::ShiftWhen {
                        column: IntColumn::Left,
                        delta: 2,
                        when: Condition::gt(IntColumn::Left, at),
                    },
                ],
            )
            .await?;
        if widened == 0 {
            return Err(ForestError::concurrent_modification(
                format!("widen under {}", parent.id),
                1,
                0,
            ));
        }

        let id = tx
            .insert(NewNode {
                parent_id: Some(parent.id),
                tree_id: parent.tree_id,
                level: parent.level + 1,
                left: at,
                right: at + 1,
                payload_id,
            })
            .await?;

        tracing::debug!(
            "Inserted {} under {} at ({}, {}) in tree {}",
            id,
            parent.id,
            at,
            at + 1,
            parent.tree_id
        );
        Ok(id)
    }

    /// Move `node_id` with its subtree to just before `target_id`
    ///
    /// When `target_id` is a root the subtree becomes a new tree ordered
    /// immediately before the target's tree.
    ///
    /// With maintenance disabled only parent pointers and tree ids change.
    /// Reordering two siblings of the same parent then writes nothing: the
    /// next `rebuild` orders siblings by their current `left`, then `id`.
    pub async fn move_before(
        &self,
        ctx: MaintenanceContext,
        node_id: NodeId,
        target_id: NodeId,
    ) -> Result<(), ForestError> {
        let mut tx = self.store.begin().await?;
        let result = self.move_before_in(tx.as_mut(), ctx, node_id, target_id).await;
        finish(tx, result).await
    }

    async fn move_before_in(
        &self,
        tx: &mut dyn NodeTransaction,
        ctx: MaintenanceContext,
        node_id: NodeId,
        target_id: NodeId,
    ) -> Result<(), ForestError> {
        let node = load(tx, node_id).await?;
        let target = load(tx, target_id).await?;
        if node.id == target.id {
            return Ok(());
        }
        if ctx.is_enabled() {
            ensure_interval(&target)?;
        }

        let destination = match target.parent_id {
            None => Destination::NewTree(TreeSlot::Before(target.tree_id)),
            Some(parent_id) => {
                let siblings = tx.children(parent_id).await?;
                match siblings.into_iter().find(|s| s.right == target.left - 1) {
                    Some(preceding) if preceding.id == node.id => return Ok(()),
                    Some(preceding) => Destination::After(preceding),
                    None => Destination::FirstChildOf(load(tx, parent_id).await?),
                }
            }
        };

        self.relocate(tx, ctx, node, destination, target.id).await
    }

    /// Move `node_id` with its subtree to just after `target_id`
    ///
    /// When `target_id` is a root the subtree becomes a new tree ordered
    /// immediately after the target's tree.
    ///
    /// With maintenance disabled a reorder among siblings of the same parent
    /// writes nothing; see `move_before`.
    pub async fn move_after(
        &self,
        ctx: MaintenanceContext,
        node_id: NodeId,
        target_id: NodeId,
    ) -> Result<(), ForestError> {
        let mut tx = self.store.begin().await?;
        let result = self.move_after_in(tx.as_mut(), ctx, node_id, target_id).await;
        finish(tx, result).await
    }

    async fn move_after_in(
        &self,
        tx: &mut dyn NodeTransaction,
        ctx: MaintenanceContext,
        node_id: NodeId,
        target_id: NodeId,
    ) -> Result<(), ForestError> {
        let node = load(tx, node_id).await?;
        let target = load(tx, target_id).await?;
        if node.id == target.id {
            return Ok(());
        }
        if ctx.is_enabled() {
            ensure_interval(&target)?;
        }

        let destination = if target.is_root() {
            Destination::NewTree(TreeSlot::After(target.tree_id))
        } else {
            Destination::After(target.clone())
        };

        self.relocate(tx, ctx, node, destination, target.id).await
    }

    /// Move `node_id` with its subtree to become the first child of `parent_id`
    ///
    /// Moving a node into its current parent is a no-op.
    pub async fn move_inside(
        &self,
        ctx: MaintenanceContext,
        node_id: NodeId,
        parent_id: NodeId,
    ) -> Result<(), ForestError> {
        let mut tx = self.store.begin().await?;
        let result = self.move_inside_in(tx.as_mut(), ctx, node_id, parent_id).await;
        finish(tx, result).await
    }

    async fn move_inside_in(
        &self,
        tx: &mut dyn NodeTransaction,
        ctx: MaintenanceContext,
        node_id: NodeId,
        parent_id: NodeId,
    ) -> Result<(), ForestError> {
        let node = load(tx, node_id).await?;
        let parent = load(tx, parent_id).await?;
        if node.parent_id == Some(parent.id) {
            return Ok(());
        }

        self.relocate(tx, ctx, node, Destination::FirstChildOf(parent), parent_id)
            .await
    }

    /// Detach `node_id` with its subtree into a new tree after all existing trees
    ///
    /// A node that already is a root stays where it is.
    pub async fn make_root(
        &self,
        ctx: MaintenanceContext,
        node_id: NodeId,
    ) -> Result<(), ForestError> {
        let mut tx = self.store.begin().await?;
        let result = self.make_root_in(tx.as_mut(), ctx, node_id).await;
        finish(tx, result).await
    }

    async fn make_root_in(
        &self,
        tx: &mut dyn NodeTransaction,
        ctx: MaintenanceContext,
        node_id: NodeId,
    ) -> Result<(), ForestError> {
        let node = load(tx, node_id).await?;
        if node.is_root() {
            return Ok(());
        }
        self.relocate(tx, ctx, node, Destination::NewTree(TreeSlot::Append), node_id)
            .await
    }

    /// Whether `destination` is exactly where `node` already sits
    fn is_current_slot(node: &TreeNode, destination: &Destination) -> bool {
        match destination {
            Destination::FirstChildOf(parent) => {
                node.parent_id == Some(parent.id) && node.left == parent.left + 1
            }
            Destination::After(sibling) => {
                node.tree_id == sibling.tree_id
                    && node.parent_id == sibling.parent_id
                    && node.left == sibling.right + 1
            }
            Destination::NewTree(TreeSlot::Before(tree_id)) => match (node.tree_id, tree_id) {
                (TreeId::Sequential(own), TreeId::Sequential(next)) => {
                    node.is_root() && own + 1 == *next
                }
                _ => false,
            },
            Destination::NewTree(TreeSlot::After(tree_id)) => match (node.tree_id, tree_id) {
                (TreeId::Sequential(own), TreeId::Sequential(prev)) => {
                    node.is_root() && own == *prev + 1
                }
                _ => false,
            },
            Destination::NewTree(TreeSlot::Append) => node.is_root(),
        }
    }

    async fn relocate(
        &self,
        tx: &mut dyn NodeTransaction,
        ctx: MaintenanceContext,
        node: TreeNode,
        destination: Destination,
        target_id: NodeId,
    ) -> Result<(), ForestError> {
        if let Destination::NewTree(TreeSlot::Before(_) | TreeSlot::After(_)) = destination {
            if !self.allocator.supports_reordering() {
                return Err(ForestError::unsupported(format!(
                    "positioning node {} as a new tree next to another requires sequential tree ids",
                    node.id
                )));
            }
        }

        if !ctx.is_enabled() {
            return self.relocate_unmaintained(tx, node, destination, target_id).await;
        }

        ensure_interval(&node)?;
        if let Some(anchor) = destination.anchor() {
            ensure_interval(anchor)?;
        }
        if Self::is_current_slot(&node, &destination) {
            tracing::debug!("Move of {} resolves to its current slot", node.id);
            return Ok(());
        }
        if let Some(anchor) = destination.anchor() {
            if node.contains(anchor) {
                return Err(ForestError::cycle_detected(node.id, target_id));
            }
        }

        let source_tree = node.tree_id;
        let (l, r, w) = (node.left, node.right, node.width());
        let unit_size = node.subtree_size() as u64;

        // Capture
        let unit = tx.scan(source_tree, l..=r).await?;
        if unit.len() as u64 != unit_size || unit.iter().any(|n| n.right > r) {
            return Err(ForestError::invalid_state(format!(
                "subtree of node {} spans ({}, {}) but holds {} nodes",
                node.id,
                l,
                r,
                unit.len()
            )));
        }

        // Park
        let parked = tx
            .bulk_update(
                &NodeFilter::in_tree(source_tree)
                    .with(Condition::ge(IntColumn::Left, l))
                    .with(Condition::le(IntColumn::Right, r)),
                &[
                    ColumnUpdate::Shift {
                        column: IntColumn::Left,
                        delta: -(r + 1),
                    },
                    ColumnUpdate::Shift {
                        column: IntColumn::Right,
                        delta: -(r + 1),
                    },
                ],
            )
            .await?;
        if parked != unit_size {
            return Err(ForestError::concurrent_modification(
                format!("park subtree of {}", node.id),
                unit_size,
                parked,
            ));
        }

        // Detach
        tx.bulk_update(
            &NodeFilter::in_tree(source_tree).with(Condition::gt(IntColumn::Right, r)),
            &[
                ColumnUpdate::Shift {
                    column: IntColumn::Right,
                    delta: -w,
                },
                ColumnUpdate::ShiftWhen {
                    column: IntColumn::Left,
                    delta: -w,
                    when: Condition::gt(IntColumn::Left, r),
                },
            ],
        )
        .await?;

        // Resolve the insertion point against the detached state
        let (dest_tree, at, dest_level, new_parent) = match &destination {
            Destination::FirstChildOf(parent) => {
                let parent = load(tx, parent.id).await?;
                (parent.tree_id, parent.left + 1, parent.level + 1, Some(parent.id))
            }
            Destination::After(sibling) => {
                let sibling = load(tx, sibling.id).await?;
                (
                    sibling.tree_id,
                    sibling.right + 1,
                    sibling.level,
                    sibling.parent_id,
                )
            }
            Destination::NewTree(slot) => {
                let tree_id = self.open_tree_slot(tx, *slot).await?;
                (tree_id, 1, ROOT_LEVEL, None)
            }
        };

        // Widen
        if new_parent.is_some() {
            tx.bulk_update(
                &NodeFilter::in_tree(dest_tree).with(Condition::ge(IntColumn::Right, at)),
                &[
                    ColumnUpdate::Shift {
                        column: IntColumn::Right,
                        delta: w,
                    },
                    ColumnUpdate::ShiftWhen {
                        column: IntColumn::Left,
                        delta: w,
                        when: Condition::ge(IntColumn::Left, at),
                    },
                ],
            )
            .await?;
        }

        // Relabel
        let offset = at - l + r + 1;
        let relabeled = tx
            .bulk_update(
                &NodeFilter::in_tree(source_tree).with(Condition::lt(IntColumn::Right, 0)),
                &[
                    ColumnUpdate::Shift {
                        column: IntColumn::Left,
                        delta: offset,
                    },
                    ColumnUpdate::Shift {
                        column: IntColumn::Right,
                        delta: offset,
                    },
                    ColumnUpdate::Shift {
                        column: IntColumn::Level,
                        delta: dest_level - node.level,
                    },
                    ColumnUpdate::SetTreeId(dest_tree),
                ],
            )
            .await?;
        if relabeled != unit_size {
            return Err(ForestError::concurrent_modification(
                format!("relabel subtree of {}", node.id),
                unit_size,
                relabeled,
            ));
        }

        self.reparent(tx, node.id, new_parent).await?;

        tracing::debug!(
            "Moved {} ({} nodes) from tree {} ({}, {}) to tree {} at {}",
            node.id,
            unit_size,
            source_tree,
            l,
            r,
            dest_tree,
            at
        );
        Ok(())
    }

    /// Pick the tree id for a new top-level tree, shifting later sequential
    /// trees up by one when the slot lies between existing trees
    async fn open_tree_slot(
        &self,
        tx: &mut dyn NodeTransaction,
        slot: TreeSlot,
    ) -> Result<TreeId, ForestError> {
        let tree_id = match slot {
            TreeSlot::Append => return self.allocator.next_tree_id(tx).await,
            TreeSlot::Before(TreeId::Sequential(n)) => TreeId::Sequential(n),
            TreeSlot::After(TreeId::Sequential(n)) => TreeId::Sequential(n + 1),
            TreeSlot::Before(other) | TreeSlot::After(other) => {
                return Err(ForestError::unsupported(format!(
                    "tree {} is not sequential and cannot be reordered",
                    other
                )))
            }
        };

        // Parked rows sit below zero; placeholder rows sit at zero and move with their tree
        let shifted = tx
            .bulk_update(
                &NodeFilter::trees_from(tree_id).with(Condition::ge(IntColumn::Right, 0)),
                &[ColumnUpdate::ShiftTreeId(1)],
            )
            .await?;
        if shifted > 0 {
            tracing::debug!("Shifted {} rows of trees >= {} up by one", shifted, tree_id);
        }
        Ok(tree_id)
    }

    async fn reparent(
        &self,
        tx: &mut dyn NodeTransaction,
        node_id: NodeId,
        parent_id: Option<NodeId>,
    ) -> Result<(), ForestError> {
        let updated = tx
            .bulk_update(
                &NodeFilter::ids(vec![node_id]),
                &[ColumnUpdate::SetParent(parent_id)],
            )
            .await?;
        if updated != 1 {
            return Err(ForestError::concurrent_modification(
                format!("reparent {}", node_id),
                1,
                updated,
            ));
        }
        Ok(())
    }

    /// Ids of `node` and everything below it by parent pointer
    async fn pointer_subtree(
        tx: &mut dyn NodeTransaction,
        node_id: NodeId,
    ) -> Result<Vec<NodeId>, ForestError> {
        let mut seen = HashSet::new();
        let mut ordered = Vec::new();
        let mut pending = vec![node_id];

        while let Some(current) = pending.pop() {
            if !seen.insert(current) {
                return Err(ForestError::invalid_state(format!(
                    "parent pointers below {} form a cycle at {}",
                    node_id, current
                )));
            }
            ordered.push(current);
            for child in tx.children(current).await? {
                pending.push(child.id);
            }
        }
        Ok(ordered)
    }

    async fn relocate_unmaintained(
        &self,
        tx: &mut dyn NodeTransaction,
        node: TreeNode,
        destination: Destination,
        target_id: NodeId,
    ) -> Result<(), ForestError> {
        let new_parent = destination.parent_id();
        if new_parent == node.parent_id && !matches!(destination, Destination::NewTree(_)) {
            tracing::debug!(
                "Sibling order of {} is not kept without maintenance; left to rebuild",
                node.id
            );
            return Ok(());
        }

        let subtree = Self::pointer_subtree(tx, node.id).await?;
        if let Some(parent_id) = new_parent {
            if subtree.contains(&parent_id) {
                return Err(ForestError::cycle_detected(node.id, target_id));
            }
        }

        let dest_tree = match &destination {
            Destination::FirstChildOf(parent) => parent.tree_id,
            Destination::After(sibling) => sibling.tree_id,
            Destination::NewTree(TreeSlot::Append) => self.allocator.next_tree_id(tx).await?,
            Destination::NewTree(slot) => self.open_tree_slot(tx, *slot).await?,
        };

        // A slot shift may have moved the subtree's own tree, so new trees always retag
        if dest_tree != node.tree_id || matches!(destination, Destination::NewTree(_)) {
            let relabeled = tx
                .bulk_update(
                    &NodeFilter::ids(subtree.clone()),
                    &[ColumnUpdate::SetTreeId(dest_tree)],
                )
                .await?;
            if relabeled != subtree.len() as u64 {
                return Err(ForestError::concurrent_modification(
                    format!("retag subtree of {}", node.id),
                    subtree.len() as u64,
                    relabeled,
                ));
            }
        }

        self.reparent(tx, node.id, new_parent).await?;
        tracing::debug!(
            "Reattached {} ({} nodes) under {:?} in tree {} without maintenance",
            node.id,
            subtree.len(),
            new_parent,
            dest_tree
        );
        Ok(())
    }

    /// Delete `node_id` and its whole subtree, returning the number of rows removed
    pub async fn delete_subtree(
        &self,
        ctx: MaintenanceContext,
        node_id: NodeId,
    ) -> Result<u64, ForestError> {
        let mut tx = self.store.begin().await?;
        let result = self.delete_subtree_in(tx.as_mut(), ctx, node_id).await;
        finish(tx, result).await
    }

    async fn delete_subtree_in(
        &self,
        tx: &mut dyn NodeTransaction,
        ctx: MaintenanceContext,
        node_id: NodeId,
    ) -> Result<u64, ForestError> {
        let node = load(tx, node_id).await?;

        if !ctx.is_enabled() {
            let subtree = Self::pointer_subtree(tx, node.id).await?;
            let removed = tx.delete_by_ids(&subtree).await?;
            if removed != subtree.len() as u64 {
                return Err(ForestError::concurrent_modification(
                    format!("delete subtree of {}", node.id),
                    subtree.len() as u64,
                    removed,
                ));
            }
            tracing::debug!("Deleted {} rows under {} without maintenance", removed, node.id);
            return Ok(removed);
        }
        ensure_interval(&node)?;

        let (r, w) = (node.right, node.width());
        let expected = node.subtree_size() as u64;

        let unit = tx.scan(node.tree_id, node.left..=r).await?;
        let ids: Vec<NodeId> = unit.iter().map(|n| n.id).collect();
        let removed = tx.delete_by_ids(&ids).await?;
        if removed != expected {
            return Err(ForestError::concurrent_modification(
                format!("delete subtree of {}", node.id),
                expected,
                removed,
            ));
        }

        tx.bulk_update(
            &NodeFilter::in_tree(node.tree_id).with(Condition::gt(IntColumn::Right, r)),
            &[
                ColumnUpdate::Shift {
                    column: IntColumn::Right,
                    delta: -w,
                },
                ColumnUpdate::ShiftWhen {
                    column: IntColumn::Left,
                    delta: -w,
                    when: Condition::gt(IntColumn::Left, r),
                },
            ],
        )
        .await?;

        tracing::debug!(
            "Deleted {} rows ({}, {}) from tree {}",
            removed,
            node.left,
            r,
            node.tree_id
        );
        Ok(removed)
    }

    /// Recompute intervals and levels of one tree from its parent pointers
    pub async fn rebuild(&self, tree_id: TreeId) -> Result<RebuildReport, ForestError> {
        let mut tx = self.store.begin().await?;
        let result = self.rebuild_engine.rebuild(tx.as_mut(), tree_id).await;
        finish(tx, result).await
    }

    /// Check the encoding of one tree, reporting the first violation
    pub async fn verify(&self, tree_id: TreeId) -> Result<(), ForestError> {
        let nodes = self.store.tree_nodes(tree_id).await?;
        verify_tree(&nodes)
    }
}

// Scenario tests in separate module
#[cfg(test)]
#[path = "tree_mutator_test.rs"]
mod tree_mutator_test;

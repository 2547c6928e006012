//! NodeStore Trait - Storage Abstraction Layer
//!
//! This module defines the `NodeStore` and `NodeTransaction` traits that
//! abstract storage of tree nodes. The engine (`TreeMutator`,
//! `RebuildEngine`) is written once against these traits; backends only have
//! to provide row access and atomic bulk rewrites.
//!
//! # Architecture
//!
//! - **Unit of Work**: Every read and write happens inside a
//!   `NodeTransaction`. A transaction either commits as a whole or leaves the
//!   store untouched.
//! - **Declarative Bulk Updates**: Interval rewrites are described as a
//!   `NodeFilter` plus a list of `ColumnUpdate`s. Backends translate the
//!   description into one indivisible operation (a single `UPDATE` statement
//!   for libsql, one pass over the working copy for the memory store).
//! - **Multiple Backends**: `TursoStore` (libsql) and `MemoryNodeStore`.
//!
//! # Update Semantics
//!
//! Every condition in a filter or in a `ColumnUpdate::ShiftWhen` is evaluated
//! against the row as it was *before* the update, exactly like the column
//! references on the right-hand side of an SQL `SET` clause.
//!
//! # Examples
//!
//! ```rust
//! use nodeforest_core::db::{ColumnUpdate, Condition, IntColumn, NodeFilter};
//! use nodeforest_core::models::TreeId;
//!
//! // Open a width-2 gap inside a parent whose right boundary is 5
//! let filter = NodeFilter::in_tree(TreeId::Sequential(1))
//!     .with(Condition::ge(IntColumn::Right, 5));
//! let updates = [
//!     ColumnUpdate::Shift { column: IntColumn::Right, delta: 2 },
//!     ColumnUpdate::ShiftWhen {
//!         column: IntColumn::Left,
//!         delta: 2,
//!         when: Condition::gt(IntColumn::Left, 5),
//!     },
//! ];
//! # let _ = (filter, updates);
//! ```

use crate::db::DatabaseError;
use crate::models::{NewNode, NodeId, NodePosition, TreeId, TreeNode};
use async_trait::async_trait;
use std::ops::RangeInclusive;

/// Integer columns the engine rewrites
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntColumn {
    Left,
    Right,
    Level,
}

impl IntColumn {
    /// Read this column from a node
    pub fn read(&self, node: &TreeNode) -> i64 {
        match self {
            IntColumn::Left => node.left,
            IntColumn::Right => node.right,
            IntColumn::Level => node.level,
        }
    }

    fn slot<'a>(&self, node: &'a mut TreeNode) -> &'a mut i64 {
        match self {
            IntColumn::Left => &mut node.left,
            IntColumn::Right => &mut node.right,
            IntColumn::Level => &mut node.level,
        }
    }
}

/// Comparison operator of a `Condition`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Lt,
    Le,
    Gt,
    Ge,
}

impl Comparison {
    pub fn evaluate(&self, lhs: i64, rhs: i64) -> bool {
        match self {
            Comparison::Lt => lhs < rhs,
            Comparison::Le => lhs <= rhs,
            Comparison::Gt => lhs > rhs,
            Comparison::Ge => lhs >= rhs,
        }
    }
}

/// `<column> <op> <constant>`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Condition {
    pub column: IntColumn,
    pub op: Comparison,
    pub value: i64,
}

impl Condition {
    pub fn new(column: IntColumn, op: Comparison, value: i64) -> Self {
        Self { column, op, value }
    }

    pub fn gt(column: IntColumn, value: i64) -> Self {
        Self::new(column, Comparison::Gt, value)
    }

    pub fn ge(column: IntColumn, value: i64) -> Self {
        Self::new(column, Comparison::Ge, value)
    }

    pub fn lt(column: IntColumn, value: i64) -> Self {
        Self::new(column, Comparison::Lt, value)
    }

    pub fn le(column: IntColumn, value: i64) -> Self {
        Self::new(column, Comparison::Le, value)
    }

    pub fn holds(&self, node: &TreeNode) -> bool {
        self.op.evaluate(self.column.read(node), self.value)
    }
}

/// Row predicate of a bulk update: a conjunction of all set parts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeFilter {
    /// `tree_id = t`
    pub tree_id: Option<TreeId>,
    /// `tree_id >= t`
    pub tree_id_at_least: Option<TreeId>,
    /// Integer column comparisons
    pub conditions: Vec<Condition>,
    /// `id IN (...)`; an empty set matches nothing
    pub only_ids: Option<Vec<NodeId>>,
}

impl NodeFilter {
    /// Rows of one tree
    pub fn in_tree(tree_id: TreeId) -> Self {
        Self {
            tree_id: Some(tree_id),
            ..Default::default()
        }
    }

    /// Rows of every tree whose id is `>= tree_id`
    pub fn trees_from(tree_id: TreeId) -> Self {
        Self {
            tree_id_at_least: Some(tree_id),
            ..Default::default()
        }
    }

    /// Exactly the given rows
    pub fn ids(ids: Vec<NodeId>) -> Self {
        Self {
            only_ids: Some(ids),
            ..Default::default()
        }
    }

    pub fn with(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn matches(&self, node: &TreeNode) -> bool {
        if let Some(tree_id) = &self.tree_id {
            if node.tree_id != *tree_id {
                return false;
            }
        }
        if let Some(floor) = &self.tree_id_at_least {
            if node.tree_id < *floor {
                return false;
            }
        }
        if let Some(ids) = &self.only_ids {
            if !ids.contains(&node.id) {
                return false;
            }
        }
        self.conditions.iter().all(|c| c.holds(node))
    }
}

/// One column assignment of a bulk update
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnUpdate {
    /// `column = column + delta`
    Shift { column: IntColumn, delta: i64 },
    /// `column = CASE WHEN <when> THEN column + delta ELSE column END`
    ShiftWhen {
        column: IntColumn,
        delta: i64,
        when: Condition,
    },
    /// `tree_id = t`
    SetTreeId(TreeId),
    /// `tree_id = tree_id + delta` (sequential ids only)
    ShiftTreeId(i64),
    /// `parent_id = p`
    SetParent(Option<NodeId>),
}

/// Apply `updates` to one row, evaluating every condition on the original row
pub fn apply_updates(node: &mut TreeNode, updates: &[ColumnUpdate]) -> Result<(), DatabaseError> {
    let before = node.clone();
    for update in updates {
        match update {
            ColumnUpdate::Shift { column, delta } => {
                *column.slot(node) = column.read(&before) + delta;
            }
            ColumnUpdate::ShiftWhen {
                column,
                delta,
                when,
            } => {
                if when.holds(&before) {
                    *column.slot(node) = column.read(&before) + delta;
                }
            }
            ColumnUpdate::SetTreeId(tree_id) => node.tree_id = *tree_id,
            ColumnUpdate::ShiftTreeId(delta) => match before.tree_id {
                TreeId::Sequential(n) => node.tree_id = TreeId::Sequential(n + delta),
                TreeId::Derived(_) => {
                    return Err(DatabaseError::UnsupportedUpdate(format!(
                        "cannot shift derived tree id {} of node {}",
                        before.tree_id, before.id
                    )))
                }
            },
            ColumnUpdate::SetParent(parent_id) => node.parent_id = *parent_id,
        }
    }
    Ok(())
}

/// One unit of work against the store
///
/// All reads observe the writes made earlier in the same transaction. Nothing
/// is visible to other readers until `commit` returns; `rollback` (or
/// dropping the transaction without committing) discards every write.
#[async_trait]
pub trait NodeTransaction: Send {
    /// Point lookup by id
    async fn get(&mut self, id: NodeId) -> Result<Option<TreeNode>, DatabaseError>;

    /// Nodes of `tree_id` whose `left` falls in `left_range`, ordered by
    /// `left` ascending, ties by `id`
    async fn scan(
        &mut self,
        tree_id: TreeId,
        left_range: RangeInclusive<i64>,
    ) -> Result<Vec<TreeNode>, DatabaseError>;

    /// Every node of `tree_id`, ordered by `left`, ties by `id`
    async fn scan_tree(&mut self, tree_id: TreeId) -> Result<Vec<TreeNode>, DatabaseError> {
        self.scan(tree_id, i64::MIN..=i64::MAX).await
    }

    /// Direct children by parent pointer, ordered by `left`, ties by `id`
    async fn children(&mut self, parent_id: NodeId) -> Result<Vec<TreeNode>, DatabaseError>;

    /// Every node in the store, ordered by `tree_id`, `left`, `id`
    async fn all_nodes(&mut self) -> Result<Vec<TreeNode>, DatabaseError>;

    /// Largest `right` value in `tree_id`, `None` for an empty tree
    async fn max_right(&mut self, tree_id: TreeId) -> Result<Option<i64>, DatabaseError>;

    /// Largest tree id in the store, `None` for an empty store
    async fn max_tree_id(&mut self) -> Result<Option<TreeId>, DatabaseError>;

    /// Apply `updates` to every row matching `filter` as one operation,
    /// returning the number of rows affected
    async fn bulk_update(
        &mut self,
        filter: &NodeFilter,
        updates: &[ColumnUpdate],
    ) -> Result<u64, DatabaseError>;

    /// Overwrite `(left, right, level)` of each listed node, returning the
    /// number of rows affected
    async fn set_positions(&mut self, positions: &[NodePosition]) -> Result<u64, DatabaseError>;

    /// Insert one row, returning its store-generated id
    async fn insert(&mut self, node: NewNode) -> Result<NodeId, DatabaseError>;

    /// Delete the listed rows, returning the number of rows removed
    async fn delete_by_ids(&mut self, ids: &[NodeId]) -> Result<u64, DatabaseError>;

    /// Delete every row, returning the number of rows removed
    async fn delete_all(&mut self) -> Result<u64, DatabaseError>;

    /// Publish every write of this transaction
    async fn commit(&mut self) -> Result<(), DatabaseError>;

    /// Discard every write of this transaction
    async fn rollback(&mut self) -> Result<(), DatabaseError>;
}

/// Abstraction layer for forest persistence
///
/// Implementations must be `Send + Sync` so a store can be shared behind an
/// `Arc` by every caller.
///
/// The read helpers below run in their own short transaction and are meant
/// for callers and tests; the engine always reads through the transaction it
/// mutates in.
#[async_trait]
pub trait NodeStore: Send + Sync {
    /// Start a unit of work
    async fn begin(&self) -> Result<Box<dyn NodeTransaction>, DatabaseError>;

    /// Start a transaction that will only read
    ///
    /// Backends where a write transaction excludes other writers can return a
    /// cheaper snapshot here; the default is `begin`.
    async fn begin_read(&self) -> Result<Box<dyn NodeTransaction>, DatabaseError> {
        self.begin().await
    }

    /// Point lookup outside any caller transaction
    async fn get(&self, id: NodeId) -> Result<Option<TreeNode>, DatabaseError> {
        let mut tx = self.begin_read().await?;
        let result = tx.get(id).await;
        tx.rollback().await?;
        result
    }

    /// Every node of one tree, ordered by `left`
    async fn tree_nodes(&self, tree_id: TreeId) -> Result<Vec<TreeNode>, DatabaseError> {
        let mut tx = self.begin_read().await?;
        let result = tx.scan_tree(tree_id).await;
        tx.rollback().await?;
        result
    }

    /// Every node in the store, ordered by `tree_id`, `left`, `id`
    async fn snapshot(&self) -> Result<Vec<TreeNode>, DatabaseError> {
        let mut tx = self.begin_read().await?;
        let result = tx.all_nodes().await;
        tx.rollback().await?;
        result
    }

    /// Remove every node
    async fn clear(&self) -> Result<u64, DatabaseError> {
        let mut tx = self.begin().await?;
        match tx.delete_all().await {
            Ok(removed) => {
                tx.commit().await?;
                Ok(removed)
            }
            Err(e) => {
                let _rollback = tx.rollback().await;
                Err(e)
            }
        }
    }
}

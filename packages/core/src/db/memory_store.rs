//! MemoryNodeStore - In-Process NodeStore Implementation
//!
//! Keeps every row in a `BTreeMap` behind a Tokio mutex. A transaction holds
//! the mutex for its whole lifetime and works on a private copy of the rows;
//! `commit` publishes the copy, `rollback` (or drop) throws it away. Readers
//! therefore only ever see fully committed states.
//!
//! Used by unit tests, property tests and benchmarks where a database file
//! would only add noise. Semantics match `TursoStore` row for row.

use crate::db::node_store::{apply_updates, NodeStore, NodeTransaction};
use crate::db::{ColumnUpdate, DatabaseError, NodeFilter};
use crate::models::{NewNode, NodeId, NodePosition, TreeId, TreeNode};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::ops::RangeInclusive;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    rows: BTreeMap<NodeId, TreeNode>,
    next_id: i64,
}

impl MemoryState {
    fn sorted(&self, mut nodes: Vec<TreeNode>) -> Vec<TreeNode> {
        nodes.sort_by(|a, b| (a.left, a.id).cmp(&(b.left, b.id)));
        nodes
    }
}

/// In-memory forest table
#[derive(Debug, Clone, Default)]
pub struct MemoryNodeStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryNodeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NodeStore for MemoryNodeStore {
    async fn begin(&self) -> Result<Box<dyn NodeTransaction>, DatabaseError> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTransaction {
            guard: Some(guard),
            working,
        }))
    }
}

/// Exclusive unit of work over a `MemoryNodeStore`
pub struct MemoryTransaction {
    guard: Option<OwnedMutexGuard<MemoryState>>,
    working: MemoryState,
}

impl MemoryTransaction {
    fn ensure_open(&self) -> Result<(), DatabaseError> {
        if self.guard.is_none() {
            return Err(DatabaseError::sql_execution("transaction already finished"));
        }
        Ok(())
    }
}

#[async_trait]
impl NodeTransaction for MemoryTransaction {
    async fn get(&mut self, id: NodeId) -> Result<Option<TreeNode>, DatabaseError> {
        self.ensure_open()?;
        Ok(self.working.rows.get(&id).cloned())
    }

    async fn scan(
        &mut self,
        tree_id: TreeId,
        left_range: RangeInclusive<i64>,
    ) -> Result<Vec<TreeNode>, DatabaseError> {
        self.ensure_open()?;
        let nodes = self
            .working
            .rows
            .values()
            .filter(|n| n.tree_id == tree_id && left_range.contains(&n.left))
            .cloned()
            .collect();
        Ok(self.working.sorted(nodes))
    }

    async fn children(&mut self, parent_id: NodeId) -> Result<Vec<TreeNode>, DatabaseError> {
        self.ensure_open()?;
        let nodes = self
            .working
            .rows
            .values()
            .filter(|n| n.parent_id == Some(parent_id))
            .cloned()
            .collect();
        Ok(self.working.sorted(nodes))
    }

    async fn all_nodes(&mut self) -> Result<Vec<TreeNode>, DatabaseError> {
        self.ensure_open()?;
        let mut nodes: Vec<TreeNode> = self.working.rows.values().cloned().collect();
        nodes.sort_by(|a, b| (a.tree_id, a.left, a.id).cmp(&(b.tree_id, b.left, b.id)));
        Ok(nodes)
    }

    async fn max_right(&mut self, tree_id: TreeId) -> Result<Option<i64>, DatabaseError> {
        self.ensure_open()?;
        Ok(self
            .working
            .rows
            .values()
            .filter(|n| n.tree_id == tree_id)
            .map(|n| n.right)
            .max())
    }

    async fn max_tree_id(&mut self) -> Result<Option<TreeId>, DatabaseError> {
        self.ensure_open()?;
        Ok(self.working.rows.values().map(|n| n.tree_id).max())
    }

    async fn bulk_update(
        &mut self,
        filter: &NodeFilter,
        updates: &[ColumnUpdate],
    ) -> Result<u64, DatabaseError> {
        self.ensure_open()?;

        // Stage every row first so a failing update leaves the working copy untouched
        let now = Utc::now();
        let mut staged = Vec::new();
        for node in self.working.rows.values().filter(|n| filter.matches(n)) {
            let mut updated = node.clone();
            apply_updates(&mut updated, updates)?;
            updated.updated_at = now;
            staged.push(updated);
        }

        let affected = staged.len() as u64;
        for node in staged {
            self.working.rows.insert(node.id, node);
        }
        Ok(affected)
    }

    async fn set_positions(&mut self, positions: &[NodePosition]) -> Result<u64, DatabaseError> {
        self.ensure_open()?;
        let now = Utc::now();
        let mut affected = 0;
        for position in positions {
            if let Some(node) = self.working.rows.get_mut(&position.id) {
                node.left = position.left;
                node.right = position.right;
                node.level = position.level;
                node.updated_at = now;
                affected += 1;
            }
        }
        Ok(affected)
    }

    async fn insert(&mut self, node: NewNode) -> Result<NodeId, DatabaseError> {
        self.ensure_open()?;
        self.working.next_id += 1;
        let id = NodeId(self.working.next_id);
        let now = Utc::now();
        self.working.rows.insert(
            id,
            TreeNode {
                id,
                parent_id: node.parent_id,
                tree_id: node.tree_id,
                level: node.level,
                left: node.left,
                right: node.right,
                payload_id: node.payload_id,
                created_at: now,
                updated_at: now,
            },
        );
        Ok(id)
    }

    async fn delete_by_ids(&mut self, ids: &[NodeId]) -> Result<u64, DatabaseError> {
        self.ensure_open()?;
        let removed = ids
            .iter()
            .filter(|id| self.working.rows.remove(*id).is_some())
            .count();
        Ok(removed as u64)
    }

    async fn delete_all(&mut self) -> Result<u64, DatabaseError> {
        self.ensure_open()?;
        let removed = self.working.rows.len() as u64;
        self.working.rows.clear();
        Ok(removed)
    }

    async fn commit(&mut self) -> Result<(), DatabaseError> {
        let mut guard = self
            .guard
            .take()
            .ok_or_else(|| DatabaseError::sql_execution("transaction already finished"))?;
        *guard = std::mem::take(&mut self.working);
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), DatabaseError> {
        self.guard.take();
        Ok(())
    }
}

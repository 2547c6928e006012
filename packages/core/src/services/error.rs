//! Service Layer Error Types
//!
//! This module defines error types for forest mutations. Store failures are
//! wrapped unchanged; everything else describes a tree-level condition the
//! caller has to act on.

use crate::db::DatabaseError;
use crate::models::{NodeId, TreeId};
use thiserror::Error;

/// Forest operation errors
///
/// Every mutation runs in one unit of work, so any of these errors means the
/// store is still in its pre-operation state.
#[derive(Error, Debug)]
pub enum ForestError {
    /// Referenced node does not exist
    #[error("Node not found: {id}")]
    NotFound { id: NodeId },

    /// Destination lies inside the moving node's own subtree
    #[error("Cannot move node {node_id} into its own subtree (target {target_id})")]
    CycleDetected { node_id: NodeId, target_id: NodeId },

    /// Stored encoding violates a structural invariant
    #[error("Invalid tree state: {0}")]
    InvalidState(String),

    /// A bulk rewrite touched a different number of rows than computed
    #[error("Concurrent modification detected during {context}: expected {expected} rows, affected {actual}")]
    ConcurrentModification {
        context: String,
        expected: u64,
        actual: u64,
    },

    /// Tree identifier could not be produced
    #[error("Tree id allocation failed: {0}")]
    AllocationFailure(String),

    /// A root was requested for a tree that already holds nodes
    #[error("Tree {tree_id} already exists")]
    TreeExists { tree_id: TreeId },

    /// Operation not available with the configured tree id backend
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Database operation failed
    #[error("Database operation failed: {0}")]
    Database(#[from] DatabaseError),
}

impl ForestError {
    /// Create a node not found error
    pub fn not_found(id: NodeId) -> Self {
        Self::NotFound { id }
    }

    /// Create a cycle detected error
    pub fn cycle_detected(node_id: NodeId, target_id: NodeId) -> Self {
        Self::CycleDetected { node_id, target_id }
    }

    /// Create an invalid state error
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Create a concurrent modification error
    pub fn concurrent_modification(context: impl Into<String>, expected: u64, actual: u64) -> Self {
        Self::ConcurrentModification {
            context: context.into(),
            expected,
            actual,
        }
    }

    /// Create an allocation failure error
    pub fn allocation_failure(msg: impl Into<String>) -> Self {
        Self::AllocationFailure(msg.into())
    }

    /// Create an unsupported operation error
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }
}

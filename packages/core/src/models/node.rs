//! Tree Node Data Structures
//!
//! This module defines the `TreeNode` row stored in the forest table together
//! with the small value types the engine passes to and from the store.
//!
//! # Nested-Set Encoding
//!
//! Every node carries a `[left, right]` interval. A node's interval strictly
//! contains the intervals of all of its descendants, and the intervals of one
//! tree tile `[1, max_right]` without gaps. Ancestry is therefore decided by
//! interval containment alone, without walking `parent_id`.
//!
//! # Examples
//!
//! ```rust
//! use nodeforest_core::models::{NodeId, TreeId, TreeNode};
//! use chrono::Utc;
//!
//! let root = TreeNode {
//!     id: NodeId(1),
//!     parent_id: None,
//!     tree_id: TreeId::Sequential(1),
//!     level: 0,
//!     left: 1,
//!     right: 4,
//!     payload_id: 10,
//!     created_at: Utc::now(),
//!     updated_at: Utc::now(),
//! };
//! let child = TreeNode {
//!     id: NodeId(2),
//!     parent_id: Some(NodeId(1)),
//!     level: 1,
//!     left: 2,
//!     right: 3,
//!     ..root.clone()
//! };
//! assert!(root.is_ancestor_of(&child));
//! assert_eq!(root.subtree_size(), 2);
//! ```

use super::TreeId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Depth assigned to every tree root
pub const ROOT_LEVEL: i64 = 0;

/// Interval, level value written for rows inserted while maintenance is disabled
pub const PLACEHOLDER_POSITION: i64 = 0;

/// Store-generated primary key of a tree node
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub i64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for NodeId {
    fn from(value: i64) -> Self {
        NodeId(value)
    }
}

/// One row of the forest table
///
/// # Fields
///
/// - `id`: Store-generated primary key
/// - `parent_id`: Parent node, `None` iff this node is a tree root
/// - `tree_id`: Tree this node belongs to
/// - `level`: Depth below the root (root is `ROOT_LEVEL`)
/// - `left`, `right`: Preorder interval, unique within `tree_id`
/// - `payload_id`: Opaque reference to the external category entity
/// - `created_at`, `updated_at`: Maintained by the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeNode {
    pub id: NodeId,
    pub parent_id: Option<NodeId>,
    pub tree_id: TreeId,
    pub level: i64,
    pub left: i64,
    pub right: i64,
    pub payload_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TreeNode {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Interval width (`right - left + 1`); always twice the subtree size
    pub fn width(&self) -> i64 {
        self.right - self.left + 1
    }

    /// Number of nodes in the subtree rooted here, including this node
    pub fn subtree_size(&self) -> i64 {
        self.width() / 2
    }

    /// Whether `other` is a strict descendant of this node
    pub fn is_ancestor_of(&self, other: &TreeNode) -> bool {
        self.tree_id == other.tree_id && self.left < other.left && other.right < self.right
    }

    /// Whether `other` lies within this node's interval (self included)
    pub fn contains(&self, other: &TreeNode) -> bool {
        self.tree_id == other.tree_id && self.left <= other.left && other.right <= self.right
    }

    /// Whether the interval is well formed (`0 < left < right`, even width)
    pub fn has_valid_interval(&self) -> bool {
        self.left > 0 && self.left < self.right && self.width() % 2 == 0
    }

    /// Current position triple of this node
    pub fn position(&self) -> NodePosition {
        NodePosition {
            id: self.id,
            left: self.left,
            right: self.right,
            level: self.level,
        }
    }
}

/// Row to insert; `id` and timestamps are assigned by the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNode {
    pub parent_id: Option<NodeId>,
    pub tree_id: TreeId,
    pub level: i64,
    pub left: i64,
    pub right: i64,
    pub payload_id: i64,
}

impl NewNode {
    /// Root of a fresh tree (`left = 1`, `right = 2`)
    pub fn root(payload_id: i64, tree_id: TreeId) -> Self {
        Self {
            parent_id: None,
            tree_id,
            level: ROOT_LEVEL,
            left: 1,
            right: 2,
            payload_id,
        }
    }

    /// Row with placeholder interval values, to be fixed by a rebuild
    pub fn placeholder(payload_id: i64, tree_id: TreeId, parent_id: Option<NodeId>) -> Self {
        Self {
            parent_id,
            tree_id,
            level: PLACEHOLDER_POSITION,
            left: PLACEHOLDER_POSITION,
            right: PLACEHOLDER_POSITION,
            payload_id,
        }
    }
}

/// Absolute `(left, right, level)` assignment for one node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodePosition {
    pub id: NodeId,
    pub left: i64,
    pub right: i64,
    pub level: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: i64, left: i64, right: i64) -> TreeNode {
        TreeNode {
            id: NodeId(id),
            parent_id: None,
            tree_id: TreeId::Sequential(1),
            level: 0,
            left,
            right,
            payload_id: id,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_containment() {
        let root = node(1, 1, 6);
        let child = node(2, 2, 3);
        let other_tree = TreeNode {
            tree_id: TreeId::Sequential(2),
            ..child.clone()
        };

        assert!(root.is_ancestor_of(&child));
        assert!(!child.is_ancestor_of(&root));
        assert!(!root.is_ancestor_of(&root));
        assert!(root.contains(&root));
        assert!(!root.is_ancestor_of(&other_tree));
    }

    #[test]
    fn test_subtree_size() {
        assert_eq!(node(1, 1, 2).subtree_size(), 1);
        assert_eq!(node(1, 1, 10).subtree_size(), 5);
    }

    #[test]
    fn test_interval_validity() {
        assert!(node(1, 1, 2).has_valid_interval());
        assert!(!node(1, 0, 0).has_valid_interval());
        assert!(!node(1, 3, 3).has_valid_interval());
        assert!(!node(1, 2, 4).has_valid_interval());
    }
}

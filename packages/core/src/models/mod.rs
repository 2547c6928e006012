//! Data Models
//!
//! This module contains the data structures shared by the store and the
//! engine:
//!
//! - `TreeNode` - one row of the forest table
//! - `TreeId` - identifier of one tree within the forest
//! - `NewNode`, `NodePosition` - values passed to the store on insert/rebuild

mod node;
mod tree_id;

pub use node::{NewNode, NodeId, NodePosition, TreeNode, PLACEHOLDER_POSITION, ROOT_LEVEL};
pub use tree_id::TreeId;

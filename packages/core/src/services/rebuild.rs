//! Rebuild Engine
//!
//! Recomputes `left`, `right` and `level` of one tree from its parent
//! pointers alone. Used after a bulk load with maintenance disabled, or to
//! repair a tree whose intervals are no longer trusted.
//!
//! The walk is a depth-first preorder over an explicit stack:
//!
//! - roots (nodes without a parent) and the children of every node are
//!   visited in ascending `(left, id)` order, so an already valid encoding
//!   keeps its sibling order
//! - `left` is taken from a counter on entry, `right` on exit
//! - `level` is the walk depth, roots at `ROOT_LEVEL`
//!
//! Several roots in one tree continue the same counter. A node whose parent
//! lives outside the tree, or a node no root can reach (a parent-pointer
//! cycle), is reported as `InvalidState` and nothing is written.

use crate::db::NodeTransaction;
use crate::models::{NodeId, NodePosition, TreeId, TreeNode, ROOT_LEVEL};
use crate::services::error::ForestError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Outcome of one rebuild
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RebuildReport {
    pub tree_id: TreeId,
    pub node_count: usize,
    /// `0` for an empty tree
    pub max_right: i64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RebuildEngine;

impl RebuildEngine {
    pub fn new() -> Self {
        Self
    }

    /// Compute fresh positions for every node of one tree
    ///
    /// The result is in the same order as `nodes` sorted by `(left, id)`.
    pub fn compute_positions(&self, nodes: &[TreeNode]) -> Result<Vec<NodePosition>, ForestError> {
        let mut ordered: Vec<&TreeNode> = nodes.iter().collect();
        ordered.sort_by_key(|n| (n.left, n.id));

        let index: HashMap<NodeId, usize> = ordered
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id, i))
            .collect();

        let mut roots = Vec::new();
        let mut children: Vec<Vec<usize>> = vec![Vec::new(); ordered.len()];
        for (i, node) in ordered.iter().enumerate() {
            match node.parent_id {
                None => roots.push(i),
                Some(parent_id) => {
                    let parent = index.get(&parent_id).ok_or_else(|| {
                        ForestError::invalid_state(format!(
                            "node {} references parent {} outside tree {}",
                            node.id, parent_id, node.tree_id
                        ))
                    })?;
                    children[*parent].push(i);
                }
            }
        }

        let mut positions: Vec<Option<NodePosition>> = vec![None; ordered.len()];
        let mut counter = 1;
        // (node index, level, next child cursor)
        let mut stack: Vec<(usize, i64, usize)> = Vec::new();

        for root in roots {
            positions[root] = Some(NodePosition {
                id: ordered[root].id,
                left: counter,
                right: 0,
                level: ROOT_LEVEL,
            });
            counter += 1;
            stack.push((root, ROOT_LEVEL, 0));

            while let Some(frame) = stack.last_mut() {
                let (current, level, cursor) = *frame;
                if let Some(&child) = children[current].get(cursor) {
                    frame.2 += 1;
                    positions[child] = Some(NodePosition {
                        id: ordered[child].id,
                        left: counter,
                        right: 0,
                        level: level + 1,
                    });
                    counter += 1;
                    stack.push((child, level + 1, 0));
                } else {
                    if let Some(position) = positions[current].as_mut() {
                        position.right = counter;
                    }
                    counter += 1;
                    stack.pop();
                }
            }
        }

        let mut result = Vec::with_capacity(ordered.len());
        for (i, position) in positions.into_iter().enumerate() {
            match position {
                Some(position) => result.push(position),
                None => {
                    return Err(ForestError::invalid_state(format!(
                        "node {} is not reachable from any root of tree {}",
                        ordered[i].id, ordered[i].tree_id
                    )))
                }
            }
        }
        Ok(result)
    }

    /// Rebuild one tree inside the caller's unit of work
    pub async fn rebuild(
        &self,
        tx: &mut dyn NodeTransaction,
        tree_id: TreeId,
    ) -> Result<RebuildReport, ForestError> {
        let nodes = tx.scan_tree(tree_id).await?;
        if nodes.is_empty() {
            return Ok(RebuildReport {
                tree_id,
                node_count: 0,
                max_right: 0,
            });
        }

        let positions = self.compute_positions(&nodes)?;
        let changed: Vec<NodePosition> = positions
            .iter()
            .zip(sorted_positions(&nodes))
            .filter(|(new, old)| *new != old)
            .map(|(new, _)| *new)
            .collect();

        let written = tx.set_positions(&changed).await?;
        if written != changed.len() as u64 {
            return Err(ForestError::concurrent_modification(
                format!("rebuild of tree {}", tree_id),
                changed.len() as u64,
                written,
            ));
        }

        let max_right = positions.iter().map(|p| p.right).max().unwrap_or(0);
        tracing::info!(
            "Rebuilt tree {}: {} nodes, {} rewritten, max right {}",
            tree_id,
            nodes.len(),
            changed.len(),
            max_right
        );

        Ok(RebuildReport {
            tree_id,
            node_count: nodes.len(),
            max_right,
        })
    }
}

fn sorted_positions(nodes: &[TreeNode]) -> Vec<NodePosition> {
    let mut ordered: Vec<&TreeNode> = nodes.iter().collect();
    ordered.sort_by_key(|n| (n.left, n.id));
    ordered.into_iter().map(TreeNode::position).collect()
}

//! Integrity verification for one tree's nested-set encoding.

use crate::models::{TreeNode, ROOT_LEVEL};
use crate::services::error::ForestError;

/// Check that `nodes` (all rows of one tree) form a valid encoding
///
/// Verified, in one pass over the nodes sorted by `left`:
///
/// - every interval is well formed (`0 < left < right`)
/// - intervals are disjoint or strictly nested
/// - the endpoints tile `[1, 2n]` with no gaps or duplicates
/// - `parent_id` names the innermost enclosing interval (`None` for roots)
/// - `level` equals the nesting depth
pub fn verify_tree(nodes: &[TreeNode]) -> Result<(), ForestError> {
    let mut ordered: Vec<&TreeNode> = nodes.iter().collect();
    ordered.sort_by_key(|n| (n.left, n.id));

    let mut endpoints = Vec::with_capacity(nodes.len() * 2);
    let mut open: Vec<&TreeNode> = Vec::new();

    for node in ordered {
        if !node.has_valid_interval() {
            return Err(ForestError::invalid_state(format!(
                "node {} has malformed interval ({}, {})",
                node.id, node.left, node.right
            )));
        }
        endpoints.push(node.left);
        endpoints.push(node.right);

        while open.last().is_some_and(|top| top.right < node.left) {
            open.pop();
        }

        if let Some(enclosing) = open.last() {
            if node.right >= enclosing.right {
                return Err(ForestError::invalid_state(format!(
                    "node {} ({}, {}) partially overlaps node {} ({}, {})",
                    node.id, node.left, node.right, enclosing.id, enclosing.left, enclosing.right
                )));
            }
        }

        let expected_parent = open.last().map(|n| n.id);
        if node.parent_id != expected_parent {
            return Err(ForestError::invalid_state(format!(
                "node {} has parent {:?} but is enclosed by {:?}",
                node.id, node.parent_id, expected_parent
            )));
        }

        let expected_level = ROOT_LEVEL + open.len() as i64;
        if node.level != expected_level {
            return Err(ForestError::invalid_state(format!(
                "node {} has level {} at depth {}",
                node.id, node.level, expected_level
            )));
        }

        open.push(node);
    }

    endpoints.sort_unstable();
    for (i, value) in endpoints.iter().enumerate() {
        if *value != i as i64 + 1 {
            return Err(ForestError::invalid_state(format!(
                "intervals do not tile [1, {}]: found {} at position {}",
                endpoints.len(),
                value,
                i + 1
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NodeId, TreeId};
    use chrono::Utc;

    fn node(id: i64, parent: Option<i64>, level: i64, left: i64, right: i64) -> TreeNode {
        TreeNode {
            id: NodeId(id),
            parent_id: parent.map(NodeId),
            tree_id: TreeId::Sequential(1),
            level,
            left,
            right,
            payload_id: id,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_valid_tree_passes() {
        let nodes = vec![
            node(1, None, 0, 1, 8),
            node(2, Some(1), 1, 2, 5),
            node(3, Some(2), 2, 3, 4),
            node(4, Some(1), 1, 6, 7),
        ];
        assert!(verify_tree(&nodes).is_ok());
        assert!(verify_tree(&[]).is_ok());
    }

    #[test]
    fn test_gap_is_rejected() {
        let nodes = vec![node(1, None, 0, 1, 6), node(2, Some(1), 1, 2, 3)];
        assert!(matches!(
            verify_tree(&nodes),
            Err(ForestError::InvalidState(_))
        ));
    }

    #[test]
    fn test_partial_overlap_is_rejected() {
        let nodes = vec![
            node(1, None, 0, 1, 6),
            node(2, Some(1), 1, 2, 4),
            node(3, Some(2), 2, 3, 5),
        ];
        assert!(verify_tree(&nodes).is_err());
    }

    #[test]
    fn test_wrong_level_and_parent_are_rejected() {
        let wrong_level = vec![node(1, None, 0, 1, 4), node(2, Some(1), 2, 2, 3)];
        assert!(verify_tree(&wrong_level).is_err());

        let wrong_parent = vec![node(1, None, 0, 1, 4), node(2, None, 1, 2, 3)];
        assert!(verify_tree(&wrong_parent).is_err());
    }

    #[test]
    fn test_placeholders_are_rejected() {
        let nodes = vec![node(1, None, 0, 0, 0)];
        assert!(verify_tree(&nodes).is_err());
    }
}

//! Scenario tests for TreeMutator
//!
//! Tests cover:
//! - Insert and delete interval arithmetic on a small tree
//! - Moves within a parent, across parents and to the top level
//! - No-op and cycle guards leaving the store untouched
//! - Tree id renumbering and the derived-id restrictions
//! - Bulk load with maintenance disabled followed by rebuild

#[cfg(test)]
mod tests {
    use crate::db::{MemoryNodeStore, NodeStore};
    use crate::models::{NodeId, TreeId};
    use crate::services::{
        DerivedTreeIds, ForestError, MaintenanceContext, SequentialTreeIds, TreeMutator,
    };
    use std::sync::Arc;

    const ON: MaintenanceContext = MaintenanceContext::ENABLED;
    const OFF: MaintenanceContext = MaintenanceContext::DISABLED;

    fn create_mutator() -> TreeMutator {
        TreeMutator::new(Arc::new(MemoryNodeStore::new()), Arc::new(SequentialTreeIds))
    }

    async fn interval(mutator: &TreeMutator, id: NodeId) -> (i64, i64, i64) {
        let node = mutator.store().get(id).await.unwrap().unwrap();
        (node.left, node.right, node.level)
    }

    async fn tree_of(mutator: &TreeMutator, id: NodeId) -> TreeId {
        mutator.store().get(id).await.unwrap().unwrap().tree_id
    }

    async fn parent_of(mutator: &TreeMutator, id: NodeId) -> Option<NodeId> {
        mutator.store().get(id).await.unwrap().unwrap().parent_id
    }

    struct Sample {
        root: NodeId,
        a: NodeId,
        a1: NodeId,
        a2: NodeId,
        b: NodeId,
        c: NodeId,
    }

    /// R(1,12): A(2,7){A1(3,4), A2(5,6)}, B(8,9), C(10,11)
    async fn build_sample(mutator: &TreeMutator) -> Sample {
        let root = mutator.insert_root(ON, 100, None).await.unwrap();
        let a = mutator.insert_child(ON, 1, root).await.unwrap();
        let a1 = mutator.insert_child(ON, 11, a).await.unwrap();
        let a2 = mutator.insert_child(ON, 12, a).await.unwrap();
        let b = mutator.insert_child(ON, 2, root).await.unwrap();
        let c = mutator.insert_child(ON, 3, root).await.unwrap();
        Sample {
            root,
            a,
            a1,
            a2,
            b,
            c,
        }
    }

    #[tokio::test]
    async fn test_insert_then_delete_scenario() {
        let mutator = create_mutator();

        let root = mutator.insert_root(ON, 1, None).await.unwrap();
        assert_eq!(tree_of(&mutator, root).await, TreeId::Sequential(1));
        assert_eq!(interval(&mutator, root).await, (1, 2, 0));

        let c1 = mutator.insert_child(ON, 2, root).await.unwrap();
        assert_eq!(interval(&mutator, c1).await, (2, 3, 1));
        assert_eq!(interval(&mutator, root).await, (1, 4, 0));

        let c2 = mutator.insert_child(ON, 3, root).await.unwrap();
        assert_eq!(interval(&mutator, c2).await, (4, 5, 1));
        assert_eq!(interval(&mutator, root).await, (1, 6, 0));
        assert_eq!(interval(&mutator, c1).await, (2, 3, 1));

        let removed = mutator.delete_subtree(ON, c1).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(interval(&mutator, root).await, (1, 4, 0));
        assert_eq!(interval(&mutator, c2).await, (2, 3, 1));
        assert!(mutator.store().get(c1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_subtree_removes_descendants_and_closes_gap() {
        let mutator = create_mutator();
        let s = build_sample(&mutator).await;

        let removed = mutator.delete_subtree(ON, s.a).await.unwrap();

        assert_eq!(removed, 3);
        assert_eq!(mutator.store().snapshot().await.unwrap().len(), 3);
        assert_eq!(interval(&mutator, s.root).await, (1, 6, 0));
        assert_eq!(interval(&mutator, s.b).await, (2, 3, 1));
        assert_eq!(interval(&mutator, s.c).await, (4, 5, 1));
        mutator.verify(TreeId::Sequential(1)).await.unwrap();
    }

    #[tokio::test]
    async fn test_moves_within_one_tree() {
        let mutator = create_mutator();
        let s = build_sample(&mutator).await;
        assert_eq!(interval(&mutator, s.root).await, (1, 12, 0));
        assert_eq!(interval(&mutator, s.a2).await, (5, 6, 2));

        // A with its children to the end
        mutator.move_after(ON, s.a, s.c).await.unwrap();
        assert_eq!(interval(&mutator, s.b).await, (2, 3, 1));
        assert_eq!(interval(&mutator, s.c).await, (4, 5, 1));
        assert_eq!(interval(&mutator, s.a).await, (6, 11, 1));
        assert_eq!(interval(&mutator, s.a1).await, (7, 8, 2));
        assert_eq!(interval(&mutator, s.a2).await, (9, 10, 2));

        // A2 has no preceding sibling before A1, so it becomes A's first child
        mutator.move_before(ON, s.a2, s.a1).await.unwrap();
        assert_eq!(interval(&mutator, s.a2).await, (7, 8, 2));
        assert_eq!(interval(&mutator, s.a1).await, (9, 10, 2));

        // B one level down, under C
        mutator.move_inside(ON, s.b, s.c).await.unwrap();
        assert_eq!(interval(&mutator, s.c).await, (2, 5, 1));
        assert_eq!(interval(&mutator, s.b).await, (3, 4, 2));
        assert_eq!(parent_of(&mutator, s.b).await, Some(s.c));
        assert_eq!(interval(&mutator, s.a).await, (6, 11, 1));
        assert_eq!(interval(&mutator, s.root).await, (1, 12, 0));

        mutator.verify(TreeId::Sequential(1)).await.unwrap();
    }

    #[tokio::test]
    async fn test_move_before_uses_preceding_sibling() {
        let mutator = create_mutator();
        let s = build_sample(&mutator).await;

        // C lands between A and B
        mutator.move_before(ON, s.c, s.b).await.unwrap();
        assert_eq!(interval(&mutator, s.a).await, (2, 7, 1));
        assert_eq!(interval(&mutator, s.c).await, (8, 9, 1));
        assert_eq!(interval(&mutator, s.b).await, (10, 11, 1));

        // A1 leaves A and lands before C, one level up
        mutator.move_before(ON, s.a1, s.c).await.unwrap();
        assert_eq!(interval(&mutator, s.a).await, (2, 5, 1));
        assert_eq!(interval(&mutator, s.a2).await, (3, 4, 2));
        assert_eq!(interval(&mutator, s.a1).await, (6, 7, 1));
        assert_eq!(parent_of(&mutator, s.a1).await, Some(s.root));

        mutator.verify(TreeId::Sequential(1)).await.unwrap();
    }

    #[tokio::test]
    async fn test_noop_moves_leave_store_untouched() {
        let mutator = create_mutator();
        let s = build_sample(&mutator).await;
        let before = mutator.store().snapshot().await.unwrap();

        mutator.move_inside(ON, s.a2, s.a).await.unwrap();
        mutator.move_after(ON, s.b, s.a).await.unwrap();
        mutator.move_before(ON, s.a1, s.a2).await.unwrap();
        mutator.move_after(ON, s.c, s.c).await.unwrap();
        mutator.make_root(ON, s.root).await.unwrap();

        assert_eq!(mutator.store().snapshot().await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_move_into_own_subtree_is_rejected() {
        let mutator = create_mutator();
        let s = build_sample(&mutator).await;
        let before = mutator.store().snapshot().await.unwrap();

        let err = mutator.move_inside(ON, s.a, s.a1).await.unwrap_err();
        assert!(matches!(err, ForestError::CycleDetected { .. }));

        let err = mutator.move_inside(ON, s.a, s.a).await.unwrap_err();
        assert!(matches!(err, ForestError::CycleDetected { .. }));

        let err = mutator.move_after(ON, s.root, s.b).await.unwrap_err();
        assert!(matches!(err, ForestError::CycleDetected { .. }));

        assert_eq!(mutator.store().snapshot().await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_missing_nodes_are_reported() {
        let mutator = create_mutator();
        let s = build_sample(&mutator).await;

        let err = mutator.insert_child(ON, 1, NodeId(999)).await.unwrap_err();
        assert!(matches!(err, ForestError::NotFound { id } if id == NodeId(999)));

        let err = mutator.move_inside(ON, NodeId(999), s.root).await.unwrap_err();
        assert!(matches!(err, ForestError::NotFound { .. }));

        let err = mutator.delete_subtree(ON, NodeId(999)).await.unwrap_err();
        assert!(matches!(err, ForestError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_maintained_calls_reject_placeholder_rows() {
        let mutator = create_mutator();
        let root = mutator.insert_root(OFF, 1, None).await.unwrap();
        let a = mutator.insert_child(OFF, 2, root).await.unwrap();
        let b = mutator.insert_child(OFF, 3, root).await.unwrap();
        let before = mutator.store().snapshot().await.unwrap();

        let err = mutator.insert_child(ON, 4, a).await.unwrap_err();
        assert!(matches!(err, ForestError::InvalidState(_)), "{:?}", err);

        let err = mutator.delete_subtree(ON, a).await.unwrap_err();
        assert!(matches!(err, ForestError::InvalidState(_)), "{:?}", err);

        let err = mutator.move_after(ON, a, b).await.unwrap_err();
        assert!(matches!(err, ForestError::InvalidState(_)), "{:?}", err);

        let err = mutator.move_inside(ON, b, a).await.unwrap_err();
        assert!(matches!(err, ForestError::InvalidState(_)), "{:?}", err);

        let err = mutator.make_root(ON, a).await.unwrap_err();
        assert!(matches!(err, ForestError::InvalidState(_)), "{:?}", err);

        assert_eq!(mutator.store().snapshot().await.unwrap(), before);

        // Once rebuilt, the same tree accepts maintained calls again
        mutator.rebuild(TreeId::FIRST).await.unwrap();
        let c = mutator.insert_child(ON, 4, a).await.unwrap();
        assert_eq!(interval(&mutator, c).await, (3, 4, 2));
        mutator.verify(TreeId::FIRST).await.unwrap();
    }

    #[tokio::test]
    async fn test_deferred_sibling_reorder_is_left_to_rebuild() {
        let mutator = create_mutator();
        let root = mutator.insert_root(OFF, 1, None).await.unwrap();
        let a = mutator.insert_child(OFF, 2, root).await.unwrap();
        let b = mutator.insert_child(OFF, 3, root).await.unwrap();
        let before = mutator.store().snapshot().await.unwrap();

        mutator.move_before(OFF, b, a).await.unwrap();
        assert_eq!(mutator.store().snapshot().await.unwrap(), before);

        // Placeholder siblings are ordered by id
        mutator.rebuild(TreeId::FIRST).await.unwrap();
        assert_eq!(interval(&mutator, a).await, (2, 3, 1));
        assert_eq!(interval(&mutator, b).await, (4, 5, 1));
    }

    #[tokio::test]
    async fn test_insert_root_into_occupied_tree() {
        let mutator = create_mutator();
        mutator.insert_root(ON, 1, Some(TreeId::FIRST)).await.unwrap();

        let err = mutator
            .insert_root(ON, 2, Some(TreeId::FIRST))
            .await
            .unwrap_err();
        assert!(matches!(err, ForestError::TreeExists { .. }));
        assert_eq!(mutator.store().snapshot().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_top_level_moves_renumber_sequential_trees() {
        let mutator = create_mutator();
        let first = mutator.insert_root(ON, 1, None).await.unwrap();
        let x = mutator.insert_child(ON, 2, first).await.unwrap();
        let second = mutator.insert_root(ON, 3, None).await.unwrap();
        assert_eq!(tree_of(&mutator, second).await, TreeId::Sequential(2));

        // X becomes its own tree right after the first one
        mutator.move_after(ON, x, first).await.unwrap();
        assert_eq!(tree_of(&mutator, first).await, TreeId::Sequential(1));
        assert_eq!(tree_of(&mutator, x).await, TreeId::Sequential(2));
        assert_eq!(tree_of(&mutator, second).await, TreeId::Sequential(3));
        assert_eq!(interval(&mutator, first).await, (1, 2, 0));
        assert_eq!(interval(&mutator, x).await, (1, 2, 0));
        assert_eq!(parent_of(&mutator, x).await, None);

        // The last tree moves to the front
        mutator.move_before(ON, second, first).await.unwrap();
        assert_eq!(tree_of(&mutator, second).await, TreeId::Sequential(1));
        assert_eq!(tree_of(&mutator, first).await, TreeId::Sequential(2));
        assert_eq!(tree_of(&mutator, x).await, TreeId::Sequential(3));

        // Appending allocates one past the maximum
        let y = mutator.insert_child(ON, 4, first).await.unwrap();
        mutator.make_root(ON, y).await.unwrap();
        assert_eq!(tree_of(&mutator, y).await, TreeId::Sequential(4));
        assert_eq!(interval(&mutator, first).await, (1, 2, 0));

        for tree in 1..=4 {
            mutator.verify(TreeId::Sequential(tree)).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_subtree_moves_between_trees() {
        let mutator = create_mutator();
        let s = build_sample(&mutator).await;
        let other = mutator.insert_root(ON, 200, None).await.unwrap();
        let leaf = mutator.insert_child(ON, 201, other).await.unwrap();

        mutator.move_inside(ON, s.a, leaf).await.unwrap();

        assert_eq!(interval(&mutator, s.root).await, (1, 6, 0));
        assert_eq!(interval(&mutator, other).await, (1, 10, 0));
        assert_eq!(interval(&mutator, leaf).await, (2, 9, 1));
        assert_eq!(interval(&mutator, s.a).await, (3, 8, 2));
        assert_eq!(interval(&mutator, s.a1).await, (4, 5, 3));
        assert_eq!(tree_of(&mutator, s.a2).await, TreeId::Sequential(2));

        mutator.verify(TreeId::Sequential(1)).await.unwrap();
        mutator.verify(TreeId::Sequential(2)).await.unwrap();
    }

    #[tokio::test]
    async fn test_derived_ids_reject_top_level_reordering() {
        let mutator = TreeMutator::new(
            Arc::new(MemoryNodeStore::new()),
            Arc::new(DerivedTreeIds::new()),
        );
        let first = mutator.insert_root(ON, 1, None).await.unwrap();
        let second = mutator.insert_root(ON, 2, None).await.unwrap();
        let child = mutator.insert_child(ON, 3, first).await.unwrap();
        assert!(!tree_of(&mutator, first).await.is_sequential());

        let before = mutator.store().snapshot().await.unwrap();
        let err = mutator.move_after(ON, child, second).await.unwrap_err();
        assert!(matches!(err, ForestError::Unsupported(_)));
        assert_eq!(mutator.store().snapshot().await.unwrap(), before);

        mutator.make_root(ON, child).await.unwrap();
        let tree = tree_of(&mutator, child).await;
        assert_ne!(tree, tree_of(&mutator, first).await);
        assert_ne!(tree, tree_of(&mutator, second).await);
        assert_eq!(interval(&mutator, child).await, (1, 2, 0));
        assert_eq!(interval(&mutator, first).await, (1, 2, 0));
    }

    #[tokio::test]
    async fn test_bulk_load_without_maintenance_then_rebuild() {
        let mutator = create_mutator();

        let root = mutator.insert_root(OFF, 1, None).await.unwrap();
        let c1 = mutator.insert_child(OFF, 2, root).await.unwrap();
        let c2 = mutator.insert_child(OFF, 3, root).await.unwrap();
        let g = mutator.insert_child(OFF, 4, c2).await.unwrap();
        let c3 = mutator.insert_child(OFF, 5, root).await.unwrap();
        assert_eq!(interval(&mutator, c2).await, (0, 0, 0));

        let tree = tree_of(&mutator, root).await;
        let report = mutator.rebuild(tree).await.unwrap();
        assert_eq!(report.node_count, 5);
        assert_eq!(report.max_right, 10);
        assert_eq!(interval(&mutator, root).await, (1, 10, 0));
        assert_eq!(interval(&mutator, c1).await, (2, 3, 1));
        assert_eq!(interval(&mutator, c2).await, (4, 7, 1));
        assert_eq!(interval(&mutator, g).await, (5, 6, 2));
        assert_eq!(interval(&mutator, c3).await, (8, 9, 1));
        mutator.verify(tree).await.unwrap();

        // Deferred move: only the parent pointer changes until the next rebuild
        mutator.move_inside(OFF, c3, c1).await.unwrap();
        assert_eq!(interval(&mutator, c3).await, (8, 9, 1));
        assert!(mutator.verify(tree).await.is_err());

        let err = mutator.move_inside(OFF, c2, g).await.unwrap_err();
        assert!(matches!(err, ForestError::CycleDetected { .. }));

        let removed = mutator.delete_subtree(OFF, c2).await.unwrap();
        assert_eq!(removed, 2);

        mutator.rebuild(tree).await.unwrap();
        assert_eq!(interval(&mutator, root).await, (1, 6, 0));
        assert_eq!(interval(&mutator, c1).await, (2, 5, 1));
        assert_eq!(interval(&mutator, c3).await, (3, 4, 2));
        mutator.verify(tree).await.unwrap();
    }

    #[tokio::test]
    async fn test_rebuild_preserves_valid_encoding() {
        let mutator = create_mutator();
        let s = build_sample(&mutator).await;
        mutator.move_after(ON, s.a, s.b).await.unwrap();
        let before = mutator.store().snapshot().await.unwrap();

        let report = mutator.rebuild(TreeId::Sequential(1)).await.unwrap();

        assert_eq!(report.node_count, 6);
        assert_eq!(report.max_right, 12);
        assert_eq!(mutator.store().snapshot().await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_rebuild_of_empty_tree() {
        let mutator = create_mutator();
        let report = mutator.rebuild(TreeId::Sequential(42)).await.unwrap();
        assert_eq!(report.node_count, 0);
        assert_eq!(report.max_right, 0);
    }
}

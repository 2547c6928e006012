//! Tree Identifier Allocation
//!
//! Two backends behind one trait, chosen when the `TreeMutator` is built:
//!
//! - `SequentialTreeIds` - one past the current maximum, `1` for an empty
//!   store. Supports the "+1 shift" renumbering used to place a tree between
//!   two others.
//! - `DerivedTreeIds` - a UUID v5 derived from a seed. Ids carry no order
//!   worth preserving, so top-level reordering is not supported.
//!
//! Neither backend is safe against concurrent allocators without external
//! serialization; allocation runs inside the caller's unit of work.

use crate::db::NodeTransaction;
use crate::models::TreeId;
use crate::services::error::ForestError;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

#[async_trait]
pub trait TreeIdAllocator: Send + Sync {
    /// Produce an identifier for a new tree
    async fn next_tree_id(&self, tx: &mut dyn NodeTransaction) -> Result<TreeId, ForestError>;

    /// Whether tree ids can be shifted to reorder trees
    fn supports_reordering(&self) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SequentialTreeIds;

#[async_trait]
impl TreeIdAllocator for SequentialTreeIds {
    async fn next_tree_id(&self, tx: &mut dyn NodeTransaction) -> Result<TreeId, ForestError> {
        let max = tx
            .max_tree_id()
            .await
            .map_err(|e| ForestError::allocation_failure(format!("Failed to read max tree id: {}", e)))?;

        match max {
            None => Ok(TreeId::FIRST),
            Some(TreeId::Sequential(n)) => Ok(TreeId::Sequential(n + 1)),
            Some(derived @ TreeId::Derived(_)) => Err(ForestError::allocation_failure(format!(
                "store holds derived tree id {}; sequential allocation needs integer ids",
                derived
            ))),
        }
    }

    fn supports_reordering(&self) -> bool {
        true
    }
}

/// Seed-derived tree identifiers
#[derive(Debug, Default)]
pub struct DerivedTreeIds {
    counter: AtomicU64,
}

impl DerivedTreeIds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deterministic id for a caller-supplied seed (timestamp, content hash)
    pub fn derive(seed: &[u8]) -> TreeId {
        TreeId::Derived(Uuid::new_v5(&Uuid::NAMESPACE_OID, seed))
    }
}

#[async_trait]
impl TreeIdAllocator for DerivedTreeIds {
    async fn next_tree_id(&self, _tx: &mut dyn NodeTransaction) -> Result<TreeId, ForestError> {
        let nanos = Utc::now()
            .timestamp_nanos_opt()
            .ok_or_else(|| ForestError::allocation_failure("clock out of range"))?;
        let sequence = self.counter.fetch_add(1, Ordering::Relaxed);
        let seed = format!("{}:{}", nanos, sequence);
        Ok(Self::derive(seed.as_bytes()))
    }

    fn supports_reordering(&self) -> bool {
        false
    }
}

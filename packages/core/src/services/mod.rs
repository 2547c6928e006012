//! Forest Services
//!
//! This module contains the engine that keeps the nested-set encoding
//! consistent:
//!
//! - `TreeMutator` - insert, move and delete as interval rewrites
//! - `RebuildEngine` - recompute a tree's intervals from parent pointers
//! - `TreeIdAllocator` - sequential or seed-derived tree identifiers
//! - `MaintenanceContext` - per-call switch between maintained and deferred mode
//!
//! Services run against any `NodeStore` and report failures as `ForestError`.

pub mod error;
mod integrity;
pub mod maintenance;
pub mod rebuild;
pub mod tree_ids;
pub mod tree_mutator;

pub use error::ForestError;
pub use integrity::verify_tree;
pub use maintenance::MaintenanceContext;
pub use rebuild::{RebuildEngine, RebuildReport};
pub use tree_ids::{DerivedTreeIds, SequentialTreeIds, TreeIdAllocator};
pub use tree_mutator::TreeMutator;

//! NodeForest Core - Nested-Set Forest Engine
//!
//! This crate keeps one or more trees in a single flat table using the
//! nested-set (interval) encoding, and keeps that encoding consistent across
//! inserts, moves, deletes and rebuilds.
//!
//! # Architecture
//!
//! - **Interval Encoding**: Each node stores `left`/`right`/`level`; a node's
//!   descendants are exactly the nodes whose interval it contains
//! - **Forest**: Trees share one table and are told apart by `tree_id`
//! - **Atomic Mutations**: Every mutation is one store transaction of bulk
//!   conditional updates
//! - **libsql/Turso**: Embedded SQLite-compatible database
//!
//! # Modules
//!
//! - [`models`] - Data structures (TreeNode, NodeId, TreeId)
//! - [`db`] - Storage layer with libsql and in-memory backends
//! - [`services`] - Mutation engine (TreeMutator, RebuildEngine, allocators)
//! - [`config`] - Store configuration from file or environment

pub mod config;
pub mod db;
pub mod models;
pub mod services;

// Re-export commonly used types
pub use config::{ConfigError, ForestConfig, TreeIdBackend};
pub use models::*;
pub use services::*;

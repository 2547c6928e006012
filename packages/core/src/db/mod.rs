//! Database Layer
//!
//! This module handles all storage of forest rows:
//!
//! - Database initialization and connection management (`DatabaseService`)
//! - The `NodeStore` / `NodeTransaction` abstraction the engine runs against
//! - Declarative bulk updates (`NodeFilter` + `ColumnUpdate`)
//! - Two backends: `TursoStore` (libsql) and `MemoryNodeStore`
//!
//! # Architecture
//!
//! Every row lives in one flat table (default `forest_nodes`). Trees are
//! distinguished by `tree_id`; the nested-set interval is stored as
//! `lft`/`rgt` to stay clear of SQL keywords.

mod database;
mod error;
mod memory_store;
mod node_store;
mod turso_store;

pub use database::{validate_table_name, DatabaseService, DEFAULT_TABLE_NAME};
pub use error::DatabaseError;
pub use memory_store::{MemoryNodeStore, MemoryTransaction};
pub use node_store::{
    apply_updates, ColumnUpdate, Comparison, Condition, IntColumn, NodeFilter, NodeStore,
    NodeTransaction,
};
pub use turso_store::{TursoStore, TursoTransaction};

//! Tree Identifiers
//!
//! A `TreeId` distinguishes independent trees sharing the forest table. It is
//! one opaque, totally ordered value with two representations:
//!
//! - `Sequential(i64)` - allocated as "one past the current maximum"
//! - `Derived(Uuid)` - derived deterministically from an external seed
//!
//! Sequential ids order before derived ids. This matches how SQLite orders the
//! untyped `tree_id` column (INTEGER values sort before TEXT values), so
//! `MAX(tree_id)` in SQL and `Ord` in Rust agree.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Identifier of one tree within the forest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TreeId {
    /// Integer identifier from the sequential backend
    Sequential(i64),

    /// Seed-derived identifier from the derived backend
    Derived(Uuid),
}

impl TreeId {
    /// First identifier handed out by the sequential backend
    pub const FIRST: TreeId = TreeId::Sequential(1);

    /// Integer value of a sequential id
    pub fn as_sequential(&self) -> Option<i64> {
        match self {
            TreeId::Sequential(n) => Some(*n),
            TreeId::Derived(_) => None,
        }
    }

    pub fn is_sequential(&self) -> bool {
        matches!(self, TreeId::Sequential(_))
    }
}

impl fmt::Display for TreeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TreeId::Sequential(n) => write!(f, "{}", n),
            TreeId::Derived(uuid) => write!(f, "{}", uuid.hyphenated()),
        }
    }
}

impl From<i64> for TreeId {
    fn from(value: i64) -> Self {
        TreeId::Sequential(value)
    }
}

impl From<Uuid> for TreeId {
    fn from(value: Uuid) -> Self {
        TreeId::Derived(value)
    }
}

impl FromStr for TreeId {
    type Err = uuid::Error;

    /// Parses either a decimal integer or a hyphenated UUID
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(n) = s.parse::<i64>() {
            return Ok(TreeId::Sequential(n));
        }
        Uuid::parse_str(s).map(TreeId::Derived)
    }
}

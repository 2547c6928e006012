//! Maintenance Context
//!
//! Whether a mutation runs the widen/shift/renumber algebra or only writes
//! parent pointers and placeholder intervals. The value is passed into every
//! `TreeMutator` call; there is no process-wide toggle.
//!
//! With maintenance disabled a bulk load costs one insert per node instead of
//! an O(n) rewrite per node. The caller must run `TreeMutator::rebuild` on
//! each touched tree before reading intervals again, and must keep readers
//! away from those trees until then.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceContext {
    enabled: bool,
}

impl MaintenanceContext {
    pub const ENABLED: Self = Self::new(true);
    pub const DISABLED: Self = Self::new(false);

    pub const fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub const fn enabled() -> Self {
        Self::ENABLED
    }

    pub const fn disabled() -> Self {
        Self::DISABLED
    }

    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl Default for MaintenanceContext {
    fn default() -> Self {
        Self::enabled()
    }
}

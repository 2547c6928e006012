//! Forest Configuration
//!
//! Store settings supplied once when the store is opened: where the
//! database lives, which table holds the forest, how tree ids are produced
//! and whether mutations maintain intervals by default.
//!
//! Settings come from a JSON file, from environment variables, or both
//! (file first, environment overrides):
//!
//! | variable                 | field                 |
//! |--------------------------|-----------------------|
//! | `NODEFOREST_DB_PATH`     | `database_path`       |
//! | `NODEFOREST_TABLE`       | `table_name`          |
//! | `NODEFOREST_MAINTENANCE` | `maintenance_enabled` |
//! | `NODEFOREST_TREE_IDS`    | `tree_ids`            |
//! | `NODEFOREST_CLEAR_DB`    | `clear_on_open`       |

use crate::db::{
    validate_table_name, DatabaseError, DatabaseService, NodeStore, TursoStore, DEFAULT_TABLE_NAME,
};
use crate::services::{DerivedTreeIds, MaintenanceContext, SequentialTreeIds, TreeIdAllocator};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Configuration loading errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid value {value:?} for {key}")]
    InvalidValue { key: String, value: String },

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Tree identifier backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TreeIdBackend {
    #[default]
    Sequential,
    Derived,
}

impl std::str::FromStr for TreeIdBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sequential" => Ok(Self::Sequential),
            "derived" => Ok(Self::Derived),
            other => Err(format!("unknown tree id backend '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestConfig {
    /// Database file (`~/.nodeforest/database/forest.db` by default)
    pub database_path: PathBuf,
    pub table_name: String,
    /// Default for `maintenance()`; callers may still pass their own context
    pub maintenance_enabled: bool,
    pub tree_ids: TreeIdBackend,
    /// Delete every row when the store is opened
    pub clear_on_open: bool,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            table_name: DEFAULT_TABLE_NAME.to_string(),
            maintenance_enabled: true,
            tree_ids: TreeIdBackend::default(),
            clear_on_open: false,
        }
    }
}

/// `~/.nodeforest/database/forest.db`, or a relative path when no home
/// directory is known
pub fn default_database_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".nodeforest")
        .join("database")
        .join("forest.db")
}

fn parse_flag(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

impl ForestConfig {
    /// Load from a JSON file; missing fields take their defaults
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply `NODEFOREST_*` overrides resolved through `lookup`
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("NODEFOREST_DB_PATH") {
            tracing::info!("Using database path from NODEFOREST_DB_PATH: {}", path);
            self.database_path = PathBuf::from(path);
        }
        if let Some(table) = lookup("NODEFOREST_TABLE") {
            self.table_name = table;
        }
        if let Some(flag) = lookup("NODEFOREST_MAINTENANCE") {
            self.maintenance_enabled = parse_flag("NODEFOREST_MAINTENANCE", &flag)?;
        }
        if let Some(backend) = lookup("NODEFOREST_TREE_IDS") {
            self.tree_ids = backend.parse().map_err(|_| ConfigError::InvalidValue {
                key: "NODEFOREST_TREE_IDS".to_string(),
                value: backend.clone(),
            })?;
        }
        if let Some(flag) = lookup("NODEFOREST_CLEAR_DB") {
            self.clear_on_open = parse_flag("NODEFOREST_CLEAR_DB", &flag)?;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_table_name(&self.table_name)?;
        Ok(())
    }

    pub fn maintenance(&self) -> MaintenanceContext {
        MaintenanceContext::new(self.maintenance_enabled)
    }

    pub fn tree_id_allocator(&self) -> Arc<dyn TreeIdAllocator> {
        match self.tree_ids {
            TreeIdBackend::Sequential => Arc::new(SequentialTreeIds),
            TreeIdBackend::Derived => Arc::new(DerivedTreeIds::new()),
        }
    }

    /// Open the configured libsql store, clearing it first if requested
    pub async fn open_store(&self) -> Result<TursoStore, DatabaseError> {
        let db = DatabaseService::with_table(self.database_path.clone(), &self.table_name).await?;
        let store = TursoStore::new(Arc::new(db));
        if self.clear_on_open {
            let removed = store.clear().await?;
            tracing::info!("Cleared {} rows from '{}'", removed, self.table_name);
        }
        Ok(store)
    }
}

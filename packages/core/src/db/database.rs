//! Database Connection Management
//!
//! This module provides the database connection and schema initialization
//! for the forest table using libsql/Turso.
//!
//! # Architecture
//!
//! - **Path-agnostic**: Accepts any valid PathBuf
//! - **One flat table**: Every tree of the forest lives in the same table,
//!   distinguished by `tree_id`
//! - **WAL mode**: Write-Ahead Logging so readers never block on the writer
//! - **Foreign keys**: `parent_id` references the same table
//!
//! # Database Connection Patterns
//!
//! **ALWAYS use `connect_with_timeout()` in async functions.** Every
//! connection gets a 5-second busy timeout and foreign key enforcement; both
//! are per-connection settings in SQLite.
//!
//! ```no_run
//! # use nodeforest_core::db::DatabaseService;
//! # use std::path::PathBuf;
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let db_service = DatabaseService::new(PathBuf::from("./data/forest.db")).await?;
//! let conn = db_service.connect_with_timeout().await?;
//! # Ok(())
//! # }
//! ```

use crate::db::error::DatabaseError;
use libsql::{Builder, Database};
use std::path::PathBuf;
use std::sync::Arc;

/// Table used when no name is configured
pub const DEFAULT_TABLE_NAME: &str = "forest_nodes";

/// Database service for managing libsql connection and schema
///
/// # Examples
///
/// ```no_run
/// use nodeforest_core::db::DatabaseService;
/// use std::path::PathBuf;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let db_path = PathBuf::from("/path/to/forest.db");
///     let db_service = DatabaseService::with_table(db_path, "category_tree").await?;
///     assert_eq!(db_service.table_name(), "category_tree");
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct DatabaseService {
    /// libsql database connection (wrapped in Arc for sharing)
    pub db: Arc<Database>,

    /// Path to the database file
    pub db_path: PathBuf,

    table_name: String,
}

/// Reject anything that is not a plain identifier; the name is spliced into SQL
pub fn validate_table_name(name: &str) -> Result<(), DatabaseError> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false);
    if !valid_start || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(DatabaseError::InvalidTableName(name.to_string()));
    }
    Ok(())
}

impl DatabaseService {
    /// Open the database at `db_path` using the default table name
    pub async fn new(db_path: PathBuf) -> Result<Self, DatabaseError> {
        Self::with_table(db_path, DEFAULT_TABLE_NAME).await
    }

    /// Open the database at `db_path`, storing nodes in `table_name`
    ///
    /// This will:
    /// 1. Validate the table name
    /// 2. Ensure the parent directory exists (create if needed)
    /// 3. Open/create the database file
    /// 4. Initialize the schema (CREATE TABLE IF NOT EXISTS)
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if:
    /// - The table name is not a plain identifier
    /// - Parent directory cannot be created
    /// - Database connection fails
    /// - Schema initialization fails
    pub async fn with_table(
        db_path: PathBuf,
        table_name: impl Into<String>,
    ) -> Result<Self, DatabaseError> {
        let table_name = table_name.into();
        validate_table_name(&table_name)?;

        // Only new databases need the WAL checkpoint after schema creation
        let is_new_database = !db_path.exists();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    if e.kind() == std::io::ErrorKind::PermissionDenied {
                        DatabaseError::permission_denied(db_path.clone())
                    } else {
                        DatabaseError::DirectoryCreationFailed(e)
                    }
                })?;
            }
        }

        let db = Builder::new_local(&db_path)
            .build()
            .await
            .map_err(|e| DatabaseError::connection_failed(db_path.clone(), e))?;

        let service = Self {
            db: Arc::new(db),
            db_path,
            table_name,
        };

        service.initialize_schema(is_new_database).await?;

        Ok(service)
    }

    /// Name of the forest table
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Execute a PRAGMA statement
    ///
    /// PRAGMA statements return rows, so we must use query() instead of execute().
    async fn execute_pragma(
        &self,
        conn: &libsql::Connection,
        pragma: &str,
    ) -> Result<(), DatabaseError> {
        let mut stmt = conn.prepare(pragma).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
        })?;
        let _ = stmt.query(()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
        })?;
        Ok(())
    }

    /// Initialize database schema and configuration
    ///
    /// Creates the forest table and its indexes using IF NOT EXISTS, so
    /// initialization is idempotent.
    ///
    /// `tree_id` is declared without a type so SQLite keeps integers as
    /// INTEGER (sequential ids) and UUID strings as TEXT (derived ids).
    /// Interval columns are named `lft`/`rgt` because LEFT and RIGHT are SQL
    /// keywords.
    async fn initialize_schema(&self, is_new_database: bool) -> Result<(), DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        self.execute_pragma(&conn, "PRAGMA journal_mode = WAL")
            .await?;

        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    parent_id INTEGER REFERENCES {table}(id),
                    payload_id INTEGER NOT NULL,
                    tree_id NOT NULL,
                    level INTEGER NOT NULL,
                    lft INTEGER NOT NULL,
                    rgt INTEGER NOT NULL,
                    created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                    updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
                )",
                table = self.table_name
            ),
            (),
        )
        .await
        .map_err(|e| {
            DatabaseError::initialization_failed(format!(
                "Failed to create {} table: {}",
                self.table_name, e
            ))
        })?;

        self.create_indexes(&conn).await?;

        if is_new_database {
            self.execute_pragma(&conn, "PRAGMA wal_checkpoint(TRUNCATE)")
                .await?;
        }

        tracing::info!(
            "Initialized forest table '{}' at {}",
            self.table_name,
            self.db_path.display()
        );

        Ok(())
    }

    /// Indexes backing the range scans and bulk updates of the engine
    async fn create_indexes(&self, conn: &libsql::Connection) -> Result<(), DatabaseError> {
        let indexes = [
            ("tree_lft", "tree_id, lft"),
            ("tree_rgt", "tree_id, rgt"),
            ("parent", "parent_id"),
        ];

        for (suffix, columns) in indexes {
            let name = format!("idx_{}_{}", self.table_name, suffix);
            conn.execute(
                &format!(
                    "CREATE INDEX IF NOT EXISTS {} ON {}({})",
                    name, self.table_name, columns
                ),
                (),
            )
            .await
            .map_err(|e| {
                DatabaseError::initialization_failed(format!(
                    "Failed to create index '{}': {}",
                    name, e
                ))
            })?;
        }

        Ok(())
    }

    /// Get a synchronous connection to the database
    ///
    /// **⚠️ WARNING**: The returned connection has neither the busy timeout nor
    /// foreign key enforcement. Use `connect_with_timeout()` in async code.
    pub fn connect(&self) -> Result<libsql::Connection, DatabaseError> {
        self.db.connect().map_err(DatabaseError::LibsqlError)
    }

    /// Get an async connection with busy timeout and foreign keys configured
    ///
    /// **✅ RECOMMENDED**: Use this for all async functions.
    ///
    /// The busy timeout makes a second writer wait for the first one's unit
    /// of work instead of failing immediately with `SQLITE_BUSY`.
    pub async fn connect_with_timeout(&self) -> Result<libsql::Connection, DatabaseError> {
        let conn = self.connect()?;

        self.execute_pragma(&conn, "PRAGMA busy_timeout = 5000")
            .await?;
        self.execute_pragma(&conn, "PRAGMA foreign_keys = ON")
            .await?;

        Ok(conn)
    }

    /// Flush the WAL before shutdown
    pub async fn db_close(&self) -> Result<(), DatabaseError> {
        let conn = self.connect_with_timeout().await?;
        self.execute_pragma(&conn, "PRAGMA wal_checkpoint(TRUNCATE)")
            .await?;
        Ok(())
    }
}

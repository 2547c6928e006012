//! TursoStore - NodeStore Implementation for Turso/libsql Backend
//!
//! This module implements the `NodeStore` trait on top of `DatabaseService`.
//! Each `NodeTransaction` owns a dedicated connection and wraps its work in
//! `BEGIN IMMEDIATE … COMMIT`, so:
//!
//! - a second writer waits (busy timeout) instead of interleaving its rewrite
//! - readers on other connections see either the state before the
//!   transaction or the state after it, never a half-applied rewrite
//! - a transaction dropped without `commit` is rolled back when its
//!   connection closes
//!
//! # SQL Translation
//!
//! A bulk update becomes exactly one `UPDATE` statement. Conditional shifts
//! are rendered as `CASE WHEN … THEN … ELSE … END`, which SQLite evaluates
//! against the pre-update row, matching `apply_updates`.
//!
//! # Examples
//!
//! ```rust,no_run
//! use nodeforest_core::db::{DatabaseService, NodeStore, TursoStore};
//! use std::path::PathBuf;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let db = Arc::new(DatabaseService::new(PathBuf::from("./data/forest.db")).await?);
//!     let store: Arc<dyn NodeStore> = Arc::new(TursoStore::new(db));
//!     let nodes = store.snapshot().await?;
//!     println!("{} nodes", nodes.len());
//!     Ok(())
//! }
//! ```

use crate::db::node_store::{NodeStore, NodeTransaction};
use crate::db::{
    ColumnUpdate, Comparison, DatabaseError, DatabaseService, IntColumn, NodeFilter,
};
use crate::models::{NewNode, NodeId, NodePosition, TreeId, TreeNode};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use libsql::params::Params;
use libsql::{Row, Value};
use std::ops::RangeInclusive;
use std::sync::Arc;

const NODE_COLUMNS: &str =
    "id, parent_id, payload_id, tree_id, level, lft, rgt, created_at, updated_at";

/// TursoStore implements NodeStore for the libsql backend
#[derive(Debug, Clone)]
pub struct TursoStore {
    db: Arc<DatabaseService>,
}

impl TursoStore {
    /// Create a new TursoStore over an initialized `DatabaseService`
    pub fn new(db: Arc<DatabaseService>) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Arc<DatabaseService> {
        &self.db
    }

    async fn open_transaction(&self, begin_sql: &str) -> Result<TursoTransaction, DatabaseError> {
        let conn = self.db.connect_with_timeout().await?;
        conn.execute(begin_sql, ()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to begin transaction: {}", e))
        })?;
        Ok(TursoTransaction {
            conn,
            table: self.db.table_name().to_string(),
            finished: false,
        })
    }
}

#[async_trait]
impl NodeStore for TursoStore {
    async fn begin(&self) -> Result<Box<dyn NodeTransaction>, DatabaseError> {
        Ok(Box::new(self.open_transaction("BEGIN IMMEDIATE").await?))
    }

    /// WAL readers see the last committed state without waiting for a writer
    async fn begin_read(&self) -> Result<Box<dyn NodeTransaction>, DatabaseError> {
        Ok(Box::new(self.open_transaction("BEGIN DEFERRED").await?))
    }
}

/// One unit of work on a dedicated connection
pub struct TursoTransaction {
    conn: libsql::Connection,
    table: String,
    finished: bool,
}

/// Parse timestamp from database - handles both SQLite and RFC3339 formats
fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, DatabaseError> {
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Ok(naive.and_utc());
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    Err(DatabaseError::corrupt_row(format!(
        "Unable to parse timestamp '{}' as SQLite or RFC3339 format",
        s
    )))
}

fn tree_id_to_value(tree_id: &TreeId) -> Value {
    match tree_id {
        TreeId::Sequential(n) => Value::Integer(*n),
        TreeId::Derived(uuid) => Value::Text(uuid.hyphenated().to_string()),
    }
}

fn tree_id_from_value(value: Value) -> Result<TreeId, DatabaseError> {
    match value {
        Value::Integer(n) => Ok(TreeId::Sequential(n)),
        Value::Text(s) => s
            .parse::<TreeId>()
            .map_err(|e| DatabaseError::corrupt_row(format!("Invalid tree_id '{}': {}", s, e))),
        other => Err(DatabaseError::corrupt_row(format!(
            "Unexpected tree_id value: {:?}",
            other
        ))),
    }
}

fn column_sql(column: IntColumn) -> &'static str {
    match column {
        IntColumn::Left => "lft",
        IntColumn::Right => "rgt",
        IntColumn::Level => "level",
    }
}

fn comparison_sql(op: Comparison) -> &'static str {
    match op {
        Comparison::Lt => "<",
        Comparison::Le => "<=",
        Comparison::Gt => ">",
        Comparison::Ge => ">=",
    }
}

/// Ids are plain integers, so they are inlined rather than bound; this keeps
/// large subtrees clear of SQLite's bound-parameter limit
fn id_list_sql(ids: &[NodeId]) -> String {
    ids.iter()
        .map(|id| id.0.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Render a `NodeFilter` as a WHERE clause body, appending bound values
fn filter_sql(filter: &NodeFilter, params: &mut Vec<Value>) -> String {
    let mut clauses = Vec::new();

    if let Some(tree_id) = &filter.tree_id {
        clauses.push("tree_id = ?".to_string());
        params.push(tree_id_to_value(tree_id));
    }
    if let Some(floor) = &filter.tree_id_at_least {
        clauses.push("tree_id >= ?".to_string());
        params.push(tree_id_to_value(floor));
    }
    for condition in &filter.conditions {
        clauses.push(format!(
            "{} {} ?",
            column_sql(condition.column),
            comparison_sql(condition.op)
        ));
        params.push(Value::Integer(condition.value));
    }
    if let Some(ids) = &filter.only_ids {
        if ids.is_empty() {
            clauses.push("0".to_string());
        } else {
            clauses.push(format!("id IN ({})", id_list_sql(ids)));
        }
    }

    if clauses.is_empty() {
        "1".to_string()
    } else {
        clauses.join(" AND ")
    }
}

/// Render the SET list of a bulk update, appending bound values
fn set_sql(updates: &[ColumnUpdate], params: &mut Vec<Value>) -> String {
    let mut assignments = Vec::new();

    for update in updates {
        match update {
            ColumnUpdate::Shift { column, delta } => {
                let col = column_sql(*column);
                assignments.push(format!("{} = {} + ?", col, col));
                params.push(Value::Integer(*delta));
            }
            ColumnUpdate::ShiftWhen {
                column,
                delta,
                when,
            } => {
                let col = column_sql(*column);
                assignments.push(format!(
                    "{} = CASE WHEN {} {} ? THEN {} + ? ELSE {} END",
                    col,
                    column_sql(when.column),
                    comparison_sql(when.op),
                    col,
                    col
                ));
                params.push(Value::Integer(when.value));
                params.push(Value::Integer(*delta));
            }
            ColumnUpdate::SetTreeId(tree_id) => {
                assignments.push("tree_id = ?".to_string());
                params.push(tree_id_to_value(tree_id));
            }
            ColumnUpdate::ShiftTreeId(delta) => {
                assignments.push("tree_id = tree_id + ?".to_string());
                params.push(Value::Integer(*delta));
            }
            ColumnUpdate::SetParent(parent_id) => {
                assignments.push("parent_id = ?".to_string());
                params.push(match parent_id {
                    Some(id) => Value::Integer(id.0),
                    None => Value::Null,
                });
            }
        }
    }

    assignments.push("updated_at = CURRENT_TIMESTAMP".to_string());
    assignments.join(", ")
}

impl TursoTransaction {
    fn ensure_open(&self) -> Result<(), DatabaseError> {
        if self.finished {
            return Err(DatabaseError::sql_execution("transaction already finished"));
        }
        Ok(())
    }

    /// Convert libsql::Row to TreeNode
    ///
    /// Expected columns (in order): see `NODE_COLUMNS`
    fn row_to_node(row: &Row) -> Result<TreeNode, DatabaseError> {
        let id: i64 = row.get(0)?;
        let parent_id: Option<i64> = row.get(1)?;
        let payload_id: i64 = row.get(2)?;
        let tree_id = tree_id_from_value(row.get_value(3)?)?;
        let level: i64 = row.get(4)?;
        let left: i64 = row.get(5)?;
        let right: i64 = row.get(6)?;
        let created_at_str: String = row.get(7)?;
        let updated_at_str: String = row.get(8)?;

        Ok(TreeNode {
            id: NodeId(id),
            parent_id: parent_id.map(NodeId),
            tree_id,
            level,
            left,
            right,
            payload_id,
            created_at: parse_timestamp(&created_at_str)?,
            updated_at: parse_timestamp(&updated_at_str)?,
        })
    }

    async fn query_nodes(
        &self,
        sql: &str,
        params: Vec<Value>,
    ) -> Result<Vec<TreeNode>, DatabaseError> {
        self.ensure_open()?;
        let mut rows = self
            .conn
            .query(sql, Params::Positional(params))
            .await
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to query nodes: {}", e)))?;

        let mut nodes = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::sql_execution(e.to_string()))?
        {
            nodes.push(Self::row_to_node(&row)?);
        }
        Ok(nodes)
    }

    async fn query_scalar(&self, sql: &str, params: Vec<Value>) -> Result<Value, DatabaseError> {
        self.ensure_open()?;
        let mut rows = self
            .conn
            .query(sql, Params::Positional(params))
            .await
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to query scalar: {}", e)))?;

        match rows
            .next()
            .await
            .map_err(|e| DatabaseError::sql_execution(e.to_string()))?
        {
            Some(row) => Ok(row.get_value(0)?),
            None => Ok(Value::Null),
        }
    }

    async fn execute(&self, sql: &str, params: Vec<Value>) -> Result<u64, DatabaseError> {
        self.ensure_open()?;
        let affected = self
            .conn
            .execute(sql, Params::Positional(params))
            .await
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to execute '{}': {}", sql, e)))?;
        Ok(affected as u64)
    }
}

#[async_trait]
impl NodeTransaction for TursoTransaction {
    async fn get(&mut self, id: NodeId) -> Result<Option<TreeNode>, DatabaseError> {
        let sql = format!("SELECT {} FROM {} WHERE id = ?", NODE_COLUMNS, self.table);
        let mut nodes = self.query_nodes(&sql, vec![Value::Integer(id.0)]).await?;
        Ok(nodes.pop())
    }

    async fn scan(
        &mut self,
        tree_id: TreeId,
        left_range: RangeInclusive<i64>,
    ) -> Result<Vec<TreeNode>, DatabaseError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE tree_id = ? AND lft BETWEEN ? AND ? ORDER BY lft, id",
            NODE_COLUMNS, self.table
        );
        self.query_nodes(
            &sql,
            vec![
                tree_id_to_value(&tree_id),
                Value::Integer(*left_range.start()),
                Value::Integer(*left_range.end()),
            ],
        )
        .await
    }

    async fn children(&mut self, parent_id: NodeId) -> Result<Vec<TreeNode>, DatabaseError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE parent_id = ? ORDER BY lft, id",
            NODE_COLUMNS, self.table
        );
        self.query_nodes(&sql, vec![Value::Integer(parent_id.0)])
            .await
    }

    async fn all_nodes(&mut self) -> Result<Vec<TreeNode>, DatabaseError> {
        let sql = format!(
            "SELECT {} FROM {} ORDER BY tree_id, lft, id",
            NODE_COLUMNS, self.table
        );
        self.query_nodes(&sql, Vec::new()).await
    }

    async fn max_right(&mut self, tree_id: TreeId) -> Result<Option<i64>, DatabaseError> {
        let sql = format!("SELECT MAX(rgt) FROM {} WHERE tree_id = ?", self.table);
        match self
            .query_scalar(&sql, vec![tree_id_to_value(&tree_id)])
            .await?
        {
            Value::Null => Ok(None),
            Value::Integer(n) => Ok(Some(n)),
            other => Err(DatabaseError::corrupt_row(format!(
                "Unexpected MAX(rgt) value: {:?}",
                other
            ))),
        }
    }

    async fn max_tree_id(&mut self) -> Result<Option<TreeId>, DatabaseError> {
        let sql = format!("SELECT MAX(tree_id) FROM {}", self.table);
        match self.query_scalar(&sql, Vec::new()).await? {
            Value::Null => Ok(None),
            value => tree_id_from_value(value).map(Some),
        }
    }

    async fn bulk_update(
        &mut self,
        filter: &NodeFilter,
        updates: &[ColumnUpdate],
    ) -> Result<u64, DatabaseError> {
        // SQLite would silently coerce a UUID string to 0 in `tree_id + ?`
        if updates
            .iter()
            .any(|u| matches!(u, ColumnUpdate::ShiftTreeId(_)))
        {
            let mut params = Vec::new();
            let where_sql = filter_sql(filter, &mut params);
            let sql = format!(
                "SELECT COUNT(*) FROM {} WHERE {} AND typeof(tree_id) != 'integer'",
                self.table, where_sql
            );
            if let Value::Integer(n) = self.query_scalar(&sql, params).await? {
                if n > 0 {
                    return Err(DatabaseError::UnsupportedUpdate(format!(
                        "cannot shift {} derived tree ids",
                        n
                    )));
                }
            }
        }

        let mut params = Vec::new();
        let set = set_sql(updates, &mut params);
        let where_sql = filter_sql(filter, &mut params);
        let sql = format!("UPDATE {} SET {} WHERE {}", self.table, set, where_sql);

        tracing::trace!("bulk update: {}", sql);
        self.execute(&sql, params).await
    }

    async fn set_positions(&mut self, positions: &[NodePosition]) -> Result<u64, DatabaseError> {
        let sql = format!(
            "UPDATE {} SET lft = ?, rgt = ?, level = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
            self.table
        );
        let mut affected = 0;
        for position in positions {
            affected += self
                .execute(
                    &sql,
                    vec![
                        Value::Integer(position.left),
                        Value::Integer(position.right),
                        Value::Integer(position.level),
                        Value::Integer(position.id.0),
                    ],
                )
                .await?;
        }
        Ok(affected)
    }

    async fn insert(&mut self, node: NewNode) -> Result<NodeId, DatabaseError> {
        let sql = format!(
            "INSERT INTO {} (parent_id, payload_id, tree_id, level, lft, rgt) VALUES (?, ?, ?, ?, ?, ?)",
            self.table
        );
        self.execute(
            &sql,
            vec![
                match node.parent_id {
                    Some(id) => Value::Integer(id.0),
                    None => Value::Null,
                },
                Value::Integer(node.payload_id),
                tree_id_to_value(&node.tree_id),
                Value::Integer(node.level),
                Value::Integer(node.left),
                Value::Integer(node.right),
            ],
        )
        .await?;
        Ok(NodeId(self.conn.last_insert_rowid()))
    }

    async fn delete_by_ids(&mut self, ids: &[NodeId]) -> Result<u64, DatabaseError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let sql = format!("DELETE FROM {} WHERE id IN ({})", self.table, id_list_sql(ids));
        self.execute(&sql, Vec::new()).await
    }

    async fn delete_all(&mut self) -> Result<u64, DatabaseError> {
        let sql = format!("DELETE FROM {}", self.table);
        self.execute(&sql, Vec::new()).await
    }

    async fn commit(&mut self) -> Result<(), DatabaseError> {
        self.ensure_open()?;
        self.finished = true;
        if let Err(e) = self.conn.execute("COMMIT", ()).await {
            let _rollback = self.conn.execute("ROLLBACK", ()).await;
            return Err(DatabaseError::sql_execution(format!(
                "Failed to commit transaction: {}",
                e
            )));
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), DatabaseError> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        self.conn.execute("ROLLBACK", ()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to roll back transaction: {}", e))
        })?;
        Ok(())
    }
}

impl Drop for TursoTransaction {
    fn drop(&mut self) {
        if !self.finished {
            tracing::debug!("Transaction on '{}' dropped without commit; rolled back on close", self.table);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Condition;

    #[test]
    fn test_filter_sql_binds_in_order() {
        let filter = NodeFilter::in_tree(TreeId::Sequential(3))
            .with(Condition::gt(IntColumn::Right, 7))
            .with(Condition::lt(IntColumn::Left, 0));
        let mut params = Vec::new();
        let sql = filter_sql(&filter, &mut params);

        assert_eq!(sql, "tree_id = ? AND rgt > ? AND lft < ?");
        assert_eq!(
            params,
            vec![Value::Integer(3), Value::Integer(7), Value::Integer(0)]
        );
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let mut params = Vec::new();
        assert_eq!(filter_sql(&NodeFilter::default(), &mut params), "1");
        assert_eq!(filter_sql(&NodeFilter::ids(vec![]), &mut params), "0");
    }

    #[test]
    fn test_set_sql_renders_case() {
        let mut params = Vec::new();
        let sql = set_sql(
            &[
                ColumnUpdate::Shift {
                    column: IntColumn::Right,
                    delta: -4,
                },
                ColumnUpdate::ShiftWhen {
                    column: IntColumn::Left,
                    delta: -4,
                    when: Condition::gt(IntColumn::Left, 5),
                },
            ],
            &mut params,
        );

        assert_eq!(
            sql,
            "rgt = rgt + ?, lft = CASE WHEN lft > ? THEN lft + ? ELSE lft END, updated_at = CURRENT_TIMESTAMP"
        );
        assert_eq!(
            params,
            vec![Value::Integer(-4), Value::Integer(5), Value::Integer(-4)]
        );
    }

    #[test]
    fn test_tree_id_value_conversion() {
        let uuid = uuid::Uuid::new_v4();
        let derived = TreeId::Derived(uuid);
        assert_eq!(
            tree_id_from_value(tree_id_to_value(&derived)).unwrap(),
            derived
        );
        assert!(tree_id_from_value(Value::Real(1.5)).is_err());
    }

    #[test]
    fn test_parse_timestamp_formats() {
        assert!(parse_timestamp("2025-01-03 10:20:30").is_ok());
        assert!(parse_timestamp("2025-01-03T10:20:30Z").is_ok());
        assert!(parse_timestamp("yesterday").is_err());
    }
}

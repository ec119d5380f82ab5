//! Query Executor
//!
//! Runs exactly one guarded SELECT against the read-only store handle
//! and returns all rows. No retries at this layer; retries belong to
//! the orchestrator's correction loop, before execution only.

use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Executor as _, Row, SqlitePool, Statement};
use std::path::Path;

use crate::error::PipelineError;

/// Column-ordered result of one executed statement.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ExecutionResult {
    pub columns: Vec<String>,
    pub rows: Vec<serde_json::Map<String, serde_json::Value>>,
}

impl ExecutionResult {
    /// Compact textual summary handed to the explanation stage: small
    /// result sets in full, larger ones as head, tail and total count.
    pub fn summary_for_explanation(&self) -> String {
        if self.rows.is_empty() {
            return "The query returned no rows.".to_string();
        }
        let mut out = format!("The query returned {} row(s).\n", self.rows.len());
        if self.rows.len() <= 5 {
            out.push_str("All rows:\n");
            for row in &self.rows {
                out.push_str(&serde_json::Value::Object(row.clone()).to_string());
                out.push('\n');
            }
        } else {
            out.push_str("First 3 rows:\n");
            for row in &self.rows[..3] {
                out.push_str(&serde_json::Value::Object(row.clone()).to_string());
                out.push('\n');
            }
            out.push_str("Last row:\n");
            if let Some(last) = self.rows.last() {
                out.push_str(&serde_json::Value::Object(last.clone()).to_string());
                out.push('\n');
            }
        }
        out
    }
}

/// Read-only executor owning the injected store handle.
///
/// The handle is created once at process startup and shared by all
/// concurrent pipeline runs; SQLite tolerates concurrent readers and
/// the read-only open rules out writer contention.
#[derive(Clone)]
pub struct QueryExecutor {
    pool: SqlitePool,
}

impl QueryExecutor {
    /// Open the store file read-only.
    pub async fn open_read_only(path: impl AsRef<Path>) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .read_only(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool (tests, embedded setups).
    pub fn with_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Prepare and run the statement, returning every row. Engine-level
    /// failures (syntax the guard missed, missing table, timeout) map to
    /// `PipelineError::Execution`.
    pub async fn execute(&self, sql: &str) -> Result<ExecutionResult, PipelineError> {
        // Prepare first so column names are known even for empty results.
        let columns = {
            let mut conn = self.pool.acquire().await?;
            let statement = (&mut *conn).prepare(sql).await?;
            statement
                .columns()
                .iter()
                .map(|c| c.name().to_string())
                .collect::<Vec<_>>()
        };

        let rows = sqlx::query(sql).fetch_all(&self.pool).await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut record = serde_json::Map::new();
            for (idx, column) in row.columns().iter().enumerate() {
                record.insert(column.name().to_string(), decode_value(row, idx));
            }
            out.push(record);
        }

        Ok(ExecutionResult { columns, rows: out })
    }
}

/// Decode one cell into JSON, trying SQLite's storage classes in order.
fn decode_value(row: &SqliteRow, idx: usize) -> serde_json::Value {
    if let Ok(value) = row.try_get::<Option<i64>, _>(idx) {
        return value.map(serde_json::Value::from).unwrap_or(serde_json::Value::Null);
    }
    if let Ok(value) = row.try_get::<Option<f64>, _>(idx) {
        return value.map(serde_json::Value::from).unwrap_or(serde_json::Value::Null);
    }
    if let Ok(value) = row.try_get::<Option<String>, _>(idx) {
        return value.map(serde_json::Value::from).unwrap_or(serde_json::Value::Null);
    }
    if let Ok(value) = row.try_get::<Option<Vec<u8>>, _>(idx) {
        // Blobs rendered as hex; the chat surface has no binary channel.
        return value
            .map(|bytes| {
                serde_json::Value::String(
                    bytes.iter().map(|b| format!("{:02x}", b)).collect::<String>(),
                )
            })
            .unwrap_or(serde_json::Value::Null);
    }
    serde_json::Value::Null
}

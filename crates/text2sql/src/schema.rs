//! Schema Context Builder
//!
//! Introspects the SQLite metadata catalog into a typed schema and
//! renders the fixed textual layout the prompts depend on.

use serde::Serialize;
use sqlx::{Row, SqlitePool};

use crate::error::PipelineError;
use crate::knowledge::ColumnMeanings;

/// One column of a table, as declared in the store's catalog.
#[derive(Debug, Clone, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    pub declared_type: String,
    pub primary_key: bool,
}

/// One table with its ordered column list.
#[derive(Debug, Clone, Serialize)]
pub struct TableInfo {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
}

impl TableInfo {
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name.eq_ignore_ascii_case(name))
    }
}

/// Description of all tables/columns available to the pipeline.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchemaContext {
    pub tables: Vec<TableInfo>,
}

impl SchemaContext {
    /// Read the table list and per-table column info from the store.
    pub async fn introspect(pool: &SqlitePool) -> Result<Self, PipelineError> {
        let names: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(pool)
        .await
        .map_err(|e| PipelineError::Schema(e.to_string()))?;

        let mut tables = Vec::with_capacity(names.len());
        for name in names {
            let pragma = format!("PRAGMA table_info(\"{}\")", name.replace('"', "\"\""));
            let rows = sqlx::query(&pragma)
                .fetch_all(pool)
                .await
                .map_err(|e| PipelineError::Schema(e.to_string()))?;

            let columns = rows
                .iter()
                .map(|row| ColumnInfo {
                    name: row.get::<String, _>("name"),
                    declared_type: row.get::<String, _>("type"),
                    primary_key: row.get::<i64, _>("pk") != 0,
                })
                .collect();

            tables.push(TableInfo { name, columns });
        }

        Ok(Self { tables })
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.table(name).is_some()
    }

    pub fn table(&self, name: &str) -> Option<&TableInfo> {
        self.tables
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(name))
    }

    /// Render the schema section of a prompt. Layout is fixed:
    ///
    /// ```text
    /// TABLE client
    ///   - client_id (INTEGER) [PRIMARY KEY]
    ///   - name (TEXT) - meaning: legal client name
    /// ```
    pub fn to_prompt_text(&self, meanings: &ColumnMeanings) -> String {
        let mut out = String::new();
        for table in &self.tables {
            out.push_str("TABLE ");
            out.push_str(&table.name);
            out.push('\n');
            for column in &table.columns {
                out.push_str("  - ");
                out.push_str(&column.name);
                out.push_str(" (");
                out.push_str(&column.declared_type);
                out.push(')');
                if column.primary_key {
                    out.push_str(" [PRIMARY KEY]");
                }
                if let Some(meaning) = meanings.get(&table.name, &column.name) {
                    out.push_str(" - meaning: ");
                    out.push_str(meaning);
                }
                out.push('\n');
            }
            out.push('\n');
        }
        out
    }
}

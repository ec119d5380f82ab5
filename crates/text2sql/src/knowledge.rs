//! Knowledge Provider
//!
//! Optional domain facts for prompting: a JSONL knowledge base plus a
//! per-table column-meaning map. A missing or unreadable file yields an
//! empty provider, never an error.

use std::collections::HashMap;
use std::path::Path;

/// Domain facts loaded from a JSONL file, one entry per line.
#[derive(Debug, Clone, Default)]
pub struct KnowledgeBase {
    entries: Vec<String>,
}

impl KnowledgeBase {
    pub fn new(entries: Vec<String>) -> Self {
        Self { entries }
    }

    /// Load from JSONL. Lines that do not parse as JSON are skipped
    /// with a warning; a missing file is an empty base.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                tracing::info!(path = %path.display(), error = %e, "no knowledge base loaded");
                return Self::default();
            }
        };

        let mut entries = Vec::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<serde_json::Value>(line) {
                Ok(value) => entries.push(render_entry(&value)),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping malformed knowledge entry");
                }
            }
        }

        tracing::info!(path = %path.display(), count = entries.len(), "knowledge base loaded");
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }
}

/// Flatten a knowledge entry into one prompt line.
fn render_entry(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Business meaning per table/column, merged into the schema prompt.
#[derive(Debug, Clone, Default)]
pub struct ColumnMeanings {
    by_table: HashMap<String, HashMap<String, String>>,
}

impl ColumnMeanings {
    /// Load from a JSON file shaped `{table: {column: meaning}}`.
    /// Missing or malformed files yield an empty map.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => return Self::default(),
        };
        match serde_json::from_str(&content) {
            Ok(by_table) => Self { by_table },
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "column meanings file malformed, ignoring");
                Self::default()
            }
        }
    }

    pub fn get(&self, table: &str, column: &str) -> Option<&str> {
        self.by_table
            .get(table)
            .and_then(|cols| cols.get(column))
            .map(String::as_str)
    }
}

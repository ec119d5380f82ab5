//! SQL Guard
//!
//! Static safety and schema-conformance checks applied to generated SQL
//! before anything reaches the store. Pure, no I/O, errors accumulate
//! so the self-correction stage sees the full set in one pass.

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::schema::SchemaContext;
use crate::stages::{Severity, ValidationReport};

/// Statement keywords that must never appear, as whole words.
const BANNED_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "CREATE", "ATTACH", "PRAGMA", "REPLACE",
    "TRUNCATE",
];

static BANNED_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(insert|update|delete|drop|alter|create|attach|pragma|replace|truncate)\b")
        .unwrap()
});

static TABLE_REF_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:from|join)\s+([A-Za-z_][A-Za-z0-9_]*)(?:\s+(?:as\s+)?([A-Za-z_][A-Za-z0-9_]*))?",
    )
    .unwrap()
});

static QUALIFIED_COL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([A-Za-z_][A-Za-z0-9_]*)\.([A-Za-z_][A-Za-z0-9_]*|\*)").unwrap());

static IDENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z_][A-Za-z0-9_]*").unwrap());

/// Words an identifier scan must not mistake for column references.
static RESERVED: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "select", "from", "where", "and", "or", "not", "null", "as", "join", "on", "inner",
        "left", "right", "full", "outer", "cross", "natural", "using", "group", "by", "order",
        "having", "limit", "offset", "distinct", "all", "union", "intersect", "except", "case",
        "when", "then", "else", "end", "like", "glob", "in", "is", "between", "exists", "asc",
        "desc", "with", "recursive", "cast", "collate", "escape", "current_date", "current_time",
        "current_timestamp", "over", "partition", "rows", "range", "preceding", "following",
        "unbounded", "current", "row", "filter", "true", "false", "count", "sum", "avg", "min",
        "max", "total", "abs", "round", "length", "upper", "lower", "substr", "coalesce",
        "ifnull", "nullif", "date", "time", "datetime", "julianday", "strftime", "group_concat",
        "printf", "typeof", "instr", "trim", "ltrim", "rtrim", "random", "hex", "quote", "iif",
    ]
    .into_iter()
    .collect()
});

/// Seam for the orchestrator: anything that can pass verdict on a
/// candidate statement before execution.
pub trait SqlValidator: Send + Sync {
    fn validate(&self, sql: &str, schema: &SchemaContext) -> ValidationReport;
}

/// The static guard. All rules run; nothing short-circuits.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlGuard;

impl SqlGuard {
    pub fn new() -> Self {
        Self
    }
}

impl SqlValidator for SqlGuard {
    fn validate(&self, sql: &str, schema: &SchemaContext) -> ValidationReport {
        let mut errors = Vec::new();
        let mut suggestions = Vec::new();
        let mut high = false;

        let trimmed = sql.trim();
        let trimmed = trimmed.strip_suffix(';').unwrap_or(trimmed).trim_end();

        if trimmed.is_empty() {
            return ValidationReport {
                is_valid: false,
                errors: vec!["statement is empty".to_string()],
                severity: Severity::High,
                suggestions: vec![],
            };
        }

        // Rule: single SELECT statement only.
        let first_word = trimmed.split_whitespace().next().unwrap_or("");
        if !first_word.eq_ignore_ascii_case("select") {
            errors.push(format!(
                "statement must begin with SELECT, found '{}'",
                first_word
            ));
            high = true;
        }

        // Rule: no second statement after a semicolon.
        let bare = strip_string_literals(trimmed);
        for (pos, _) in bare.match_indices(';') {
            if !bare[pos + 1..].trim().is_empty() {
                errors.push("multiple statements are not allowed".to_string());
                high = true;
                break;
            }
        }

        // Rule: no write/DDL keywords anywhere, as whole words.
        let mut seen = HashSet::new();
        for m in BANNED_RE.find_iter(trimmed) {
            let keyword = m.as_str().to_uppercase();
            if seen.insert(keyword.clone()) {
                errors.push(format!("forbidden keyword: {}", keyword));
                high = true;
            }
        }

        // Rule: balanced parentheses and terminated string literals.
        errors.extend(check_balance(trimmed));

        // Rule: referenced tables/columns must exist in the schema.
        check_identifiers(&bare, schema, &mut errors, &mut suggestions);

        let severity = if high {
            Severity::High
        } else if !errors.is_empty() {
            Severity::Medium
        } else {
            Severity::Low
        };

        ValidationReport {
            is_valid: errors.is_empty(),
            errors,
            severity,
            suggestions,
        }
    }
}

/// Replace the contents of string literals with spaces so identifier
/// and semicolon scans cannot be fooled by quoted text.
fn strip_string_literals(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut in_quote: Option<char> = None;
    for c in sql.chars() {
        match in_quote {
            Some(q) => {
                if c == q {
                    in_quote = None;
                    out.push(q);
                } else {
                    out.push(' ');
                }
            }
            None => {
                if c == '\'' || c == '"' {
                    in_quote = Some(c);
                }
                out.push(c);
            }
        }
    }
    out
}

fn check_balance(sql: &str) -> Vec<String> {
    let mut errors = Vec::new();
    let mut depth: i64 = 0;
    let mut in_quote: Option<char> = None;
    for c in sql.chars() {
        match in_quote {
            Some(q) => {
                if c == q {
                    in_quote = None;
                }
            }
            None => match c {
                '\'' | '"' => in_quote = Some(c),
                '(' => depth += 1,
                ')' => depth -= 1,
                _ => {}
            },
        }
    }
    if depth != 0 {
        errors.push("unbalanced parentheses".to_string());
    }
    if in_quote.is_some() {
        errors.push("unterminated string literal".to_string());
    }
    errors
}

/// Resolve table references (FROM/JOIN), aliases, qualified and bare
/// column identifiers against the schema. Anything that cannot be
/// resolved without a full SQL parser becomes a suggestion, not an
/// error, to avoid false rejections.
fn check_identifiers(
    bare: &str,
    schema: &SchemaContext,
    errors: &mut Vec<String>,
    suggestions: &mut Vec<String>,
) {
    // FROM/JOIN table references plus alias map.
    let mut alias_to_table: HashMap<String, String> = HashMap::new();
    let mut referenced_tables: Vec<String> = Vec::new();
    for caps in TABLE_REF_RE.captures_iter(bare) {
        let table = caps[1].to_string();
        if !schema.has_table(&table) {
            errors.push(format!("unknown table: {}", table));
        }
        alias_to_table.insert(table.to_lowercase(), table.clone());
        if let Some(alias) = caps.get(2) {
            let alias = alias.as_str();
            if !RESERVED.contains(alias.to_lowercase().as_str()) {
                alias_to_table.insert(alias.to_lowercase(), table.clone());
            }
        }
        if !referenced_tables.iter().any(|t| t.eq_ignore_ascii_case(&table)) {
            referenced_tables.push(table);
        }
    }

    // Qualified column references.
    for caps in QUALIFIED_COL_RE.captures_iter(bare) {
        let qualifier = caps[1].to_lowercase();
        let column = &caps[2];
        if column == "*" {
            continue;
        }
        match alias_to_table.get(&qualifier) {
            Some(table_name) => {
                if let Some(table) = schema.table(table_name) {
                    if !table.has_column(column) {
                        errors.push(format!(
                            "unknown column: {}.{} (table {} has no such column)",
                            &caps[1], column, table_name
                        ));
                    }
                }
            }
            None => suggestions.push(format!(
                "cannot resolve qualifier '{}' in '{}.{}'; verify it names a table or alias",
                &caps[1], &caps[1], column
            )),
        }
    }

    // Select-list aliases (`AS x`) are legal bare identifiers later on.
    let mut output_aliases: HashSet<String> = HashSet::new();
    let mut prev_token: Option<String> = None;
    for m in IDENT_RE.find_iter(bare) {
        let token = m.as_str().to_lowercase();
        if prev_token.as_deref() == Some("as") {
            output_aliases.insert(token.clone());
        }
        prev_token = Some(token);
    }

    // Bare column identifiers.
    for m in IDENT_RE.find_iter(bare) {
        let ident = m.as_str();
        let lower = ident.to_lowercase();
        if RESERVED.contains(lower.as_str())
            || alias_to_table.contains_key(&lower)
            || output_aliases.contains(&lower)
            || BANNED_KEYWORDS.iter().any(|k| k.eq_ignore_ascii_case(ident))
        {
            continue;
        }
        // Function call or part of a qualified reference.
        let after = &bare[m.end()..];
        if after.trim_start().starts_with('(') || after.starts_with('.') {
            continue;
        }
        if m.start() > 0 && bare[..m.start()].ends_with('.') {
            continue;
        }
        // Tail of a numeric literal, e.g. the e3 in 1e3 or x1f in 0x1f.
        if m.start() > 0 && bare.as_bytes()[m.start() - 1].is_ascii_digit() {
            continue;
        }

        let known = referenced_tables.iter().any(|t| {
            schema
                .table(t)
                .map(|info| info.has_column(ident))
                .unwrap_or(false)
        });
        if known {
            continue;
        }
        if referenced_tables.len() == 1 && schema.has_table(&referenced_tables[0]) {
            errors.push(format!(
                "unknown column: {} (table {} has no such column)",
                ident, referenced_tables[0]
            ));
        } else {
            suggestions.push(format!(
                "identifier '{}' was not found in the referenced tables; verify it is a column or alias",
                ident
            ));
        }
    }
}

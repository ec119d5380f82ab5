//! Prompt Builder
//!
//! Stage instructions plus pure assembly of the per-stage user prompt.
//! Section order is a contract the model depends on: schema, knowledge,
//! clarifications, conversation history, user query. Empty sections are
//! omitted entirely, never emitted as a bare header.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::pipeline::Exchange;

/// Prior exchanges kept in the prompt, newest last.
pub const MAX_HISTORY_EXCHANGES: usize = 6;

pub const AMBIGUITY_DETECTION: &str = r#"You are an ambiguity detection system.
Your task is to analyze a user query and detect whether it is ambiguous, incomplete, or unclear in any way.

You must NOT:
- generate SQL
- rephrase the question
- add information
- assume context

Your job is ONLY to determine if clarification is needed.

Output the result as JSON:

{
  "stage": "ambiguity_detection",
  "is_ambiguous": true/false,
  "reason": "Explanation why",
  "questions": ["Clarifying question 1", "Clarifying question 2"]
}

Rules:
- If ANY term could be interpreted differently -> is_ambiguous = true
- If a value is vague (e.g. "high", "large", "recent") -> ambiguous
- If the question references data not in the schema -> ambiguous
- If a clarification below already answers the vague term -> NOT ambiguous
- If user intent is clear -> false"#;

pub const KNOWLEDGE_SEARCH: &str = r#"You are a knowledge retrieval system.
Your task is to search a knowledge base for relevant facts that help answer the user query.

Input:
- User query
- Clarifications (if any)
- Knowledge base (list of entries)

Output (JSON):

{
  "stage": "knowledge_search",
  "relevant_knowledge": ["..."]
}

Rules:
- Return only relevant facts
- No SQL generation
- No hallucinations
- If nothing matches -> return an empty list"#;

pub const SQL_GENERATION: &str = r#"You are an expert SQL developer specializing in SQLite.
Your task is to convert the user query into a valid, safe, and correct SQL query.

You have access to:
- Database schema
- Knowledge base facts
- User clarifications
- Conversation history

Output MUST be JSON:

{
  "stage": "sql_generation",
  "thought_process": "Step-by-step reasoning",
  "sql": "SELECT ...",
  "explanation": "What the SQL does",
  "confidence": 0.0-1.0,
  "questions": []
}

Strict SQL rules:
- Use ONLY tables and columns from the schema.
- Never invent columns.
- SQL must be executable by SQLite.
- The query MUST be a single SELECT statement.
- Keep SQL minimal and precise.
- The query must start with the SELECT keyword; do not use WITH clauses.
- If SQL cannot be created -> "sql": null and ask questions."#;

pub const SELF_CORRECTION: &str = r#"You are an SQL correction system.
Your task is to fix SQL errors identified by the validator.

Input:
- Original SQL
- Validation errors
- Schema

Output JSON:

{
  "stage": "self_correction",
  "fixed_sql": "SELECT ...",
  "changes": ["..."],
  "confidence": 0.0-1.0
}

Rules:
- Fix ONLY what is necessary.
- Preserve query intent.
- Never invent columns or tables.
- If no fix is possible -> fixed_sql = null."#;

pub const EXPLANATION: &str = r#"You are an explanation generator.
Your job is to explain database results to a non-technical user.

Input:
- User query
- SQL query
- SQL results

Output JSON:

{
  "stage": "explanation",
  "natural_language_explanation": "..."
}

Rules:
- No SQL terminology.
- No jargon.
- Explain like talking to a beginner.
- Short and friendly."#;

/// Few-shot examples carried in the generation prompt. Kept small and
/// fixed; they demonstrate the expected SQL register, not the schema.
const FEW_SHOT_EXAMPLES: &[(&str, &str, &str)] = &[
    (
        "How many customers are there in total?",
        "SELECT COUNT(*) AS total_customers FROM client;",
        "Simple aggregation with COUNT(*)",
    ),
    (
        "Show me the top 5 customers by transaction volume",
        "SELECT c.client_id, SUM(t.amount) AS total_amount FROM client c JOIN trans t ON c.client_id = t.client_id GROUP BY c.client_id ORDER BY total_amount DESC LIMIT 5;",
        "JOIN, GROUP BY and ORDER BY with LIMIT",
    ),
    (
        "Which accounts have a negative balance?",
        "SELECT account_id, balance FROM account WHERE balance < 0;",
        "Simple filter with a WHERE clause",
    ),
];

/// Assemble the shared context sections in the contractual order.
fn push_sections(
    prompt: &mut String,
    schema_context: Option<&str>,
    knowledge: &[String],
    clarifications: &BTreeMap<String, String>,
    history: &[Exchange],
) {
    if let Some(schema) = schema_context {
        let _ = write!(prompt, "\n\n## DATABASE SCHEMA\n\n{}", schema);
    }

    if !knowledge.is_empty() {
        prompt.push_str("\n\n## DOMAIN KNOWLEDGE\n\n");
        for fact in knowledge {
            let _ = writeln!(prompt, "- {}", fact);
        }
    }

    if !clarifications.is_empty() {
        prompt.push_str("\n\n## USER CLARIFICATIONS\n\n");
        for (question, answer) in clarifications {
            let _ = write!(prompt, "Q: {}\nA: {}\n\n", question, answer);
        }
    }

    if !history.is_empty() {
        prompt.push_str("\n\n## CONVERSATION HISTORY\n\n");
        let start = history.len().saturating_sub(MAX_HISTORY_EXCHANGES);
        for exchange in &history[start..] {
            let _ = write!(prompt, "User: {}\nSQL: {}\n\n", exchange.user, exchange.sql);
        }
    }
}

/// User prompt for the ambiguity detection stage.
pub fn ambiguity_prompt(
    question: &str,
    schema_context: &str,
    clarifications: &BTreeMap<String, String>,
    history: &[Exchange],
) -> String {
    let mut prompt = String::new();
    push_sections(&mut prompt, Some(schema_context), &[], clarifications, history);
    let _ = write!(prompt, "\n\n## USER QUERY\n\n{}", question);
    prompt.trim_start().to_string()
}

/// User prompt for the knowledge retrieval stage.
pub fn knowledge_prompt(
    question: &str,
    knowledge_entries: &[String],
    clarifications: &BTreeMap<String, String>,
) -> String {
    let mut prompt = String::from("## KNOWLEDGE BASE\n\n");
    for entry in knowledge_entries {
        let _ = writeln!(prompt, "- {}", entry);
    }
    push_sections(&mut prompt, None, &[], clarifications, &[]);
    let _ = write!(prompt, "\n\n## USER QUERY\n\n{}", question);
    prompt
}

/// User prompt for the SQL generation stage.
pub fn generation_prompt(
    question: &str,
    schema_context: &str,
    knowledge: &[String],
    clarifications: &BTreeMap<String, String>,
    history: &[Exchange],
) -> String {
    let mut prompt = String::new();
    push_sections(
        &mut prompt,
        Some(schema_context),
        knowledge,
        clarifications,
        history,
    );

    prompt.push_str("\n\n## EXAMPLES\n\n");
    for (i, (q, sql, note)) in FEW_SHOT_EXAMPLES.iter().enumerate() {
        let _ = write!(
            prompt,
            "Example {}:\nQuestion: {}\nSQL: {}\nNote: {}\n\n",
            i + 1,
            q,
            sql,
            note
        );
    }

    let _ = write!(prompt, "\n## USER QUERY\n\n{}", question);
    prompt.trim_start().to_string()
}

/// User prompt for the self-correction stage.
pub fn correction_prompt(sql: &str, errors: &[String], schema_context: &str) -> String {
    let mut prompt = String::from("## ORIGINAL SQL\n\n");
    prompt.push_str(sql);
    prompt.push_str("\n\n## VALIDATION ERRORS\n\n");
    for error in errors {
        let _ = writeln!(prompt, "- {}", error);
    }
    let _ = write!(prompt, "\n## DATABASE SCHEMA\n\n{}", schema_context);
    prompt
}

/// User prompt for the explanation stage.
pub fn explanation_prompt(question: &str, sql: &str, results_summary: &str) -> String {
    format!(
        "## USER QUERY\n\n{}\n\n## SQL\n\n{}\n\n## RESULTS\n\n{}",
        question, sql, results_summary
    )
}

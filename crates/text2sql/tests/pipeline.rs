//! End-to-end orchestrator tests with a scripted model client and an
//! in-memory SQLite store.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use text2sql::stages::{Severity, ValidationReport};
use text2sql::{
    ColumnMeanings, KnowledgeBase, LlmClient, Pipeline, PipelineConfig, PipelineRequest,
    PipelineStatus, QueryExecutor, SchemaContext, SqlValidator,
};

/// Replays canned responses in order; errors once the script runs dry.
struct ScriptedClient {
    responses: Mutex<VecDeque<String>>,
}

impl ScriptedClient {
    fn new(responses: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.iter().map(|s| s.to_string()).collect()),
        })
    }
}

#[async_trait]
impl LlmClient for ScriptedClient {
    async fn chat(&self, _system_prompt: &str, _user_prompt: &str) -> anyhow::Result<String> {
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("scripted client exhausted"))
    }

    async fn chat_json(&self, system_prompt: &str, user_prompt: &str) -> anyhow::Result<String> {
        self.chat(system_prompt, user_prompt).await
    }

    fn model_name(&self) -> &str {
        "scripted"
    }

    fn provider_name(&self) -> &str {
        "test"
    }
}

/// Rejects every statement and counts how often it was asked.
struct AlwaysInvalid {
    calls: AtomicUsize,
}

impl SqlValidator for AlwaysInvalid {
    fn validate(&self, _sql: &str, _schema: &SchemaContext) -> ValidationReport {
        self.calls.fetch_add(1, Ordering::SeqCst);
        ValidationReport {
            is_valid: false,
            errors: vec!["statement rejected".to_string()],
            severity: Severity::High,
            suggestions: vec![],
        }
    }
}

async fn seeded_pool() -> SqlitePool {
    // One connection so every statement sees the same in-memory store.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    sqlx::query("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT, status TEXT)")
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query("INSERT INTO users (name, status) VALUES ('alice', 'active')")
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query("INSERT INTO users (name, status) VALUES ('bob', 'active')")
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query("INSERT INTO users (name, status) VALUES ('carol', 'disabled')")
        .execute(&pool)
        .await
        .unwrap();
    pool
}

async fn pipeline_with(responses: &[&str]) -> Pipeline {
    let pool = seeded_pool().await;
    Pipeline::new(
        ScriptedClient::new(responses),
        QueryExecutor::with_pool(pool),
        KnowledgeBase::default(),
        ColumnMeanings::default(),
        PipelineConfig::default(),
    )
}

const NOT_AMBIGUOUS: &str = r#"{"is_ambiguous": false, "reason": "", "questions": []}"#;

fn request(question: &str) -> PipelineRequest {
    PipelineRequest {
        question: question.to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_success_path_counts_active_users() {
    let pipeline = pipeline_with(&[
        NOT_AMBIGUOUS,
        r#"{"thought_process": "count rows with status active",
            "sql": "SELECT COUNT(*) AS active_users FROM users WHERE status = 'active'",
            "explanation": "Counts active users",
            "confidence": 0.9,
            "questions": []}"#,
        r#"{"natural_language_explanation": "There are 2 active users."}"#,
    ])
    .await;

    let result = pipeline.run(&request("How many active users are there?")).await;

    assert_eq!(result.status, PipelineStatus::Success);
    assert_eq!(
        result.sql.as_deref(),
        Some("SELECT COUNT(*) AS active_users FROM users WHERE status = 'active'")
    );
    let rows = &result.results.unwrap().rows;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["active_users"], serde_json::json!(2));
    assert_eq!(
        result.explanation.as_deref(),
        Some("There are 2 active users.")
    );
    assert_eq!(result.confidence, Some(0.9));
    assert!(result.questions.is_empty());
}

#[tokio::test]
async fn test_ambiguous_question_returns_questions_verbatim() {
    let pipeline = pipeline_with(&[
        r#"{"is_ambiguous": true,
            "reason": "'recent' is vague",
            "questions": ["What time range do you mean by recent?"]}"#,
    ])
    .await;

    let result = pipeline.run(&request("Show me recent users")).await;

    assert_eq!(result.status, PipelineStatus::NeedsClarification);
    assert_eq!(
        result.questions,
        vec!["What time range do you mean by recent?".to_string()]
    );
    assert!(result.sql.is_none());
    assert!(result.results.is_none());
}

#[tokio::test]
async fn test_ambiguous_without_questions_still_asks_something() {
    let pipeline = pipeline_with(&[
        r#"{"is_ambiguous": true, "reason": "unclear", "questions": []}"#,
    ])
    .await;

    let result = pipeline.run(&request("things?")).await;

    assert_eq!(result.status, PipelineStatus::NeedsClarification);
    assert!(!result.questions.is_empty());
}

#[tokio::test]
async fn test_mutating_sql_is_rejected_when_correction_gives_up() {
    let pipeline = pipeline_with(&[
        NOT_AMBIGUOUS,
        r#"{"thought_process": "", "sql": "DROP TABLE users",
            "explanation": "", "confidence": 0.8, "questions": []}"#,
        r#"{"fixed_sql": null, "changes": [], "confidence": 0.0}"#,
    ])
    .await;

    let result = pipeline.run(&request("Delete everything")).await;

    assert_eq!(result.status, PipelineStatus::Error);
    assert!(result.sql.is_none());
    assert!(result.results.is_none());
    let explanation = result.explanation.unwrap();
    assert!(explanation.contains("forbidden keyword"), "{}", explanation);
}

#[tokio::test]
async fn test_unknown_table_is_reported() {
    let pipeline = pipeline_with(&[
        NOT_AMBIGUOUS,
        r#"{"thought_process": "", "sql": "SELECT * FROM ghost_table",
            "explanation": "", "confidence": 0.7, "questions": []}"#,
        r#"{"fixed_sql": null, "changes": [], "confidence": 0.0}"#,
    ])
    .await;

    let result = pipeline.run(&request("Show ghosts")).await;

    assert_eq!(result.status, PipelineStatus::Error);
    let explanation = result.explanation.unwrap();
    assert!(explanation.contains("ghost_table"), "{}", explanation);
}

#[tokio::test]
async fn test_correction_repairs_unknown_column() {
    let pipeline = pipeline_with(&[
        NOT_AMBIGUOUS,
        r#"{"thought_process": "", "sql": "SELECT username FROM users",
            "explanation": "", "confidence": 0.6, "questions": []}"#,
        r#"{"fixed_sql": "SELECT name FROM users",
            "changes": ["replaced username with name"], "confidence": 0.85}"#,
        r#"{"natural_language_explanation": "Here are the user names."}"#,
    ])
    .await;

    let result = pipeline.run(&request("List user names")).await;

    assert_eq!(result.status, PipelineStatus::Success);
    assert_eq!(result.sql.as_deref(), Some("SELECT name FROM users"));
    assert_eq!(result.confidence, Some(0.85));
    assert_eq!(result.results.unwrap().rows.len(), 3);
}

#[tokio::test]
async fn test_correction_loop_is_bounded() {
    let validator = Arc::new(AlwaysInvalid {
        calls: AtomicUsize::new(0),
    });
    let pipeline = pipeline_with(&[
        NOT_AMBIGUOUS,
        r#"{"thought_process": "", "sql": "SELECT name FROM users",
            "explanation": "", "confidence": 0.9, "questions": []}"#,
        r#"{"fixed_sql": "SELECT id FROM users", "changes": [], "confidence": 0.9}"#,
    ])
    .await
    .with_validator(validator.clone());

    let result = pipeline.run(&request("List user names")).await;

    assert_eq!(result.status, PipelineStatus::Error);
    // Default allows one correction attempt: initial check plus re-check.
    assert_eq!(validator.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_null_sql_asks_for_clarification() {
    let pipeline = pipeline_with(&[
        NOT_AMBIGUOUS,
        r#"{"thought_process": "cannot map the question to the schema",
            "sql": null, "explanation": "", "confidence": 0.0,
            "questions": ["Which table holds the orders?"]}"#,
    ])
    .await;

    let result = pipeline.run(&request("Show order margins")).await;

    assert_eq!(result.status, PipelineStatus::NeedsClarification);
    assert_eq!(
        result.questions,
        vec!["Which table holds the orders?".to_string()]
    );
}

#[tokio::test]
async fn test_unparseable_stage_output_is_an_error() {
    let pipeline = pipeline_with(&[NOT_AMBIGUOUS, "here is your SQL: SELECT 1"]).await;

    let result = pipeline.run(&request("anything")).await;

    assert_eq!(result.status, PipelineStatus::Error);
    let explanation = result.explanation.unwrap();
    assert!(explanation.contains("sql_generation"), "{}", explanation);
}

#[tokio::test]
async fn test_gateway_failure_is_an_error() {
    let pipeline = pipeline_with(&[]).await;

    let result = pipeline.run(&request("anything")).await;

    assert_eq!(result.status, PipelineStatus::Error);
    assert!(result.explanation.unwrap().contains("gateway"));
}

#[tokio::test]
async fn test_explanation_failure_falls_back_to_candidate_explanation() {
    // Script ends before the explanation stage.
    let pipeline = pipeline_with(&[
        NOT_AMBIGUOUS,
        r#"{"thought_process": "", "sql": "SELECT name FROM users",
            "explanation": "Lists every user name.", "confidence": 0.9,
            "questions": []}"#,
    ])
    .await;

    let result = pipeline.run(&request("List user names")).await;

    assert_eq!(result.status, PipelineStatus::Success);
    assert_eq!(result.explanation.as_deref(), Some("Lists every user name."));
}

#[tokio::test]
async fn test_same_request_gives_same_result() {
    let responses = [
        NOT_AMBIGUOUS,
        r#"{"thought_process": "", "sql": "SELECT name FROM users ORDER BY id",
            "explanation": "", "confidence": 0.9, "questions": []}"#,
        r#"{"natural_language_explanation": "All user names, oldest first."}"#,
    ];
    let first = pipeline_with(&responses).await.run(&request("names")).await;
    let second = pipeline_with(&responses).await.run(&request("names")).await;
    assert_eq!(first, second);
    assert_eq!(first.status, PipelineStatus::Success);
}

#[tokio::test]
async fn test_confidence_is_clamped() {
    let pipeline = pipeline_with(&[
        NOT_AMBIGUOUS,
        r#"{"thought_process": "", "sql": "SELECT name FROM users",
            "explanation": "", "confidence": 1.7, "questions": []}"#,
        r#"{"natural_language_explanation": "done"}"#,
    ])
    .await;

    let result = pipeline.run(&request("names")).await;
    assert_eq!(result.confidence, Some(1.0));
}

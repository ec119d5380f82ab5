//! REST API endpoints for the text2sql pipeline
//!
//! `/api/query` runs the full staged pipeline; `/api/health` and
//! `/api/schema` never touch the language model.

use std::collections::BTreeMap;

use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use serde_json::json;

use text2sql::{Exchange, PipelineRequest, PipelineStatus};

use crate::state::AppState;

/// Rows returned over HTTP are capped; the explanation stage still saw
/// the full count.
const MAX_RESPONSE_ROWS: usize = 50;

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub question: String,
    #[serde(default)]
    pub conversation_history: Vec<Exchange>,
    #[serde(default)]
    pub clarification_answers: BTreeMap<String, String>,
}

pub async fn query(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> (StatusCode, Json<serde_json::Value>) {
    let pipeline_request = PipelineRequest {
        question: request.question,
        clarification_answers: request.clarification_answers,
        conversation_window: request.conversation_history,
    };

    let result = state.pipeline.run(&pipeline_request).await;
    match result.status {
        PipelineStatus::Success => {
            let mut execution = result.results.unwrap_or_default();
            let row_count = execution.rows.len();
            execution.rows.truncate(MAX_RESPONSE_ROWS);
            (
                StatusCode::OK,
                Json(json!({
                    "status": "success",
                    "sql": result.sql,
                    "results": execution.rows,
                    "row_count": row_count,
                    "explanation": result.explanation,
                    "confidence": result.confidence,
                })),
            )
        }
        PipelineStatus::NeedsClarification => (
            StatusCode::OK,
            Json(json!({
                "status": "needs_clarification",
                "questions": result.questions,
            })),
        ),
        PipelineStatus::Error => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "status": "error",
                "message": result
                    .explanation
                    .unwrap_or_else(|| "pipeline failed".to_string()),
            })),
        ),
    }
}

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Debug view of the introspected schema.
pub async fn schema(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let schema = state.pipeline.schema().await.map_err(|e| {
        tracing::error!("schema introspection failed: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    Ok(Json(json!({ "tables": schema.tables })))
}

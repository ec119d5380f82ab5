//! Pipeline Orchestrator
//!
//! Runs the staged protocol: ambiguity check, knowledge retrieval, SQL
//! generation, guard validation with a bounded self-correction loop,
//! execution, explanation. Stateless between invocations; every request
//! gets fresh stage state and the attempt counter is explicit.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::executor::{ExecutionResult, QueryExecutor};
use crate::guard::{SqlGuard, SqlValidator};
use crate::knowledge::{ColumnMeanings, KnowledgeBase};
use crate::llm_client::LlmClient;
use crate::prompt;
use crate::schema::SchemaContext;
use crate::stages::{
    decode_stage, AmbiguityResult, CorrectionResult, ExplanationResult, KnowledgeResult,
    SqlCandidate,
};

/// One prior exchange in the caller-owned conversation window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exchange {
    pub user: String,
    #[serde(default)]
    pub sql: String,
}

/// Immutable input for one pipeline run.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PipelineRequest {
    pub question: String,
    #[serde(default)]
    pub clarification_answers: BTreeMap<String, String>,
    #[serde(default)]
    pub conversation_window: Vec<Exchange>,
}

/// Terminal status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    Success,
    NeedsClarification,
    Error,
}

/// Final response returned to the caller.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PipelineResult {
    pub status: PipelineStatus,
    pub sql: Option<String>,
    pub results: Option<ExecutionResult>,
    pub explanation: Option<String>,
    pub confidence: Option<f32>,
    pub questions: Vec<String>,
}

impl PipelineResult {
    fn error(message: String) -> Self {
        Self {
            status: PipelineStatus::Error,
            sql: None,
            results: None,
            explanation: Some(message),
            confidence: None,
            questions: vec![],
        }
    }

    /// Clarification responses always carry at least one question.
    fn needs_clarification(mut questions: Vec<String>, reason: Option<String>) -> Self {
        if questions.is_empty() {
            questions.push(
                "Could you restate the question with more detail about the data you want to see?"
                    .to_string(),
            );
        }
        Self {
            status: PipelineStatus::NeedsClarification,
            sql: None,
            results: None,
            explanation: reason.filter(|r| !r.is_empty()),
            confidence: None,
            questions,
        }
    }
}

/// The orchestrator. Owns its collaborators; no state survives a run.
pub struct Pipeline {
    client: Arc<dyn LlmClient>,
    validator: Arc<dyn SqlValidator>,
    executor: QueryExecutor,
    knowledge: KnowledgeBase,
    meanings: ColumnMeanings,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(
        client: Arc<dyn LlmClient>,
        executor: QueryExecutor,
        knowledge: KnowledgeBase,
        meanings: ColumnMeanings,
        config: PipelineConfig,
    ) -> Self {
        Self {
            client,
            validator: Arc::new(SqlGuard::new()),
            executor,
            knowledge,
            meanings,
            config,
        }
    }

    /// Replace the guard (tests stub this seam).
    pub fn with_validator(mut self, validator: Arc<dyn SqlValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn executor(&self) -> &QueryExecutor {
        &self.executor
    }

    /// Introspect the target schema (also the /api/schema debug surface).
    pub async fn schema(&self) -> Result<SchemaContext, PipelineError> {
        SchemaContext::introspect(self.executor.pool()).await
    }

    /// Run the full staged protocol. Never panics, never loops
    /// unboundedly; every failure maps onto the terminal status enum.
    pub async fn run(&self, request: &PipelineRequest) -> PipelineResult {
        match self.run_stages(request).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(error = %e, question = %request.question, "pipeline run failed");
                PipelineResult::error(e.user_message())
            }
        }
    }

    async fn run_stages(&self, request: &PipelineRequest) -> Result<PipelineResult, PipelineError> {
        let schema = self.schema().await?;
        let schema_text = schema.to_prompt_text(&self.meanings);

        // Stage: ambiguity detection.
        let ambiguity = self.detect_ambiguity(request, &schema_text).await?;
        if ambiguity.is_ambiguous {
            tracing::info!(reason = %ambiguity.reason, "question needs clarification");
            return Ok(PipelineResult::needs_clarification(
                ambiguity.questions,
                Some(ambiguity.reason),
            ));
        }

        // Stage: knowledge retrieval. Best-effort, never fatal.
        let facts = self.retrieve_knowledge(request).await;

        // Stage: SQL generation.
        let candidate = self.generate_sql(request, &schema_text, &facts).await?;
        let fallback_explanation = candidate.explanation.clone();
        let mut confidence = candidate.confidence;
        let Some(mut sql) = candidate.sql else {
            return Ok(PipelineResult::needs_clarification(
                candidate.open_questions,
                None,
            ));
        };

        // Stage: validation with bounded self-correction.
        let mut attempts = 0usize;
        let mut report = self.validator.validate(&sql, &schema);
        while !report.is_valid {
            tracing::warn!(attempt = attempts, errors = ?report.errors, "guard rejected SQL");
            if attempts >= self.config.max_correction_attempts {
                return Err(PipelineError::Validation(report.errors.join("; ")));
            }
            attempts += 1;
            let correction = self.correct_sql(&sql, &report.errors, &schema_text).await?;
            match correction.fixed_sql {
                Some(fixed) => {
                    tracing::info!(changes = ?correction.changes, "applying corrected SQL");
                    sql = fixed;
                    confidence = correction.confidence;
                }
                None => return Err(PipelineError::Validation(report.errors.join("; "))),
            }
            report = self.validator.validate(&sql, &schema);
        }

        // Stage: execution. Failures here are fatal, never retried.
        let results = self.executor.execute(&sql).await?;

        // Stage: explanation. Best-effort, falls back to the candidate's.
        let explanation = match self.explain(request, &sql, &results).await {
            Ok(e) => e.natural_language_explanation,
            Err(e) => {
                tracing::warn!(error = %e, "explanation stage failed, using candidate explanation");
                fallback_explanation
            }
        };

        Ok(PipelineResult {
            status: PipelineStatus::Success,
            sql: Some(sql),
            results: Some(results),
            explanation: Some(explanation),
            confidence: Some(confidence.clamp(0.0, 1.0)),
            questions: vec![],
        })
    }

    async fn detect_ambiguity(
        &self,
        request: &PipelineRequest,
        schema_text: &str,
    ) -> Result<AmbiguityResult, PipelineError> {
        let user_prompt = prompt::ambiguity_prompt(
            &request.question,
            schema_text,
            &request.clarification_answers,
            &request.conversation_window,
        );
        let raw = self
            .client
            .chat_json(prompt::AMBIGUITY_DETECTION, &user_prompt)
            .await
            .map_err(gateway)?;
        decode_stage("ambiguity_detection", &raw)
    }

    async fn retrieve_knowledge(&self, request: &PipelineRequest) -> Vec<String> {
        if self.knowledge.is_empty() {
            return vec![];
        }
        let user_prompt = prompt::knowledge_prompt(
            &request.question,
            self.knowledge.entries(),
            &request.clarification_answers,
        );
        let result: Result<KnowledgeResult, PipelineError> = match self
            .client
            .chat_json(prompt::KNOWLEDGE_SEARCH, &user_prompt)
            .await
        {
            Ok(raw) => decode_stage("knowledge_search", &raw),
            Err(e) => Err(gateway(e)),
        };
        match result {
            Ok(knowledge) => knowledge.relevant_facts,
            Err(e) => {
                tracing::warn!(error = %e, "knowledge stage failed, continuing without facts");
                vec![]
            }
        }
    }

    async fn generate_sql(
        &self,
        request: &PipelineRequest,
        schema_text: &str,
        facts: &[String],
    ) -> Result<SqlCandidate, PipelineError> {
        let user_prompt = prompt::generation_prompt(
            &request.question,
            schema_text,
            facts,
            &request.clarification_answers,
            &request.conversation_window,
        );
        let raw = self
            .client
            .chat_json(prompt::SQL_GENERATION, &user_prompt)
            .await
            .map_err(gateway)?;
        decode_stage("sql_generation", &raw)
    }

    async fn correct_sql(
        &self,
        sql: &str,
        errors: &[String],
        schema_text: &str,
    ) -> Result<CorrectionResult, PipelineError> {
        let user_prompt = prompt::correction_prompt(sql, errors, schema_text);
        let raw = self
            .client
            .chat_json(prompt::SELF_CORRECTION, &user_prompt)
            .await
            .map_err(gateway)?;
        decode_stage("self_correction", &raw)
    }

    async fn explain(
        &self,
        request: &PipelineRequest,
        sql: &str,
        results: &ExecutionResult,
    ) -> Result<ExplanationResult, PipelineError> {
        let user_prompt =
            prompt::explanation_prompt(&request.question, sql, &results.summary_for_explanation());
        let raw = self
            .client
            .chat_json(prompt::EXPLANATION, &user_prompt)
            .await
            .map_err(gateway)?;
        decode_stage("explanation", &raw)
    }
}

fn gateway(e: anyhow::Error) -> PipelineError {
    PipelineError::Gateway(e.to_string())
}

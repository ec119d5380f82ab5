//! Error taxonomy for the pipeline
//!
//! Every failure mode the orchestrator distinguishes maps onto one of
//! these variants; the final HTTP/chat surface only ever sees the short
//! display string, full detail goes to tracing.

use thiserror::Error;

/// Pipeline error type
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The language model returned text that did not decode as the
    /// stage's documented JSON shape. Never treated as an empty result.
    #[error("{stage} stage returned unparseable output: {message}")]
    ModelResponseParse {
        stage: &'static str,
        message: String,
    },

    /// Transport or rate-limit failure talking to the language model.
    #[error("language model gateway failure: {0}")]
    Gateway(String),

    /// The guard rejected the SQL and correction attempts ran out.
    #[error("generated SQL failed validation: {0}")]
    Validation(String),

    /// Engine-level failure while running the final SELECT. Always
    /// fatal for the request, never retried.
    #[error("query execution failed: {0}")]
    Execution(#[from] sqlx::Error),

    /// Failure while reading the store's metadata catalog.
    #[error("schema introspection failed: {0}")]
    Schema(String),
}

impl PipelineError {
    /// Short message suitable for the caller-facing response body.
    pub fn user_message(&self) -> String {
        self.to_string()
    }
}

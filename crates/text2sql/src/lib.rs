//! Staged LLM pipeline for natural-language-to-SQL translation
//!
//! Turns a user question into a single read-only SELECT against a fixed
//! SQLite schema, with every stage (ambiguity detection, knowledge
//! retrieval, SQL generation, self-correction, explanation) backed by an
//! LLM call and every generated statement checked by a static guard
//! before execution.
//!
//! ## Architecture
//!
//! ```text
//! Question → Ambiguity → Knowledge → Generation → Guard ⇄ Correction → Execute → Explain
//! ```
//!
//! ## Backend Selection
//!
//! Set `LLM_BACKEND` environment variable:
//! - `anthropic` (default): Anthropic Claude API
//! - `openai`: OpenAI API

// LLM client abstraction
pub mod anthropic_client;
pub mod client_factory;
pub mod llm_client;
pub mod openai_client;

// Core pipeline modules
pub mod config;
pub mod error;
pub mod executor;
pub mod guard;
pub mod knowledge;
pub mod pipeline;
pub mod prompt;
pub mod schema;
pub mod stages;

// Re-exports for convenience
pub use client_factory::create_llm_client;
pub use config::PipelineConfig;
pub use error::PipelineError;
pub use executor::{ExecutionResult, QueryExecutor};
pub use guard::{SqlGuard, SqlValidator};
pub use knowledge::{ColumnMeanings, KnowledgeBase};
pub use llm_client::LlmClient;
pub use pipeline::{Exchange, Pipeline, PipelineRequest, PipelineResult, PipelineStatus};
pub use schema::SchemaContext;

//! Client Factory
//!
//! Selects the LLM backend from the `LLM_BACKEND` environment variable.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};

use crate::anthropic_client::AnthropicClient;
use crate::llm_client::LlmClient;
use crate::openai_client::OpenAiClient;

/// Create an LLM client from environment variables.
///
/// `LLM_BACKEND=anthropic` (default) or `LLM_BACKEND=openai`; the
/// matching `*_API_KEY` variable must be set.
pub fn create_llm_client(timeout: Duration) -> Result<Arc<dyn LlmClient>> {
    let backend = std::env::var("LLM_BACKEND").unwrap_or_else(|_| "anthropic".to_string());
    match backend.to_lowercase().as_str() {
        "anthropic" => Ok(Arc::new(AnthropicClient::from_env(timeout)?)),
        "openai" => Ok(Arc::new(OpenAiClient::from_env(timeout)?)),
        other => Err(anyhow!(
            "Unknown LLM_BACKEND '{}' (expected 'anthropic' or 'openai')",
            other
        )),
    }
}

//! Pipeline configuration
//!
//! Fixed defaults for the pipeline knobs, both overridable through the
//! environment.

use std::time::Duration;

/// Default number of self-correction rounds after a validation failure.
pub const DEFAULT_MAX_CORRECTION_ATTEMPTS: usize = 1;

/// Default timeout for one language-model round trip.
pub const DEFAULT_GATEWAY_TIMEOUT_SECS: u64 = 30;

/// Tunable pipeline behaviour.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Maximum self-correction rounds before giving up with an error.
    pub max_correction_attempts: usize,
    /// Request timeout applied to every gateway call.
    pub gateway_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_correction_attempts: DEFAULT_MAX_CORRECTION_ATTEMPTS,
            gateway_timeout: Duration::from_secs(DEFAULT_GATEWAY_TIMEOUT_SECS),
        }
    }
}

impl PipelineConfig {
    /// Read overrides from `MAX_CORRECTION_ATTEMPTS` and
    /// `LLM_TIMEOUT_SECS`; unset or unparseable values keep the defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let max_correction_attempts = std::env::var("MAX_CORRECTION_ATTEMPTS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.max_correction_attempts);
        let gateway_timeout = std::env::var("LLM_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.gateway_timeout);
        Self {
            max_correction_attempts,
            gateway_timeout,
        }
    }
}

//! Stage Response Types
//!
//! Typed shapes for every language-model-backed stage, plus the strict
//! decode step that turns raw model text into them. A response that
//! does not decode is a `ModelResponseParse` error, never a silent
//! default.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Outcome of the ambiguity detection stage.
#[derive(Debug, Clone, Deserialize)]
pub struct AmbiguityResult {
    pub is_ambiguous: bool,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub questions: Vec<String>,
}

/// Outcome of the knowledge retrieval stage. May be empty.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct KnowledgeResult {
    #[serde(default, alias = "relevant_knowledge")]
    pub relevant_facts: Vec<String>,
}

/// Outcome of the SQL generation stage.
///
/// `sql` is null exactly when the model still needs clarification; the
/// field must be present either way, a missing key is a decode error.
#[derive(Debug, Clone, Deserialize)]
pub struct SqlCandidate {
    #[serde(default)]
    pub thought_process: String,
    // deserialize_with without a default keeps the key required while
    // still accepting an explicit null.
    #[serde(deserialize_with = "nullable_string")]
    pub sql: Option<String>,
    #[serde(default)]
    pub explanation: String,
    pub confidence: f32,
    #[serde(default, alias = "questions")]
    pub open_questions: Vec<String>,
}

/// Outcome of the self-correction stage.
#[derive(Debug, Clone, Deserialize)]
pub struct CorrectionResult {
    pub fixed_sql: Option<String>,
    #[serde(default)]
    pub changes: Vec<String>,
    #[serde(default)]
    pub confidence: f32,
}

/// Outcome of the explanation stage.
#[derive(Debug, Clone, Deserialize)]
pub struct ExplanationResult {
    #[serde(alias = "explanation")]
    pub natural_language_explanation: String,
}

/// Validation severity, highest wins when errors accumulate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// Guard verdict for one SQL statement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub severity: Severity,
    pub suggestions: Vec<String>,
}

impl ValidationReport {
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            errors: vec![],
            severity: Severity::Low,
            suggestions: vec![],
        }
    }
}

fn nullable_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer)
}

/// Decode raw model text as the given stage shape.
pub fn decode_stage<T: DeserializeOwned>(
    stage: &'static str,
    raw: &str,
) -> Result<T, PipelineError> {
    let clean = strip_code_fences(raw);
    serde_json::from_str(&clean).map_err(|e| {
        tracing::debug!(stage, raw, "stage response failed strict decode");
        PipelineError::ModelResponseParse {
            stage,
            message: e.to_string(),
        }
    })
}

/// Strip ```json ... ``` fences some models wrap around their output.
pub fn strip_code_fences(text: &str) -> String {
    let text = text.trim();
    let inner = if text.contains("```json") {
        text.split("```json")
            .nth(1)
            .and_then(|s| s.split("```").next())
            .unwrap_or(text)
    } else if text.contains("```") {
        text.split("```")
            .nth(1)
            .and_then(|s| s.split("```").next())
            .unwrap_or(text)
    } else {
        text
    };
    inner.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_plain_json() {
        let raw = r#"{"is_ambiguous": true, "reason": "vague", "questions": ["Which year?"]}"#;
        let result: AmbiguityResult = decode_stage("ambiguity_detection", raw).unwrap();
        assert!(result.is_ambiguous);
        assert_eq!(result.questions, vec!["Which year?"]);
    }

    #[test]
    fn test_decode_fenced_json() {
        let raw = "```json\n{\"is_ambiguous\": false}\n```";
        let result: AmbiguityResult = decode_stage("ambiguity_detection", raw).unwrap();
        assert!(!result.is_ambiguous);
        assert!(result.questions.is_empty());
    }

    #[test]
    fn test_decode_failure_is_parse_error() {
        let err = decode_stage::<AmbiguityResult>("ambiguity_detection", "not json at all")
            .unwrap_err();
        match err {
            PipelineError::ModelResponseParse { stage, .. } => {
                assert_eq!(stage, "ambiguity_detection")
            }
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_candidate_null_sql() {
        let raw = r#"{"thought_process": "unclear", "sql": null, "explanation": "",
                      "confidence": 0.2, "questions": ["Revenue or order count?"]}"#;
        let candidate: SqlCandidate = decode_stage("sql_generation", raw).unwrap();
        assert!(candidate.sql.is_none());
        assert_eq!(candidate.open_questions.len(), 1);
    }

    #[test]
    fn test_candidate_missing_sql_field_rejected() {
        let raw = r#"{"thought_process": "x", "confidence": 0.9}"#;
        assert!(decode_stage::<SqlCandidate>("sql_generation", raw).is_err());
    }

    #[test]
    fn test_knowledge_field_alias() {
        let raw = r#"{"relevant_knowledge": ["active means status='active'"]}"#;
        let result: KnowledgeResult = decode_stage("knowledge_search", raw).unwrap();
        assert_eq!(result.relevant_facts.len(), 1);
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
    }
}

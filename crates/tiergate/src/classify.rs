// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `tiergate classify`: replay the classifier on a saved request body.
//!
//! Caller hints come from the body's `metadata`; there are no headers to read.

use std::path::Path;

use serde::Serialize;
use tiergate_anthropic::MessagesRequest;
use tiergate_config::TiergateConfig;
use tiergate_core::{ComplexityTier, TiergateError};
use tiergate_router::{CallerHints, ClassificationResult, QueryClassifier};

#[derive(Debug, Serialize)]
struct Report<'a> {
    #[serde(flatten)]
    result: &'a ClassificationResult,
    /// First entry of the tier's fallback chain.
    first_choice: Option<String>,
}

pub fn classify_file(config: &TiergateConfig, path: &Path) -> Result<String, TiergateError> {
    let body = std::fs::read_to_string(path).map_err(|e| {
        TiergateError::Internal(format!("failed to read {}: {e}", path.display()))
    })?;
    classify_json(config, &body)
}

/// Classifies a JSON request body and renders the result as pretty JSON.
pub fn classify_json(config: &TiergateConfig, body: &str) -> Result<String, TiergateError> {
    let body = serde_json::from_str(body)
        .map_err(|e| TiergateError::Translation(format!("request body is not valid JSON: {e}")))?;
    let request = MessagesRequest::from_json(body)?;
    let classifier = QueryClassifier::new(config.classifier.clone());
    let hints = CallerHints::from_metadata(request.metadata.as_ref());
    let result = classifier.classify(&request, &hints);
    let report = Report {
        first_choice: first_choice(config, result.tier),
        result: &result,
    };
    serde_json::to_string_pretty(&report)
        .map_err(|e| TiergateError::Internal(format!("failed to render result: {e}")))
}

fn first_choice(config: &TiergateConfig, tier: ComplexityTier) -> Option<String> {
    config
        .routes
        .chain(tier)
        .first()
        .map(|c| format!("{}/{}", c.backend, c.model))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn short_chat_is_routine() {
        let out = classify_json(
            &TiergateConfig::default(),
            r#"{"model":"m","messages":[{"role":"user","content":"hi"}]}"#,
        )
        .unwrap();
        let report: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(report["tier"], "routine");
        assert_eq!(report["first_choice"], "gpu-small/qwen2.5-coder-7b-instruct");
    }

    #[test]
    fn metadata_tier_is_honoured() {
        let out = classify_json(
            &TiergateConfig::default(),
            r#"{"model":"m","metadata":{"tier":"complex"},"messages":[{"role":"user","content":"hi"}]}"#,
        )
        .unwrap();
        let report: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(report["tier"], "complex");
        assert!(!report["primary_signal"].as_str().unwrap().is_empty());
    }

    #[test]
    fn invalid_body_is_reported() {
        let err = classify_json(&TiergateConfig::default(), "[]").unwrap_err();
        assert!(err.to_string().contains("not a Messages request"));

        let err = classify_json(&TiergateConfig::default(), r#"{"model":"m"}"#).unwrap_err();
        assert!(err.to_string().contains("messages"), "got: {err}");

        let err = classify_json(&TiergateConfig::default(), "{not json").unwrap_err();
        assert!(err.to_string().contains("not valid JSON"), "got: {err}");
    }

    #[test]
    fn missing_file_is_reported() {
        let err = classify_file(
            &TiergateConfig::default(),
            Path::new("/nonexistent/tiergate-request.json"),
        )
        .unwrap_err();
        assert!(err.to_string().contains("failed to read"));
    }
}

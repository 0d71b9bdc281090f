// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that serde cannot express: unique backend
//! ids, route entries that point at real (backend, model) pairs, ordered
//! cutoffs and scaling thresholds.

use std::collections::HashSet;

use tiergate_core::ComplexityTier;

use crate::diagnostic::{ConfigError, suggest_key};
use crate::model::TiergateConfig;

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &TiergateConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    validate_server(config, &mut errors);
    validate_backends(config, &mut errors);
    validate_routes(config, &mut errors);
    validate_classifier(config, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_server(config: &TiergateConfig, errors: &mut Vec<ConfigError>) {
    if config.server.host.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "server.host must not be empty".to_string(),
        });
    }
    if config.server.request_timeout_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "server.request_timeout_secs must be at least 1".to_string(),
        });
    }
}

fn validate_backends(config: &TiergateConfig, errors: &mut Vec<ConfigError>) {
    if config.backends.is_empty() {
        errors.push(ConfigError::Validation {
            message: "at least one [[backends]] entry is required".to_string(),
        });
    }

    let mut seen = HashSet::new();
    for (i, backend) in config.backends.iter().enumerate() {
        if backend.id.trim().is_empty() {
            errors.push(ConfigError::Validation {
                message: format!("backends[{i}].id must not be empty"),
            });
        } else if !seen.insert(backend.id.as_str()) {
            errors.push(ConfigError::Validation {
                message: format!("duplicate backend id `{}` in [[backends]]", backend.id),
            });
        }
        if backend.max_concurrent < 1 {
            errors.push(ConfigError::Validation {
                message: format!(
                    "backends[{i}].max_concurrent must be at least 1, got {}",
                    backend.max_concurrent
                ),
            });
        }
        if backend.models.is_empty() {
            errors.push(ConfigError::Validation {
                message: format!("backend `{}` must serve at least one model", backend.id),
            });
        }
        if !backend.base_url.starts_with("http://") && !backend.base_url.starts_with("https://") {
            errors.push(ConfigError::Validation {
                message: format!(
                    "backend `{}` base_url `{}` must start with http:// or https://",
                    backend.id, backend.base_url
                ),
            });
        }
        if backend.timeout_secs == Some(0) {
            errors.push(ConfigError::Validation {
                message: format!("backend `{}` timeout_secs must be at least 1", backend.id),
            });
        }
    }
}

fn validate_routes(config: &TiergateConfig, errors: &mut Vec<ConfigError>) {
    let known: Vec<&str> = config.backends.iter().map(|b| b.id.as_str()).collect();

    for tier in ComplexityTier::ALL {
        let chain = config.routes.chain(tier);
        if chain.is_empty() {
            errors.push(ConfigError::Validation {
                message: format!("routes.{tier} must list at least one backend"),
            });
        }
        for (i, entry) in chain.iter().enumerate() {
            let location = format!("routes.{tier}[{i}]");
            match config.backend(&entry.backend) {
                None => errors.push(unknown_backend(location, &entry.backend, &known)),
                Some(backend) if !backend.models.contains(&entry.model) => {
                    errors.push(ConfigError::Validation {
                        message: format!(
                            "{location}: backend `{}` does not serve model `{}`",
                            entry.backend, entry.model
                        ),
                    });
                }
                Some(_) => {}
            }
        }
    }

    let constrained = &config.mode.constrained_backend;
    if config.backend(constrained).is_none() {
        errors.push(unknown_backend(
            "mode.constrained_backend".to_string(),
            constrained,
            &known,
        ));
    }
}

fn unknown_backend(location: String, backend: &str, known: &[&str]) -> ConfigError {
    ConfigError::UnknownBackend {
        location,
        backend: backend.to_string(),
        suggestion: suggest_key(backend, known),
        known: known.join(", "),
    }
}

fn validate_classifier(config: &TiergateConfig, errors: &mut Vec<ConfigError>) {
    let c = &config.classifier;

    if !(0.0..=1.0).contains(&c.moderate_cutoff)
        || !(0.0..=1.0).contains(&c.complex_cutoff)
        || c.moderate_cutoff >= c.complex_cutoff
    {
        errors.push(ConfigError::Validation {
            message: format!(
                "classifier cutoffs must satisfy 0 <= moderate_cutoff < complex_cutoff <= 1, got {} and {}",
                c.moderate_cutoff, c.complex_cutoff
            ),
        });
    }

    if c.input_tokens_low >= c.input_tokens_high {
        errors.push(ConfigError::Validation {
            message: format!(
                "classifier.input_tokens_low ({}) must be below input_tokens_high ({})",
                c.input_tokens_low, c.input_tokens_high
            ),
        });
    }

    if c.max_tokens_low >= c.max_tokens_high {
        errors.push(ConfigError::Validation {
            message: format!(
                "classifier.max_tokens_low ({}) must be below max_tokens_high ({})",
                c.max_tokens_low, c.max_tokens_high
            ),
        });
    }

    let weights = [
        ("tool_weight", c.tool_weight),
        ("tool_cap", c.tool_cap),
        ("coding_keyword_weight", c.coding_keyword_weight),
        ("reasoning_keyword_weight", c.reasoning_keyword_weight),
        ("depth_weight", c.depth_weight),
        ("depth_cap", c.depth_cap),
        ("input_tokens_max_weight", c.input_tokens_max_weight),
        ("max_tokens_max_weight", c.max_tokens_max_weight),
        ("final_message_keyword_weight", c.final_message_keyword_weight),
        (
            "final_message_strong_keyword_weight",
            c.final_message_strong_keyword_weight,
        ),
        ("low_temperature_weight", c.low_temperature_weight),
    ];
    for (name, value) in weights {
        if !value.is_finite() || value < 0.0 {
            errors.push(ConfigError::Validation {
                message: format!("classifier.{name} must be a non-negative number, got {value}"),
            });
        }
    }

    if c.force_tag.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "classifier.force_tag must not be empty".to_string(),
        });
    }
}

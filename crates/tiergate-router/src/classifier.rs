// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Heuristic request complexity classification.
//!
//! Scores a client request into Routine/Moderate/Complex tiers from its
//! shape alone: no LLM pre-call, no network, no clock. The caller-declared
//! tier (see [`crate::signals`]) can only raise the heuristic tier, never
//! lower it.

use serde::Serialize;
use tiergate_anthropic::{MessagesRequest, Role};
use tiergate_config::model::ClassifierConfig;
use tiergate_core::{ComplexityTier, SignalSource};

use crate::signals::{CallerHints, final_user_index, resolve_caller_tier};

/// Weight recorded for a caller signal.
const CALLER_SIGNAL_WEIGHT: f64 = 1.0;

/// Rough characters-per-token ratio used for input size estimation.
const CHARS_PER_TOKEN: usize = 4;

/// One factor that contributed to a classification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationSignal {
    pub name: String,
    pub weight: f64,
    pub source: SignalSource,
}

/// Result of classifying a request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationResult {
    /// Final tier, after caller signals.
    pub tier: ComplexityTier,
    /// Heuristic score only, in `[0, 1]`.
    pub score: f64,
    /// Contributing signals in evaluation order; the caller signal, if any, is last.
    pub signals: Vec<ClassificationSignal>,
    /// The caller signal's name if one fired, else the largest heuristic contributor.
    pub primary_signal: String,
}

impl ClassificationResult {
    /// Signals rendered as `name=weight(source)` entries for log lines.
    pub fn render_signals(&self) -> String {
        self.signals
            .iter()
            .map(|s| format!("{}={:.2}({})", s.name, s.weight, s.source))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Heuristic classifier with tunable weights.
pub struct QueryClassifier {
    config: ClassifierConfig,
    coding_keywords: Vec<String>,
    reasoning_keywords: Vec<String>,
    complexity_keywords: Vec<String>,
    strong_complexity_keywords: Vec<String>,
}

impl QueryClassifier {
    /// Create a classifier from loaded configuration.
    pub fn new(config: ClassifierConfig) -> Self {
        let lower = |words: &[String]| -> Vec<String> { words.iter().map(|w| w.to_lowercase()).collect() };
        Self {
            coding_keywords: lower(&config.coding_keywords),
            reasoning_keywords: lower(&config.reasoning_keywords),
            complexity_keywords: lower(&config.complexity_keywords),
            strong_complexity_keywords: lower(&config.strong_complexity_keywords),
            config,
        }
    }

    /// The configuration this classifier was built from.
    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Classify a request. Never fails; absent fields contribute nothing.
    pub fn classify(&self, request: &MessagesRequest, hints: &CallerHints) -> ClassificationResult {
        let mut signals = Vec::new();
        let mut push = |name: &str, weight: f64| {
            if weight > 0.0 {
                signals.push(ClassificationSignal {
                    name: name.to_string(),
                    weight,
                    source: SignalSource::Heuristic,
                });
            }
        };

        let c = &self.config;

        push(
            "tool_count",
            (request.tools.len() as f64 * c.tool_weight).min(c.tool_cap),
        );

        let system = request
            .system
            .as_ref()
            .map(|s| s.text().to_lowercase())
            .unwrap_or_default();
        if contains_any(&system, &self.coding_keywords) {
            push("system_coding_keywords", c.coding_keyword_weight);
        }
        if contains_any(&system, &self.reasoning_keywords) {
            push("system_reasoning_keywords", c.reasoning_keyword_weight);
        }

        let user_turns = request
            .messages
            .iter()
            .filter(|m| m.role == Role::User)
            .count();
        let prior_turns = user_turns.saturating_sub(1);
        let extra_turns = prior_turns.saturating_sub(c.depth_free_turns);
        push(
            "conversation_depth",
            (extra_turns as f64 * c.depth_weight).min(c.depth_cap),
        );

        push(
            "input_tokens",
            scale(
                estimate_input_tokens(request),
                c.input_tokens_low,
                c.input_tokens_high,
                c.input_tokens_max_weight,
            ),
        );

        push(
            "max_output_tokens",
            scale(
                request.max_tokens.map(u64::from).unwrap_or(0),
                c.max_tokens_low,
                c.max_tokens_high,
                c.max_tokens_max_weight,
            ),
        );

        if let Some(i) = final_user_index(request) {
            let text = request.messages[i].content.text().to_lowercase();
            if contains_any(&text, &self.strong_complexity_keywords) {
                push(
                    "final_message_keywords",
                    c.final_message_strong_keyword_weight,
                );
            } else if contains_any(&text, &self.complexity_keywords) {
                push("final_message_keywords", c.final_message_keyword_weight);
            }
        }

        if request
            .temperature
            .is_some_and(|t| t <= c.low_temperature_threshold)
        {
            push("low_temperature", c.low_temperature_weight);
        }

        // `Sum` over no items yields -0.0.
        let score = signals
            .iter()
            .fold(0.0_f64, |acc, s| acc + s.weight)
            .clamp(0.0, 1.0);
        let heuristic_tier = self.tier_for_score(score);

        let mut primary_signal = primary_heuristic(&signals);
        let mut tier = heuristic_tier;

        if let Some(caller) = resolve_caller_tier(hints, request, c) {
            signals.push(ClassificationSignal {
                name: caller.name.to_string(),
                weight: CALLER_SIGNAL_WEIGHT,
                source: SignalSource::Caller,
            });
            primary_signal = caller.name.to_string();
            tier = tier.max(caller.tier);
        }

        ClassificationResult {
            tier,
            score,
            signals,
            primary_signal,
        }
    }

    /// Map a heuristic score to a tier through the configured cutoffs.
    pub fn tier_for_score(&self, score: f64) -> ComplexityTier {
        if score < self.config.moderate_cutoff {
            ComplexityTier::Routine
        } else if score > self.config.complex_cutoff {
            ComplexityTier::Complex
        } else {
            ComplexityTier::Moderate
        }
    }
}

/// First heuristic signal with the largest weight, or `"none"`.
fn primary_heuristic(signals: &[ClassificationSignal]) -> String {
    let mut best: Option<&ClassificationSignal> = None;
    for signal in signals {
        if best.is_none_or(|b| signal.weight > b.weight) {
            best = Some(signal);
        }
    }
    best.map(|s| s.name.clone())
        .unwrap_or_else(|| "none".to_string())
}

/// Linear ramp: 0 at or below `low`, `max_weight` at or above `high`.
fn scale(value: u64, low: u64, high: u64, max_weight: f64) -> f64 {
    if value <= low {
        0.0
    } else if value >= high {
        max_weight
    } else {
        max_weight * (value - low) as f64 / (high - low) as f64
    }
}

/// Rough prompt size: characters of system prompt and transcript over four.
pub fn estimate_input_tokens(request: &MessagesRequest) -> u64 {
    let system = request
        .system
        .as_ref()
        .map(|s| s.text().chars().count())
        .unwrap_or(0);
    let messages: usize = request.messages.iter().map(|m| m.content.char_len()).sum();
    ((system + messages) / CHARS_PER_TOKEN) as u64
}

fn contains_any(haystack: &str, keywords: &[String]) -> bool {
    keywords.iter().any(|k| contains_word(haystack, k))
}

/// Substring match that does not start or end inside a word.
fn contains_word(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    haystack.match_indices(needle).any(|(start, _)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + needle.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

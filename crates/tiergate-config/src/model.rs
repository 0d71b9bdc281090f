// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Tiergate router.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tiergate_core::{BackendKind, ComplexityTier};

/// Top-level Tiergate configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to a three-backend local/cloud catalogue.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TiergateConfig {
    /// HTTP listener and request lifecycle settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Heuristic weights, cutoffs, and caller-signal tables.
    #[serde(default)]
    pub classifier: ClassifierConfig,

    /// Static backend catalogue.
    #[serde(default = "default_backends")]
    pub backends: Vec<BackendConfig>,

    /// Per-tier fallback chains.
    #[serde(default)]
    pub routes: RoutesConfig,

    /// Operating-mode restrictions.
    #[serde(default)]
    pub mode: ModeConfig,

    /// Prometheus metrics exporter settings.
    #[serde(default)]
    pub prometheus: PrometheusConfig,
}

impl Default for TiergateConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            classifier: ClassifierConfig::default(),
            backends: default_backends(),
            routes: RoutesConfig::default(),
            mode: ModeConfig::default(),
            prometheus: PrometheusConfig::default(),
        }
    }
}

impl TiergateConfig {
    /// Look up a backend by id.
    pub fn backend(&self, id: &str) -> Option<&BackendConfig> {
        self.backends.iter().find(|b| b.id == id)
    }
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Host address to bind.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Default deadline for one backend call, in seconds.
    /// Backends may override it with `timeout_secs`.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout_secs(),
            log_level: default_log_level(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8787
}

fn default_request_timeout_secs() -> u64 {
    300
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Complexity classifier tuning.
///
/// Every weight, cap, and cutoff is loadable so the heuristics can be retuned
/// from production telemetry without a rebuild.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ClassifierConfig {
    /// Score contributed per declared tool.
    #[serde(default = "default_tool_weight")]
    pub tool_weight: f64,
    /// Maximum total contribution from the tool count.
    #[serde(default = "default_tool_cap")]
    pub tool_cap: f64,

    /// Added when the system prompt mentions a coding keyword.
    #[serde(default = "default_coding_keyword_weight")]
    pub coding_keyword_weight: f64,
    /// Added when the system prompt mentions a reasoning keyword.
    #[serde(default = "default_reasoning_keyword_weight")]
    pub reasoning_keyword_weight: f64,

    /// Prior user turns that contribute nothing.
    #[serde(default = "default_depth_free_turns")]
    pub depth_free_turns: usize,
    /// Score per prior user turn beyond `depth_free_turns`.
    #[serde(default = "default_depth_weight")]
    pub depth_weight: f64,
    /// Maximum total contribution from conversation depth.
    #[serde(default = "default_depth_cap")]
    pub depth_cap: f64,

    /// Estimated input tokens at which the input-size contribution starts.
    #[serde(default = "default_input_tokens_low")]
    pub input_tokens_low: u64,
    /// Estimated input tokens at which the input-size contribution saturates.
    #[serde(default = "default_input_tokens_high")]
    pub input_tokens_high: u64,
    /// Contribution at saturation.
    #[serde(default = "default_input_tokens_max_weight")]
    pub input_tokens_max_weight: f64,

    /// Requested `max_tokens` at which the output-size contribution starts.
    #[serde(default = "default_max_tokens_low")]
    pub max_tokens_low: u64,
    /// Requested `max_tokens` at which the output-size contribution saturates.
    #[serde(default = "default_max_tokens_high")]
    pub max_tokens_high: u64,
    /// Contribution at saturation.
    #[serde(default = "default_max_tokens_max_weight")]
    pub max_tokens_max_weight: f64,

    /// Added when the final user message contains a complexity keyword.
    #[serde(default = "default_final_message_keyword_weight")]
    pub final_message_keyword_weight: f64,
    /// Added instead when it contains a strong complexity keyword.
    #[serde(default = "default_final_message_strong_keyword_weight")]
    pub final_message_strong_keyword_weight: f64,

    /// Temperatures at or below this count as "low".
    #[serde(default = "default_low_temperature_threshold")]
    pub low_temperature_threshold: f64,
    /// Added for a low sampling temperature.
    #[serde(default = "default_low_temperature_weight")]
    pub low_temperature_weight: f64,

    /// Scores below this are routine.
    #[serde(default = "default_moderate_cutoff")]
    pub moderate_cutoff: f64,
    /// Scores above this are complex.
    #[serde(default = "default_complex_cutoff")]
    pub complex_cutoff: f64,

    /// System-prompt keywords that indicate coding work.
    #[serde(default = "default_coding_keywords")]
    pub coding_keywords: Vec<String>,
    /// System-prompt keywords that indicate reasoning work.
    #[serde(default = "default_reasoning_keywords")]
    pub reasoning_keywords: Vec<String>,
    /// Final-message keywords worth `final_message_keyword_weight`.
    #[serde(default = "default_complexity_keywords")]
    pub complexity_keywords: Vec<String>,
    /// Final-message keywords worth `final_message_strong_keyword_weight`.
    #[serde(default = "default_strong_complexity_keywords")]
    pub strong_complexity_keywords: Vec<String>,

    /// Legacy in-message tag that forces the complex tier.
    #[serde(default = "default_force_tag")]
    pub force_tag: String,

    /// Guaranteed minimum tier per caller class.
    #[serde(default = "default_caller_floors")]
    pub caller_floors: BTreeMap<String, ComplexityTier>,

    /// Default tier per caller identity.
    #[serde(default)]
    pub caller_defaults: BTreeMap<String, ComplexityTier>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            tool_weight: default_tool_weight(),
            tool_cap: default_tool_cap(),
            coding_keyword_weight: default_coding_keyword_weight(),
            reasoning_keyword_weight: default_reasoning_keyword_weight(),
            depth_free_turns: default_depth_free_turns(),
            depth_weight: default_depth_weight(),
            depth_cap: default_depth_cap(),
            input_tokens_low: default_input_tokens_low(),
            input_tokens_high: default_input_tokens_high(),
            input_tokens_max_weight: default_input_tokens_max_weight(),
            max_tokens_low: default_max_tokens_low(),
            max_tokens_high: default_max_tokens_high(),
            max_tokens_max_weight: default_max_tokens_max_weight(),
            final_message_keyword_weight: default_final_message_keyword_weight(),
            final_message_strong_keyword_weight: default_final_message_strong_keyword_weight(),
            low_temperature_threshold: default_low_temperature_threshold(),
            low_temperature_weight: default_low_temperature_weight(),
            moderate_cutoff: default_moderate_cutoff(),
            complex_cutoff: default_complex_cutoff(),
            coding_keywords: default_coding_keywords(),
            reasoning_keywords: default_reasoning_keywords(),
            complexity_keywords: default_complexity_keywords(),
            strong_complexity_keywords: default_strong_complexity_keywords(),
            force_tag: default_force_tag(),
            caller_floors: default_caller_floors(),
            caller_defaults: BTreeMap::new(),
        }
    }
}

fn default_tool_weight() -> f64 {
    0.1
}

fn default_tool_cap() -> f64 {
    0.4
}

fn default_coding_keyword_weight() -> f64 {
    0.2
}

fn default_reasoning_keyword_weight() -> f64 {
    0.15
}

fn default_depth_free_turns() -> usize {
    3
}

fn default_depth_weight() -> f64 {
    0.05
}

fn default_depth_cap() -> f64 {
    0.2
}

fn default_input_tokens_low() -> u64 {
    1_000
}

fn default_input_tokens_high() -> u64 {
    32_000
}

fn default_input_tokens_max_weight() -> f64 {
    0.3
}

fn default_max_tokens_low() -> u64 {
    1_024
}

fn default_max_tokens_high() -> u64 {
    16_384
}

fn default_max_tokens_max_weight() -> f64 {
    0.15
}

fn default_final_message_keyword_weight() -> f64 {
    0.1
}

fn default_final_message_strong_keyword_weight() -> f64 {
    0.2
}

fn default_low_temperature_threshold() -> f64 {
    0.3
}

fn default_low_temperature_weight() -> f64 {
    0.05
}

fn default_moderate_cutoff() -> f64 {
    0.25
}

fn default_complex_cutoff() -> f64 {
    0.6
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn default_coding_keywords() -> Vec<String> {
    strings(&[
        "software engineer",
        "programming",
        "codebase",
        "source code",
        "repository",
        "compiler",
        "refactor",
        "coding",
    ])
}

fn default_reasoning_keywords() -> Vec<String> {
    strings(&[
        "reason step by step",
        "think carefully",
        "chain of thought",
        "analyze",
        "analyse",
        "plan",
        "prove",
    ])
}

fn default_complexity_keywords() -> Vec<String> {
    strings(&[
        "implement",
        "refactor",
        "debug",
        "optimize",
        "analyze",
        "compare",
        "migrate",
        "write a function",
        "write tests",
        "review",
    ])
}

fn default_strong_complexity_keywords() -> Vec<String> {
    strings(&[
        "architecture",
        "from scratch",
        "step by step",
        "comprehensive",
        "in depth",
        "design a",
        "trade-off",
        "tradeoff",
    ])
}

fn default_force_tag() -> String {
    "[[COMPLEX]]".to_string()
}

fn default_caller_floors() -> BTreeMap<String, ComplexityTier> {
    BTreeMap::from([("autonomous-agent".to_string(), ComplexityTier::Moderate)])
}

/// One backend in the static catalogue.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BackendConfig {
    /// Unique backend identifier referenced by routes.
    pub id: String,

    /// Where the compute lives.
    pub kind: BackendKind,

    /// Base URL of the chat-completions API (without `/chat/completions`).
    pub base_url: String,

    /// Name of the environment variable holding a bearer token, if any.
    #[serde(default)]
    pub api_key_env: Option<String>,

    /// Models this backend serves.
    pub models: Vec<String>,

    /// In-flight request limit.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: u32,

    /// Informational ordering hint; chains are never reordered by it.
    #[serde(default)]
    pub priority: i32,

    /// Per-backend override of `server.request_timeout_secs`.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_max_concurrent() -> u32 {
    1
}

fn default_backends() -> Vec<BackendConfig> {
    vec![
        BackendConfig {
            id: "gpu-small".to_string(),
            kind: BackendKind::LocalGpu,
            base_url: "http://127.0.0.1:8080/v1".to_string(),
            api_key_env: None,
            models: vec!["qwen2.5-coder-7b-instruct".to_string()],
            max_concurrent: 1,
            priority: 0,
            timeout_secs: None,
        },
        BackendConfig {
            id: "gpu-large".to_string(),
            kind: BackendKind::LocalGpu,
            base_url: "http://127.0.0.1:8081/v1".to_string(),
            api_key_env: None,
            models: vec!["qwen2.5-coder-32b-instruct".to_string()],
            max_concurrent: 1,
            priority: 1,
            timeout_secs: None,
        },
        BackendConfig {
            id: "cloud".to_string(),
            kind: BackendKind::Cloud,
            base_url: "https://openrouter.ai/api/v1".to_string(),
            api_key_env: Some("OPENROUTER_API_KEY".to_string()),
            models: vec!["anthropic/claude-sonnet-4".to_string()],
            max_concurrent: 8,
            priority: 2,
            timeout_secs: None,
        },
    ]
}

/// A single (backend, model) candidate in a fallback chain.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RouteEntry {
    pub backend: String,
    pub model: String,
}

impl RouteEntry {
    fn new(backend: &str, model: &str) -> Self {
        Self {
            backend: backend.to_string(),
            model: model.to_string(),
        }
    }
}

/// Fallback chains per tier, tried in order.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RoutesConfig {
    #[serde(default = "default_routine_route")]
    pub routine: Vec<RouteEntry>,

    #[serde(default = "default_moderate_route")]
    pub moderate: Vec<RouteEntry>,

    #[serde(default = "default_complex_route")]
    pub complex: Vec<RouteEntry>,
}

impl Default for RoutesConfig {
    fn default() -> Self {
        Self {
            routine: default_routine_route(),
            moderate: default_moderate_route(),
            complex: default_complex_route(),
        }
    }
}

impl RoutesConfig {
    /// The chain configured for `tier`.
    pub fn chain(&self, tier: ComplexityTier) -> &[RouteEntry] {
        match tier {
            ComplexityTier::Routine => &self.routine,
            ComplexityTier::Moderate => &self.moderate,
            ComplexityTier::Complex => &self.complex,
        }
    }
}

fn default_routine_route() -> Vec<RouteEntry> {
    vec![
        RouteEntry::new("gpu-small", "qwen2.5-coder-7b-instruct"),
        RouteEntry::new("gpu-large", "qwen2.5-coder-32b-instruct"),
        RouteEntry::new("cloud", "anthropic/claude-sonnet-4"),
    ]
}

fn default_moderate_route() -> Vec<RouteEntry> {
    vec![
        RouteEntry::new("gpu-large", "qwen2.5-coder-32b-instruct"),
        RouteEntry::new("cloud", "anthropic/claude-sonnet-4"),
    ]
}

fn default_complex_route() -> Vec<RouteEntry> {
    vec![RouteEntry::new("cloud", "anthropic/claude-sonnet-4")]
}

/// Operating-mode restriction.
///
/// While `constrained` is set, every tier is pinned to `constrained_backend`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ModeConfig {
    /// Start in constrained mode. Can be toggled at runtime.
    #[serde(default)]
    pub constrained: bool,

    /// The only backend selectable while constrained.
    #[serde(default = "default_constrained_backend")]
    pub constrained_backend: String,
}

impl Default for ModeConfig {
    fn default() -> Self {
        Self {
            constrained: false,
            constrained_backend: default_constrained_backend(),
        }
    }
}

fn default_constrained_backend() -> String {
    "gpu-small".to_string()
}

/// Prometheus metrics exporter configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PrometheusConfig {
    /// Enable the `/metrics` endpoint.
    #[serde(default = "default_prometheus_enabled")]
    pub enabled: bool,
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            enabled: default_prometheus_enabled(),
        }
    }
}

fn default_prometheus_enabled() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_routes_reference_default_backends() {
        let config = TiergateConfig::default();
        for tier in ComplexityTier::ALL {
            for entry in config.routes.chain(tier) {
                let backend = config
                    .backend(&entry.backend)
                    .unwrap_or_else(|| panic!("unknown backend {}", entry.backend));
                assert!(backend.models.contains(&entry.model));
            }
        }
    }

    #[test]
    fn default_floor_covers_autonomous_agents() {
        let config = ClassifierConfig::default();
        assert_eq!(
            config.caller_floors.get("autonomous-agent"),
            Some(&ComplexityTier::Moderate)
        );
    }

    #[test]
    fn chains_run_local_before_cloud() {
        let routes = RoutesConfig::default();
        assert_eq!(routes.routine[0].backend, "gpu-small");
        assert_eq!(routes.routine.last().unwrap().backend, "cloud");
    }
}

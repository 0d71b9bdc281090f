// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Value types shared by the classifier, selector, translator, and gateway.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// How computationally demanding a request is.
///
/// Ordered: `Routine < Moderate < Complex`, so tiers combine with `max`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum ComplexityTier {
    /// Short chat, lookups, trivial edits.
    Routine,
    /// General coding and multi-turn work.
    Moderate,
    /// Large-context, tool-heavy, or deep reasoning work.
    Complex,
}

impl ComplexityTier {
    /// All tiers in ascending order.
    pub const ALL: [ComplexityTier; 3] = [
        ComplexityTier::Routine,
        ComplexityTier::Moderate,
        ComplexityTier::Complex,
    ];
}

/// Where a backend's compute lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    LocalGpu,
    Cloud,
}

/// Origin of a classification signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SignalSource {
    Heuristic,
    Caller,
}

/// Why a fallback-chain candidate was passed over during selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    /// The backend (or the router) is in an operating mode that disallows this tier.
    RestrictedMode,
    /// The health prober last reported the backend as down.
    Unhealthy,
    /// Every concurrency slot on the backend is taken.
    AtCapacity,
}

/// One candidate the selector skipped, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedCandidate {
    pub backend: String,
    pub model: String,
    pub reason: SkipReason,
}

impl std::fmt::Display for SkippedCandidate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{} ({})", self.backend, self.model, self.reason)
    }
}

/// Live health of one backend, as last reported by the health prober.
///
/// Carries no in-flight count; only slot acquisition and release change that.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub healthy: bool,
    /// The backend is in a restricted operating mode and only accepts routine work.
    #[serde(default)]
    pub mode_restricted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self {
            healthy: true,
            mode_restricted: false,
            last_error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn tiers_are_ordered() {
        assert!(ComplexityTier::Routine < ComplexityTier::Moderate);
        assert!(ComplexityTier::Moderate < ComplexityTier::Complex);
        assert_eq!(
            ComplexityTier::Routine.max(ComplexityTier::Complex),
            ComplexityTier::Complex
        );
    }

    #[test]
    fn tier_parses_case_insensitively() {
        assert_eq!(
            ComplexityTier::from_str("MODERATE").unwrap(),
            ComplexityTier::Moderate
        );
        assert_eq!(
            ComplexityTier::from_str("complex").unwrap(),
            ComplexityTier::Complex
        );
        assert!(ComplexityTier::from_str("extreme").is_err());
    }

    #[test]
    fn tier_display_matches_serde() {
        for tier in ComplexityTier::ALL {
            let json = serde_json::to_value(tier).unwrap();
            assert_eq!(json, tier.to_string());
        }
    }

    #[test]
    fn skip_reason_is_kebab_case() {
        assert_eq!(SkipReason::AtCapacity.to_string(), "at-capacity");
        assert_eq!(
            serde_json::to_value(SkipReason::RestrictedMode).unwrap(),
            "restricted-mode"
        );
    }

    #[test]
    fn backend_kind_round_trips() {
        assert_eq!(BackendKind::from_str("local-gpu").unwrap(), BackendKind::LocalGpu);
        assert_eq!(BackendKind::Cloud.to_string(), "cloud");
    }

    #[test]
    fn skipped_candidate_display() {
        let skip = SkippedCandidate {
            backend: "gpu-small".into(),
            model: "qwen".into(),
            reason: SkipReason::Unhealthy,
        };
        assert_eq!(skip.to_string(), "gpu-small/qwen (unhealthy)");
    }

    #[test]
    fn health_status_defaults_to_healthy() {
        let status: HealthStatus = serde_json::from_str(r#"{"healthy": true}"#).unwrap();
        assert_eq!(status, HealthStatus::default());
        let down: HealthStatus =
            serde_json::from_str(r#"{"healthy": false, "last_error": "oom"}"#).unwrap();
        assert!(!down.healthy);
        assert_eq!(down.last_error.as_deref(), Some("oom"));
    }
}

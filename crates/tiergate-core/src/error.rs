// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Tiergate router.

use std::time::Duration;

use thiserror::Error;

use crate::types::{ComplexityTier, SkippedCandidate};

/// The error type shared by every Tiergate crate.
///
/// Classification has no variant here: the classifier cannot fail.
#[derive(Debug, Error)]
pub enum TiergateError {
    /// Configuration errors (invalid TOML, dangling route references, bad cutoffs).
    #[error("configuration error: {0}")]
    Config(String),

    /// Every candidate in the tier's fallback chain was skipped.
    #[error("no backend available for tier {tier}: {}", render_skips(skipped))]
    NoBackendAvailable {
        tier: ComplexityTier,
        skipped: Vec<SkippedCandidate>,
    },

    /// The client payload cannot be expressed in the backend protocol.
    #[error("translation error: {0}")]
    Translation(String),

    /// The backend did not answer within the configured deadline.
    #[error("backend {backend} timed out after {duration:?}")]
    BackendTimeout { backend: String, duration: Duration },

    /// The backend answered with an error, or the transport failed.
    #[error("backend {backend} error: {message}")]
    Backend {
        backend: String,
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The client went away before the response completed.
    #[error("client cancelled the request")]
    ClientCancelled,

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl TiergateError {
    /// Short machine-readable label used for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            TiergateError::Config(_) => "config",
            TiergateError::NoBackendAvailable { .. } => "no_backend_available",
            TiergateError::Translation(_) => "translation",
            TiergateError::BackendTimeout { .. } => "backend_timeout",
            TiergateError::Backend { .. } => "backend",
            TiergateError::ClientCancelled => "client_cancelled",
            TiergateError::Internal(_) => "internal",
        }
    }

    /// Whether this error counts against the backend's reliability.
    pub fn is_backend_fault(&self) -> bool {
        matches!(
            self,
            TiergateError::BackendTimeout { .. } | TiergateError::Backend { .. }
        )
    }
}

fn render_skips(skipped: &[SkippedCandidate]) -> String {
    if skipped.is_empty() {
        return "empty fallback chain".to_string();
    }
    skipped
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core types for the Tiergate model router.
//!
//! This crate holds the error taxonomy and the small value types that flow
//! between the classifier, the backend selector, the protocol translator,
//! and the HTTP gateway.

pub mod error;
pub mod types;

pub use error::TiergateError;
pub use types::{
    BackendKind, ComplexityTier, HealthStatus, SignalSource, SkipReason, SkippedCandidate,
};

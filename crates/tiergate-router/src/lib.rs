// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Complexity classification and backend selection for the Tiergate router.
//!
//! This crate provides:
//! - [`QueryClassifier`]: deterministic heuristic scoring with caller-declared overrides
//! - [`BackendDirectory`]: the backend catalogue with per-backend health and load
//! - [`BackendSelector`]: fallback-chain selection with scoped slot acquisition
//!
//! Classification is pure and synchronous. Selection never blocks: it either
//! returns a backend holding a slot, or fails immediately with the reason each
//! candidate was skipped.

pub mod classifier;
pub mod directory;
pub mod selector;
pub mod signals;

pub use classifier::{
    ClassificationResult, ClassificationSignal, QueryClassifier, estimate_input_tokens,
};
pub use directory::{BackendDescriptor, BackendDirectory, BackendSnapshot, RouteCandidate};
pub use selector::{BackendSelector, Selection, SlotGuard};
pub use signals::{CallerHints, strip_force_tag};

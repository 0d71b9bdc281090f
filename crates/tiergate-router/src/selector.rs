// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Backend selection with scoped slot acquisition.
//!
//! [`BackendSelector::select`] walks a tier's fallback chain in order and
//! returns the first candidate that is allowed by the operating mode, healthy,
//! and has a free slot. A backend flagged `mode_restricted` takes only routine
//! work, except when it is the pinned backend of constrained mode. The slot is taken in the same step and handed back as
//! a [`SlotGuard`], which returns it exactly once when dropped.

use std::sync::Arc;

use tiergate_core::{ComplexityTier, SkipReason, SkippedCandidate, TiergateError};
use tracing::debug;

use crate::directory::{BackendDescriptor, BackendDirectory, BackendSlot, RouteCandidate};

/// A chosen backend/model pair holding one in-flight slot.
#[derive(Debug)]
pub struct Selection {
    pub backend: Arc<BackendDescriptor>,
    pub model: String,
    /// Candidates passed over before this one.
    pub skipped: Vec<SkippedCandidate>,
    pub guard: SlotGuard,
}

/// Releases its backend slot when dropped.
#[derive(Debug)]
pub struct SlotGuard {
    slot: Arc<BackendSlot>,
}

impl SlotGuard {
    pub fn backend_id(&self) -> &str {
        &self.slot.descriptor.id
    }

    /// Release the slot now.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.slot.release();
        debug!(backend = %self.slot.descriptor.id, "backend slot released");
    }
}

/// Picks backends for tiers.
#[derive(Debug, Clone)]
pub struct BackendSelector {
    directory: Arc<BackendDirectory>,
}

impl BackendSelector {
    pub fn new(directory: Arc<BackendDirectory>) -> Self {
        Self { directory }
    }

    pub fn directory(&self) -> &Arc<BackendDirectory> {
        &self.directory
    }

    /// Select and acquire a backend for `tier`, or report why none qualified.
    ///
    /// Never blocks and never retries. Chain order is authoritative.
    pub fn select(&self, tier: ComplexityTier) -> Result<Selection, TiergateError> {
        let dir = &self.directory;
        let constrained = dir.is_constrained();
        let mut skipped = Vec::new();

        for candidate in self.candidates(tier, constrained) {
            let Some(slot) = dir.slot(&candidate.backend) else {
                continue;
            };

            // While constrained, the pinned backend serves every tier.
            let pinned = constrained && candidate.backend == dir.constrained_backend();
            let reason = if constrained && !pinned {
                Some(SkipReason::RestrictedMode)
            } else {
                let health = slot.health();
                if health.mode_restricted && !pinned && tier != ComplexityTier::Routine {
                    Some(SkipReason::RestrictedMode)
                } else if !health.healthy {
                    Some(SkipReason::Unhealthy)
                } else if !slot.try_acquire() {
                    Some(SkipReason::AtCapacity)
                } else {
                    None
                }
            };

            match reason {
                Some(reason) => {
                    debug!(
                        tier = %tier,
                        backend = %candidate.backend,
                        model = %candidate.model,
                        reason = %reason,
                        "skipping candidate"
                    );
                    skipped.push(SkippedCandidate {
                        backend: candidate.backend,
                        model: candidate.model,
                        reason,
                    });
                }
                None => {
                    return Ok(Selection {
                        backend: Arc::clone(&slot.descriptor),
                        model: candidate.model,
                        skipped,
                        guard: SlotGuard {
                            slot: Arc::clone(slot),
                        },
                    });
                }
            }
        }

        Err(TiergateError::NoBackendAvailable { tier, skipped })
    }

    /// The tier's chain; in constrained mode the constrained backend is
    /// appended when the chain does not already include it.
    fn candidates(&self, tier: ComplexityTier, constrained: bool) -> Vec<RouteCandidate> {
        let dir = &self.directory;
        let mut chain = dir.chain(tier).to_vec();
        if constrained && !chain.iter().any(|c| c.backend == dir.constrained_backend()) {
            if let Some(model) = dir
                .descriptor(dir.constrained_backend())
                .and_then(|d| d.models.first().cloned())
            {
                chain.push(RouteCandidate {
                    backend: dir.constrained_backend().to_string(),
                    model,
                });
            }
        }
        chain
    }
}

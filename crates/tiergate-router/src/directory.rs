// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Backend directory: the static catalogue plus live per-backend state.
//!
//! The backend table itself is immutable after construction. Each backend
//! owns its live state: an atomic in-flight counter and an atomically
//! swapped health record. A health update for one backend never blocks
//! selection on another, and no table-wide lock exists.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use arc_swap::ArcSwap;
use serde::Serialize;
use tiergate_config::TiergateConfig;
use tiergate_config::model::BackendConfig;
use tiergate_core::{BackendKind, ComplexityTier, HealthStatus, TiergateError};
use tracing::{debug, info};

/// Static description of one backend. Immutable for the process lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendDescriptor {
    pub id: String,
    pub kind: BackendKind,
    pub models: Vec<String>,
    pub max_concurrent: u32,
    pub priority: i32,
    /// Per-backend deadline override.
    #[serde(skip)]
    pub timeout: Option<Duration>,
}

impl From<&BackendConfig> for BackendDescriptor {
    fn from(config: &BackendConfig) -> Self {
        Self {
            id: config.id.clone(),
            kind: config.kind,
            models: config.models.clone(),
            max_concurrent: config.max_concurrent,
            priority: config.priority,
            timeout: config.timeout_secs.map(Duration::from_secs),
        }
    }
}

/// One candidate in a fallback chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteCandidate {
    pub backend: String,
    pub model: String,
}

/// Live state of one backend.
#[derive(Debug)]
pub(crate) struct BackendSlot {
    pub(crate) descriptor: Arc<BackendDescriptor>,
    in_flight: AtomicU32,
    health: ArcSwap<HealthStatus>,
}

impl BackendSlot {
    fn new(descriptor: BackendDescriptor) -> Self {
        Self {
            descriptor: Arc::new(descriptor),
            in_flight: AtomicU32::new(0),
            health: ArcSwap::from_pointee(HealthStatus::default()),
        }
    }

    /// Take one slot if any is free. Check and increment are one atomic step.
    pub(crate) fn try_acquire(&self) -> bool {
        let max = self.descriptor.max_concurrent;
        self.in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < max).then_some(n + 1)
            })
            .is_ok()
    }

    /// Return one slot. Saturates at zero.
    pub(crate) fn release(&self) {
        let _ = self
            .in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }

    pub(crate) fn in_flight(&self) -> u32 {
        self.in_flight.load(Ordering::Acquire)
    }

    pub(crate) fn health(&self) -> Arc<HealthStatus> {
        self.health.load_full()
    }
}

/// Point-in-time view of one backend for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct BackendSnapshot {
    #[serde(flatten)]
    pub descriptor: BackendDescriptor,
    pub in_flight: u32,
    #[serde(flatten)]
    pub health: HealthStatus,
}

/// The backend catalogue, tier routes, and live health/load table.
#[derive(Debug)]
pub struct BackendDirectory {
    slots: HashMap<String, Arc<BackendSlot>>,
    /// Catalogue order, for stable snapshots.
    order: Vec<String>,
    routes: [Vec<RouteCandidate>; 3],
    constrained: AtomicBool,
    constrained_backend: String,
}

impl BackendDirectory {
    /// Build the directory from a loaded configuration.
    ///
    /// Route entries must reference catalogued (backend, model) pairs.
    pub fn from_config(config: &TiergateConfig) -> Result<Self, TiergateError> {
        let mut slots = HashMap::new();
        let mut order = Vec::new();
        for backend in &config.backends {
            if slots
                .insert(
                    backend.id.clone(),
                    Arc::new(BackendSlot::new(BackendDescriptor::from(backend))),
                )
                .is_some()
            {
                return Err(TiergateError::Config(format!(
                    "duplicate backend id `{}`",
                    backend.id
                )));
            }
            order.push(backend.id.clone());
        }

        let chain = |tier: ComplexityTier| -> Result<Vec<RouteCandidate>, TiergateError> {
            config
                .routes
                .chain(tier)
                .iter()
                .map(|entry| {
                    let slot = slots.get(&entry.backend).ok_or_else(|| {
                        TiergateError::Config(format!(
                            "routes.{tier} references unknown backend `{}`",
                            entry.backend
                        ))
                    })?;
                    if !slot.descriptor.models.contains(&entry.model) {
                        return Err(TiergateError::Config(format!(
                            "routes.{tier}: backend `{}` does not serve `{}`",
                            entry.backend, entry.model
                        )));
                    }
                    Ok(RouteCandidate {
                        backend: entry.backend.clone(),
                        model: entry.model.clone(),
                    })
                })
                .collect()
        };
        let routes = [
            chain(ComplexityTier::Routine)?,
            chain(ComplexityTier::Moderate)?,
            chain(ComplexityTier::Complex)?,
        ];

        if !slots.contains_key(&config.mode.constrained_backend) {
            return Err(TiergateError::Config(format!(
                "mode.constrained_backend references unknown backend `{}`",
                config.mode.constrained_backend
            )));
        }

        Ok(Self {
            slots,
            order,
            routes,
            constrained: AtomicBool::new(config.mode.constrained),
            constrained_backend: config.mode.constrained_backend.clone(),
        })
    }

    /// The configured fallback chain for `tier`.
    pub fn chain(&self, tier: ComplexityTier) -> &[RouteCandidate] {
        match tier {
            ComplexityTier::Routine => &self.routes[0],
            ComplexityTier::Moderate => &self.routes[1],
            ComplexityTier::Complex => &self.routes[2],
        }
    }

    /// Replace a backend's health record.
    ///
    /// Returns `false` for an unknown backend id. Never touches `in_flight`.
    pub fn update_health(&self, backend_id: &str, status: HealthStatus) -> bool {
        let Some(slot) = self.slots.get(backend_id) else {
            return false;
        };
        let previous = slot.health.swap(Arc::new(status.clone()));
        if previous.healthy != status.healthy || previous.mode_restricted != status.mode_restricted
        {
            info!(
                backend = backend_id,
                healthy = status.healthy,
                mode_restricted = status.mode_restricted,
                last_error = status.last_error.as_deref().unwrap_or(""),
                "backend health changed"
            );
        } else {
            debug!(backend = backend_id, "backend health refreshed");
        }
        true
    }

    /// Current health of a backend.
    pub fn health(&self, backend_id: &str) -> Option<HealthStatus> {
        self.slots.get(backend_id).map(|s| (*s.health()).clone())
    }

    /// Current in-flight count of a backend.
    pub fn in_flight(&self, backend_id: &str) -> Option<u32> {
        self.slots.get(backend_id).map(|s| s.in_flight())
    }

    pub fn descriptor(&self, backend_id: &str) -> Option<Arc<BackendDescriptor>> {
        self.slots.get(backend_id).map(|s| Arc::clone(&s.descriptor))
    }

    /// Toggle the router-wide constrained mode.
    pub fn set_constrained(&self, constrained: bool) {
        let was = self.constrained.swap(constrained, Ordering::AcqRel);
        if was != constrained {
            info!(
                constrained,
                backend = %self.constrained_backend,
                "operating mode changed"
            );
        }
    }

    pub fn is_constrained(&self) -> bool {
        self.constrained.load(Ordering::Acquire)
    }

    /// The only backend selectable while constrained.
    pub fn constrained_backend(&self) -> &str {
        &self.constrained_backend
    }

    /// Every backend with its live state, in catalogue order.
    pub fn snapshot(&self) -> Vec<BackendSnapshot> {
        self.order
            .iter()
            .filter_map(|id| self.slots.get(id))
            .map(|slot| BackendSnapshot {
                descriptor: (*slot.descriptor).clone(),
                in_flight: slot.in_flight(),
                health: (*slot.health()).clone(),
            })
            .collect()
    }

    pub(crate) fn slot(&self, backend_id: &str) -> Option<&Arc<BackendSlot>> {
        self.slots.get(backend_id)
    }
}

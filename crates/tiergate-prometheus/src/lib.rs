// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prometheus metrics for the Tiergate router.
//!
//! Uses the metrics-rs facade with the Prometheus exporter. Recording helpers
//! in [`recording`] are no-ops until a recorder is installed, so library code
//! can call them unconditionally.

pub mod recording;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tiergate_core::TiergateError;

pub use recording::{
    record_backend_error, record_request, record_request_latency, record_selection_failure,
    record_tokens, record_translation_warnings, set_backend_in_flight,
};

/// Installed Prometheus recorder.
#[derive(Clone)]
pub struct PrometheusExporter {
    handle: PrometheusHandle,
}

impl PrometheusExporter {
    /// Install the Prometheus recorder globally.
    ///
    /// Only one recorder can be installed per process; a second call fails.
    pub fn install() -> Result<Self, TiergateError> {
        let handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
            TiergateError::Internal(format!("failed to install Prometheus recorder: {e}"))
        })?;

        recording::register_metrics();

        tracing::info!("prometheus metrics recorder installed");

        Ok(Self { handle })
    }

    /// Render all collected metrics in Prometheus text format.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `tiergate serve` and `tiergate check-config`.

use std::fmt::Write as _;
use std::sync::Arc;

use tiergate_config::TiergateConfig;
use tiergate_core::{ComplexityTier, TiergateError};
use tiergate_gateway::{GatewayState, backends_from_config, start_server};
use tiergate_prometheus::PrometheusExporter;
use tracing::info;

use crate::shutdown;

/// Runs the gateway until SIGINT or SIGTERM.
pub async fn run_serve(config: TiergateConfig) -> Result<(), TiergateError> {
    init_tracing(&config.server.log_level);

    let backends = backends_from_config(&config)?;
    let mut state = GatewayState::new(&config, backends)?;

    if config.prometheus.enabled {
        let exporter = PrometheusExporter::install()?;
        state = state.with_prometheus_render(Arc::new(move || exporter.render()));
        info!("prometheus exporter installed");
    }

    if config.mode.constrained {
        info!(
            backend = %config.mode.constrained_backend,
            "starting in constrained mode"
        );
    }
    info!(
        backends = config.backends.len(),
        timeout_secs = config.server.request_timeout_secs,
        "tiergate starting"
    );

    let cancel = shutdown::install_signal_handler();
    start_server(&config.server.host, config.server.port, state, async move {
        cancel.cancelled().await;
    })
    .await?;

    info!("tiergate shutdown complete");
    Ok(())
}

/// Human-readable summary of a validated configuration.
pub fn describe_config(config: &TiergateConfig) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "config ok: listening on {}:{}",
        config.server.host, config.server.port
    );
    for backend in &config.backends {
        let _ = writeln!(
            out,
            "  backend {} ({}) max_concurrent={} models=[{}]",
            backend.id,
            backend.kind,
            backend.max_concurrent,
            backend.models.join(", ")
        );
    }
    for tier in ComplexityTier::ALL {
        let chain: Vec<String> = config
            .routes
            .chain(tier)
            .iter()
            .map(|c| format!("{}/{}", c.backend, c.model))
            .collect();
        let _ = writeln!(out, "  route {tier}: {}", chain.join(" -> "));
    }
    let _ = write!(
        out,
        "  mode: constrained={} backend={}",
        config.mode.constrained, config.mode.constrained_backend
    );
    out
}

fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("tiergate={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}

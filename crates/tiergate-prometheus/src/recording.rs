// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric descriptions and recording helpers.

use std::time::Duration;

use metrics::{describe_counter, describe_gauge, describe_histogram};
use tiergate_core::{ComplexityTier, SkippedCandidate};

/// Register metric descriptions with the installed recorder.
pub fn register_metrics() {
    describe_counter!(
        "tiergate_requests_total",
        "Requests classified, by tier and primary signal"
    );
    describe_counter!(
        "tiergate_selection_failures_total",
        "Requests for which no backend in the chain qualified"
    );
    describe_counter!(
        "tiergate_backend_errors_total",
        "Backend failures by backend and error kind"
    );
    describe_counter!(
        "tiergate_translation_warnings_total",
        "Tool calls finalized with unparseable arguments"
    );
    describe_counter!("tiergate_tokens_total", "Tokens reported by backends");
    describe_gauge!(
        "tiergate_backend_in_flight",
        "Requests currently holding a backend slot"
    );
    describe_histogram!(
        "tiergate_request_latency_seconds",
        "End-to-end request latency in seconds"
    );
}

/// Count one classified request.
pub fn record_request(tier: ComplexityTier, primary_signal: &str) {
    metrics::counter!(
        "tiergate_requests_total",
        "tier" => tier.to_string(),
        "primary_signal" => primary_signal.to_string()
    )
    .increment(1);
}

/// Count a failed selection, plus one skip per reason.
pub fn record_selection_failure(tier: ComplexityTier, skipped: &[SkippedCandidate]) {
    for candidate in skipped {
        metrics::counter!(
            "tiergate_selection_failures_total",
            "tier" => tier.to_string(),
            "reason" => candidate.reason.to_string()
        )
        .increment(1);
    }
    if skipped.is_empty() {
        metrics::counter!(
            "tiergate_selection_failures_total",
            "tier" => tier.to_string(),
            "reason" => "empty-chain"
        )
        .increment(1);
    }
}

/// Count a backend failure. `kind` is the error kind, e.g. `backend_timeout`.
pub fn record_backend_error(backend: &str, kind: &str) {
    metrics::counter!(
        "tiergate_backend_errors_total",
        "backend" => backend.to_string(),
        "kind" => kind.to_string()
    )
    .increment(1);
}

pub fn record_translation_warnings(count: usize) {
    if count > 0 {
        metrics::counter!("tiergate_translation_warnings_total").increment(count as u64);
    }
}

pub fn record_tokens(model: &str, input: u32, output: u32) {
    metrics::counter!("tiergate_tokens_total", "model" => model.to_string(), "type" => "input")
        .increment(u64::from(input));
    metrics::counter!("tiergate_tokens_total", "model" => model.to_string(), "type" => "output")
        .increment(u64::from(output));
}

pub fn set_backend_in_flight(backend: &str, in_flight: u32) {
    metrics::gauge!("tiergate_backend_in_flight", "backend" => backend.to_string())
        .set(f64::from(in_flight));
}

pub fn record_request_latency(elapsed: Duration) {
    metrics::histogram!("tiergate_request_latency_seconds").record(elapsed.as_secs_f64());
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use tiergate_core::SkipReason;

    fn render_with(record: impl FnOnce()) -> String {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, record);
        handle.render()
    }

    #[test]
    fn request_counter_carries_tier_and_signal() {
        let text = render_with(|| {
            record_request(ComplexityTier::Moderate, "caller_floor");
            record_request(ComplexityTier::Moderate, "caller_floor");
        });
        let line = text
            .lines()
            .find(|l| l.starts_with("tiergate_requests_total{"))
            .unwrap();
        assert!(line.contains("tier=\"moderate\""));
        assert!(line.contains("primary_signal=\"caller_floor\""));
        assert!(line.ends_with(" 2"));
    }

    #[test]
    fn selection_failure_counts_each_reason() {
        let skipped = vec![
            SkippedCandidate {
                backend: "gpu-small".into(),
                model: "qwen".into(),
                reason: SkipReason::AtCapacity,
            },
            SkippedCandidate {
                backend: "cloud".into(),
                model: "sonnet".into(),
                reason: SkipReason::Unhealthy,
            },
        ];
        let text = render_with(|| record_selection_failure(ComplexityTier::Complex, &skipped));
        assert!(text.contains("reason=\"at-capacity\""));
        assert!(text.contains("reason=\"unhealthy\""));
    }

    #[test]
    fn zero_warnings_record_nothing() {
        let text = render_with(|| record_translation_warnings(0));
        assert!(!text.contains("tiergate_translation_warnings_total"));
    }

    #[test]
    fn in_flight_gauge_per_backend() {
        let text = render_with(|| set_backend_in_flight("cloud", 3));
        assert!(text.contains("tiergate_backend_in_flight{backend=\"cloud\"} 3"));
    }
}

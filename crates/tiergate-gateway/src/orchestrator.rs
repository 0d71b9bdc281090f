// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request orchestration.
//!
//! Each request moves through
//! `Received → Classified → BackendSelected → TranslatingRequest →
//! AwaitingBackend → TranslatingResponse → Done`, or to `Failed` from any
//! earlier stage. The backend slot taken at selection lives in a
//! [`HeldSlot`], so every exit path (error return, timeout, or the client
//! dropping the response) releases it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tiergate_anthropic::{MessagesRequest, MessagesResponse};
use tiergate_core::{ComplexityTier, TiergateError};
use tiergate_prometheus::recording;
use tiergate_router::{
    BackendDirectory, CallerHints, ClassificationResult, SlotGuard, estimate_input_tokens,
    strip_force_tag,
};
use tiergate_translate::{
    ClientResponse, TranslationContext, TranslationWarning, to_backend_request,
    to_client_response, to_client_stream,
};
use tracing::{debug, info, trace, warn};

use crate::server::GatewayState;
use crate::sse::LiveStream;

/// Lifecycle stage of one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStage {
    Received,
    Classified,
    BackendSelected,
    TranslatingRequest,
    AwaitingBackend,
    TranslatingResponse,
    Done,
    Failed,
}

impl RequestStage {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestStage::Received => "received",
            RequestStage::Classified => "classified",
            RequestStage::BackendSelected => "backend_selected",
            RequestStage::TranslatingRequest => "translating_request",
            RequestStage::AwaitingBackend => "awaiting_backend",
            RequestStage::TranslatingResponse => "translating_response",
            RequestStage::Done => "done",
            RequestStage::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RequestStage::Done | RequestStage::Failed)
    }
}

/// Where a request was routed, echoed back in response headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteInfo {
    pub tier: ComplexityTier,
    pub backend: String,
    pub model: String,
}

/// A routed request ready to be written to the client.
pub enum Routed {
    Complete {
        route: RouteInfo,
        message: MessagesResponse,
    },
    Stream {
        route: RouteInfo,
        stream: LiveStream,
    },
}

/// A failed request. Classification never fails, so the tier is always known.
#[derive(Debug)]
pub struct Failure {
    pub tier: ComplexityTier,
    pub error: TiergateError,
}

/// A backend slot that is released, and the in-flight gauge refreshed,
/// when dropped.
pub(crate) struct HeldSlot {
    guard: Option<SlotGuard>,
    directory: Arc<BackendDirectory>,
}

impl HeldSlot {
    fn new(guard: SlotGuard, directory: Arc<BackendDirectory>) -> Self {
        publish_in_flight(&directory, guard.backend_id());
        Self {
            guard: Some(guard),
            directory,
        }
    }
}

impl Drop for HeldSlot {
    fn drop(&mut self) {
        if let Some(guard) = self.guard.take() {
            let backend = guard.backend_id().to_string();
            guard.release();
            publish_in_flight(&self.directory, &backend);
        }
    }
}

fn publish_in_flight(directory: &BackendDirectory, backend: &str) {
    if let Some(in_flight) = directory.in_flight(backend) {
        recording::set_backend_in_flight(backend, in_flight);
    }
}

/// Per-request bookkeeping. Emits exactly one summary line: on `done`,
/// on `fail`, or on drop if the client went away first.
pub(crate) struct RequestLog {
    request_id: String,
    started: Instant,
    stream: bool,
    stage: RequestStage,
    classification: Option<ClassificationResult>,
    backend: Option<String>,
    model: Option<String>,
}

impl RequestLog {
    fn new(stream: bool) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            started: Instant::now(),
            stream,
            stage: RequestStage::Received,
            classification: None,
            backend: None,
            model: None,
        }
    }

    fn advance(&mut self, stage: RequestStage) {
        trace!(
            request_id = %self.request_id,
            from = self.stage.as_str(),
            to = stage.as_str(),
            "request stage"
        );
        self.stage = stage;
    }

    pub(crate) fn request_id(&self) -> &str {
        &self.request_id
    }

    pub(crate) fn backend(&self) -> Option<&str> {
        self.backend.as_deref()
    }

    pub(crate) fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    fn tier(&self) -> ComplexityTier {
        self.classification
            .as_ref()
            .map_or(ComplexityTier::Routine, |c| c.tier)
    }

    pub(crate) fn done(&mut self) {
        self.advance(RequestStage::Done);
        self.emit("ok");
    }

    /// Records a failure and returns it with the request's tier.
    pub(crate) fn fail(&mut self, error: TiergateError) -> Failure {
        let failed_at = self.stage;
        self.advance(RequestStage::Failed);
        let backend = self.backend.as_deref().unwrap_or("-");
        if error.is_backend_fault() {
            recording::record_backend_error(backend, error.kind());
            warn!(
                request_id = %self.request_id,
                backend,
                stage = failed_at.as_str(),
                error = %error,
                "backend call failed"
            );
        }
        self.emit(error.kind());
        Failure {
            tier: self.tier(),
            error,
        }
    }

    fn emit(&self, outcome: &str) {
        let elapsed = self.started.elapsed();
        recording::record_request_latency(elapsed);

        let (tier, score, primary_signal, signals) = match &self.classification {
            Some(c) => (c.tier, c.score, c.primary_signal.as_str(), c.render_signals()),
            None => (ComplexityTier::Routine, 0.0, "", String::new()),
        };
        let backend = self.backend.as_deref().unwrap_or("-");
        let model = self.model.as_deref().unwrap_or("-");
        let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);

        if outcome == TiergateError::ClientCancelled.kind() {
            debug!(
                request_id = %self.request_id,
                tier = %tier,
                backend,
                model,
                stream = self.stream,
                stage = self.stage.as_str(),
                elapsed_ms,
                "client cancelled request"
            );
            return;
        }
        info!(
            request_id = %self.request_id,
            tier = %tier,
            score,
            primary_signal,
            signals = %signals,
            backend,
            model,
            stream = self.stream,
            outcome,
            elapsed_ms,
            "request completed"
        );
    }
}

impl Drop for RequestLog {
    fn drop(&mut self) {
        if !self.stage.is_terminal() {
            self.emit(TiergateError::ClientCancelled.kind());
        }
    }
}

/// Logs and counts translation warnings.
pub(crate) fn report_warnings(request_id: &str, warnings: &[TranslationWarning]) {
    if warnings.is_empty() {
        return;
    }
    for warning in warnings {
        warn!(request_id, %warning, "tool arguments did not parse as JSON");
    }
    recording::record_translation_warnings(warnings.len());
}

/// Runs one request through classification, selection, and the backend call.
///
/// For streaming requests this returns once the backend has accepted the
/// call; the returned [`LiveStream`] owns the slot until it ends or is dropped.
pub async fn route(
    state: &GatewayState,
    hints: CallerHints,
    mut request: MessagesRequest,
) -> Result<Routed, Failure> {
    let mut log = RequestLog::new(request.stream);

    let classification = state.classifier.classify(&request, &hints);
    recording::record_request(classification.tier, &classification.primary_signal);
    let tier = classification.tier;
    log.classification = Some(classification);
    log.advance(RequestStage::Classified);

    let selection = match state.selector.select(tier) {
        Ok(selection) => selection,
        Err(err) => {
            if let TiergateError::NoBackendAvailable { skipped, .. } = &err {
                recording::record_selection_failure(tier, skipped);
            }
            return Err(log.fail(err));
        }
    };
    let backend_id = selection.backend.id.clone();
    let model = selection.model.clone();
    let timeout = selection.backend.timeout.unwrap_or(state.default_timeout);
    let slot = HeldSlot::new(selection.guard, Arc::clone(state.directory()));
    log.backend = Some(backend_id.clone());
    log.model = Some(model.clone());
    log.advance(RequestStage::BackendSelected);

    log.advance(RequestStage::TranslatingRequest);
    if strip_force_tag(&mut request, &state.classifier.config().force_tag) {
        debug!(request_id = %log.request_id, "force tag stripped before forwarding");
    }
    let backend_request = match to_backend_request(&request, &model) {
        Ok(backend_request) => backend_request,
        Err(err) => return Err(log.fail(err)),
    };
    let client = match state.backend(&backend_id) {
        Ok(client) => client,
        Err(err) => return Err(log.fail(err)),
    };

    let route = RouteInfo {
        tier,
        backend: backend_id.clone(),
        model: model.clone(),
    };
    let deadline = tokio::time::Instant::now() + timeout;
    log.advance(RequestStage::AwaitingBackend);

    if request.stream {
        let chunks = match tokio::time::timeout_at(deadline, client.stream(&backend_request)).await
        {
            Ok(Ok(chunks)) => chunks,
            Ok(Err(err)) => return Err(log.fail(err)),
            Err(_) => return Err(log.fail(timeout_error(&backend_id, timeout))),
        };
        let input_tokens = u32::try_from(estimate_input_tokens(&request)).unwrap_or(u32::MAX);
        let events = to_client_stream(chunks, TranslationContext::new(model, input_tokens));
        log.advance(RequestStage::TranslatingResponse);
        let stream = LiveStream::new(events, deadline, timeout, slot, log);
        return Ok(Routed::Stream { route, stream });
    }

    let completion =
        match tokio::time::timeout_at(deadline, client.complete(&backend_request)).await {
            Ok(Ok(completion)) => completion,
            Ok(Err(err)) => return Err(log.fail(err)),
            Err(_) => return Err(log.fail(timeout_error(&backend_id, timeout))),
        };
    log.advance(RequestStage::TranslatingResponse);
    let ClientResponse { message, warnings } = to_client_response(completion, &model);
    report_warnings(log.request_id(), &warnings);
    recording::record_tokens(&model, message.usage.input_tokens, message.usage.output_tokens);

    drop(slot);
    log.done();
    Ok(Routed::Complete { route, message })
}

pub(crate) fn timeout_error(backend: &str, duration: Duration) -> TiergateError {
    TiergateError::BackendTimeout {
        backend: backend.to_string(),
        duration,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_done_and_failed_are_terminal() {
        let stages = [
            RequestStage::Received,
            RequestStage::Classified,
            RequestStage::BackendSelected,
            RequestStage::TranslatingRequest,
            RequestStage::AwaitingBackend,
            RequestStage::TranslatingResponse,
        ];
        assert!(stages.iter().all(|s| !s.is_terminal()));
        assert!(RequestStage::Done.is_terminal());
        assert!(RequestStage::Failed.is_terminal());
    }

    #[test]
    fn failure_carries_classified_tier() {
        let mut log = RequestLog::new(false);
        log.classification = Some(ClassificationResult {
            tier: ComplexityTier::Complex,
            score: 0.9,
            signals: Vec::new(),
            primary_signal: "tools".into(),
        });
        let failure = log.fail(TiergateError::Translation("bad".into()));
        assert_eq!(failure.tier, ComplexityTier::Complex);
        assert_eq!(log.stage, RequestStage::Failed);
    }
}

// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Server-Sent Events plumbing for streamed responses.

use std::convert::Infallible;
use std::pin::Pin;
use std::time::Duration;

use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures::{Stream, StreamExt};
use tiergate_anthropic::StreamEvent;
use tiergate_core::TiergateError;
use tiergate_prometheus::recording;
use tiergate_translate::ClientEventStream;
use tokio::time::{Instant, Sleep};

use crate::error::error_event;
use crate::orchestrator::{HeldSlot, RequestLog, report_warnings, timeout_error};

/// A translated backend stream that owns the request's backend slot.
///
/// The whole exchange shares one deadline. When it passes, or the backend
/// fails mid-stream, a terminal `error` event is sent and the stream ends.
/// Dropping the stream (client disconnect) tears down the backend stream
/// and releases the slot.
pub struct LiveStream {
    events: ClientEventStream,
    deadline: Pin<Box<Sleep>>,
    timeout: Duration,
    slot: Option<HeldSlot>,
    log: RequestLog,
    done: bool,
}

enum Step {
    Event(Option<Result<StreamEvent, TiergateError>>),
    Deadline,
}

impl LiveStream {
    pub(crate) fn new(
        events: ClientEventStream,
        deadline: Instant,
        timeout: Duration,
        slot: HeldSlot,
        log: RequestLog,
    ) -> Self {
        Self {
            events,
            deadline: Box::pin(tokio::time::sleep_until(deadline)),
            timeout,
            slot: Some(slot),
            log,
            done: false,
        }
    }

    /// The SSE event stream to hand to axum.
    pub fn into_events(self) -> impl Stream<Item = Result<Event, Infallible>> + Send + 'static {
        futures::stream::unfold(self, LiveStream::next_event)
    }

    async fn next_event(mut self) -> Option<(Result<Event, Infallible>, Self)> {
        if self.done {
            return None;
        }
        let step = tokio::select! {
            biased;
            () = self.deadline.as_mut() => Step::Deadline,
            item = self.events.next() => Step::Event(item),
        };
        match step {
            Step::Event(Some(Ok(event))) => Some((Ok(to_sse_event(&event)), self)),
            Step::Event(Some(Err(err))) => {
                let event = self.fail(err);
                Some((Ok(event), self))
            }
            Step::Event(None) => {
                self.complete();
                None
            }
            Step::Deadline => {
                let backend = self.log.backend().unwrap_or("-").to_string();
                let event = self.fail(timeout_error(&backend, self.timeout));
                Some((Ok(event), self))
            }
        }
    }

    fn complete(&mut self) {
        self.done = true;
        drop(self.slot.take());
        let context = self.events.context();
        report_warnings(self.log.request_id(), context.warnings());
        if let (Some(usage), Some(model)) = (context.usage(), self.log.model()) {
            recording::record_tokens(model, usage.input_tokens, usage.output_tokens);
        }
        self.log.done();
    }

    fn fail(&mut self, err: TiergateError) -> Event {
        self.done = true;
        drop(self.slot.take());
        let event = to_sse_event(&error_event(&err));
        self.log.fail(err);
        event
    }
}

/// Encodes one client event as an SSE frame.
pub fn to_sse_event(event: &StreamEvent) -> Event {
    match Event::default().event(event.event_name()).json_data(event) {
        Ok(sse) => sse,
        Err(e) => {
            let fallback = StreamEvent::error("api_error", format!("failed to encode event: {e}"));
            Event::default()
                .event(fallback.event_name())
                .data(serde_json::to_string(&fallback).unwrap_or_default())
        }
    }
}

/// Wraps a live stream in an axum SSE response with keep-alive comments.
pub fn into_response(stream: LiveStream) -> Response {
    Sse::new(stream.into_events())
        .keep_alive(KeepAlive::default())
        .into_response()
}

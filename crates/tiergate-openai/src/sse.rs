// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SSE parser for streaming chat-completions responses.
//!
//! Converts a byte stream into typed [`ChatCompletionChunk`]s using the
//! `eventsource-stream` crate. A `data:` payload that does not parse is held
//! back and retried concatenated with the next payload, which recovers chunks
//! that a proxy split mid-JSON. The stream ends at `data: [DONE]` or at EOF;
//! a payload still pending at that point is an error. An `{"error": ...}`
//! payload ends the stream with a backend error.

use std::pin::Pin;
use std::task::{Context, Poll, ready};

use eventsource_stream::{Event, EventStreamError, Eventsource};
use futures::stream::Stream;
use pin_project_lite::pin_project;
use tiergate_core::TiergateError;
use tracing::{debug, warn};

use crate::types::{ApiErrorResponse, ChatCompletionChunk};

/// Boxed stream of parsed chunks, as returned by backend clients.
pub type ChunkStreamBox = Pin<Box<dyn Stream<Item = Result<ChatCompletionChunk, TiergateError>> + Send>>;

const DONE_SENTINEL: &str = "[DONE]";

pin_project! {
    /// Stream adapter from SSE events to chat-completions chunks.
    pub struct ChunkStream<S> {
        #[pin]
        events: S,
        backend: String,
        pending: String,
        finished: bool,
    }
}

/// Parse a backend's SSE byte stream into chunks.
pub fn chunk_stream<S, B, E>(
    backend: impl Into<String>,
    bytes: S,
) -> ChunkStream<eventsource_stream::EventStream<S>>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    ChunkStream {
        events: bytes.eventsource(),
        backend: backend.into(),
        pending: String::new(),
        finished: false,
    }
}

/// Decodes one payload. `None` when it is not valid JSON for either shape.
fn decode(backend: &str, payload: &str) -> Option<Result<ChatCompletionChunk, TiergateError>> {
    if let Some(api_err) = ApiErrorResponse::parse(payload) {
        return Some(Err(TiergateError::Backend {
            backend: backend.to_string(),
            message: format!("backend error mid-stream: {}", api_err.message()),
            source: None,
        }));
    }
    serde_json::from_str::<ChatCompletionChunk>(payload).ok().map(Ok)
}

fn unresolved(backend: &str, pending: &str) -> TiergateError {
    TiergateError::Backend {
        backend: backend.to_string(),
        message: format!(
            "stream ended with an unparseable payload ({} bytes pending)",
            pending.len()
        ),
        source: None,
    }
}

impl<S, E> Stream for ChunkStream<S>
where
    S: Stream<Item = Result<Event, EventStreamError<E>>>,
    E: std::fmt::Display,
{
    type Item = Result<ChatCompletionChunk, TiergateError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();
        loop {
            if *this.finished {
                return Poll::Ready(None);
            }

            let event = match ready!(this.events.as_mut().poll_next(cx)) {
                Some(Ok(event)) => event,
                Some(Err(e)) => {
                    *this.finished = true;
                    return Poll::Ready(Some(Err(TiergateError::Backend {
                        backend: this.backend.clone(),
                        message: format!("SSE stream error: {e}"),
                        source: None,
                    })));
                }
                None => {
                    *this.finished = true;
                    if this.pending.is_empty() {
                        return Poll::Ready(None);
                    }
                    return Poll::Ready(Some(Err(unresolved(this.backend, this.pending))));
                }
            };

            let data = event.data.trim();
            if data.is_empty() {
                continue;
            }
            if data == DONE_SENTINEL {
                *this.finished = true;
                if this.pending.is_empty() {
                    return Poll::Ready(None);
                }
                return Poll::Ready(Some(Err(unresolved(this.backend, this.pending))));
            }

            let decoded = if this.pending.is_empty() {
                let decoded = decode(this.backend, data);
                if decoded.is_none() {
                    debug!(backend = %this.backend, "buffering unparseable chunk");
                    this.pending.push_str(data);
                }
                decoded
            } else {
                this.pending.push_str(data);
                match decode(this.backend, this.pending) {
                    Some(decoded) => Some(decoded),
                    // The concatenation still fails; if the new payload stands on
                    // its own, the buffered prefix was garbage.
                    None => decode(this.backend, data).inspect(|_| {
                        warn!(
                            backend = %this.backend,
                            dropped_bytes = this.pending.len() - data.len(),
                            "discarding unparseable chunk"
                        );
                    }),
                }
            };

            match decoded {
                Some(Ok(chunk)) => {
                    this.pending.clear();
                    return Poll::Ready(Some(Ok(chunk)));
                }
                Some(Err(err)) => {
                    *this.finished = true;
                    this.pending.clear();
                    return Poll::Ready(Some(Err(err)));
                }
                None => continue,
            }
        }
    }
}

// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Streaming events in the client-facing SSE protocol.
//!
//! Every event serializes with its own `type` tag, and the SSE `event:` field
//! carries the same name ([`StreamEvent::event_name`]). [`parse_sse_stream`]
//! reads such a stream back into typed events.

use std::pin::Pin;

use eventsource_stream::Eventsource;
use futures::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tiergate_core::TiergateError;

use crate::types::{ErrorBody, MessagesResponse, ResponseBlock, StopReason, Usage};

/// Typed SSE events of the client-facing streaming protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Initial message metadata (id, model, empty content).
    MessageStart { message: MessagesResponse },
    /// A new content block begins.
    ContentBlockStart {
        index: usize,
        content_block: ResponseBlock,
    },
    /// Incremental update to a content block.
    ContentBlockDelta { index: usize, delta: BlockDelta },
    /// A content block has finished.
    ContentBlockStop { index: usize },
    /// Message-level delta (stop reason, final usage).
    MessageDelta { delta: MessageDeltaBody, usage: Usage },
    /// The message is complete.
    MessageStop,
    /// Keep-alive.
    Ping,
    /// Terminal error after streaming began.
    Error { error: ErrorBody },
}

impl StreamEvent {
    /// The SSE `event:` name for this event.
    pub fn event_name(&self) -> &'static str {
        match self {
            StreamEvent::MessageStart { .. } => "message_start",
            StreamEvent::ContentBlockStart { .. } => "content_block_start",
            StreamEvent::ContentBlockDelta { .. } => "content_block_delta",
            StreamEvent::ContentBlockStop { .. } => "content_block_stop",
            StreamEvent::MessageDelta { .. } => "message_delta",
            StreamEvent::MessageStop => "message_stop",
            StreamEvent::Ping => "ping",
            StreamEvent::Error { .. } => "error",
        }
    }

    /// A terminal `error` event.
    pub fn error(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        StreamEvent::Error {
            error: ErrorBody {
                type_: error_type.into(),
                message: message.into(),
                skipped: Vec::new(),
            },
        }
    }
}

/// A delta within a content block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockDelta {
    TextDelta { text: String },
    InputJsonDelta { partial_json: String },
}

/// Body of a `message_delta` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageDeltaBody {
    pub stop_reason: Option<StopReason>,
    #[serde(default)]
    pub stop_sequence: Option<String>,
}

/// Parses a client-protocol SSE byte stream into typed [`StreamEvent`]s.
///
/// The event payload's own `type` tag decides the variant. Payloads with an
/// unknown type are skipped.
pub fn parse_sse_stream<S, B, E>(
    bytes: S,
) -> Pin<Box<dyn Stream<Item = Result<StreamEvent, TiergateError>> + Send>>
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let mapped = bytes.eventsource().filter_map(|result| async move {
        match result {
            Ok(event) => {
                let value: serde_json::Value = match serde_json::from_str(&event.data) {
                    Ok(value) => value,
                    Err(e) => {
                        return Some(Err(TiergateError::Internal(format!(
                            "malformed {} event: {e}",
                            event.event
                        ))));
                    }
                };
                // Unknown event types are skipped.
                serde_json::from_value::<StreamEvent>(value).ok().map(Ok)
            }
            Err(e) => Some(Err(TiergateError::Internal(format!(
                "SSE stream error: {e}"
            )))),
        }
    });

    Box::pin(mapped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn events_carry_type_tags() {
        let event = StreamEvent::ContentBlockDelta {
            index: 1,
            delta: BlockDelta::InputJsonDelta {
                partial_json: "{\"comman".into(),
            },
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "content_block_delta");
        assert_eq!(json["index"], 1);
        assert_eq!(json["delta"]["type"], "input_json_delta");
        assert_eq!(json["delta"]["partial_json"], "{\"comman");
        assert_eq!(event.event_name(), "content_block_delta");
    }

    #[test]
    fn unit_events_serialize_as_bare_type() {
        assert_eq!(
            serde_json::to_value(StreamEvent::MessageStop).unwrap(),
            json!({"type": "message_stop"})
        );
    }

    #[test]
    fn event_name_matches_type_tag() {
        let events = [
            StreamEvent::MessageStart {
                message: MessagesResponse::empty("msg_1", "m"),
            },
            StreamEvent::ContentBlockStop { index: 0 },
            StreamEvent::MessageDelta {
                delta: MessageDeltaBody {
                    stop_reason: Some(StopReason::EndTurn),
                    stop_sequence: None,
                },
                usage: Usage::default(),
            },
            StreamEvent::Ping,
            StreamEvent::error("timeout_error", "deadline exceeded"),
        ];
        for event in events {
            let json = serde_json::to_value(&event).unwrap();
            assert_eq!(json["type"], event.event_name());
        }
    }

    #[tokio::test]
    async fn parses_sse_text_back_into_events() {
        let body = "event: message_start\n\
                    data: {\"type\":\"message_start\",\"message\":{\"id\":\"msg_1\",\"type\":\"message\",\"role\":\"assistant\",\"content\":[],\"model\":\"m\",\"stop_reason\":null,\"stop_sequence\":null,\"usage\":{\"input_tokens\":0,\"output_tokens\":0}}}\n\n\
                    event: future_event\n\
                    data: {\"type\":\"future_event\"}\n\n\
                    event: message_stop\n\
                    data: {\"type\":\"message_stop\"}\n\n";
        let chunks = futures::stream::iter(vec![Ok::<_, std::convert::Infallible>(
            body.as_bytes().to_vec(),
        )]);
        let events: Vec<_> = parse_sse_stream(chunks).collect().await;
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0].as_ref().unwrap(),
            &StreamEvent::MessageStart {
                message: MessagesResponse::empty("msg_1", "m"),
            }
        );
        assert!(matches!(events[1], Ok(StreamEvent::MessageStop)));
    }

    #[test]
    fn error_events_compare_by_type_and_message() {
        let timeout = StreamEvent::error("timeout_error", "deadline exceeded");
        let decoded: StreamEvent =
            serde_json::from_value(serde_json::to_value(&timeout).unwrap()).unwrap();
        assert_eq!(decoded, timeout);
        assert_ne!(timeout, StreamEvent::error("api_error", "deadline exceeded"));
    }
}

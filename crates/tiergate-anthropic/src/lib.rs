// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Client-facing protocol for the Tiergate router.
//!
//! Client tooling speaks the Anthropic Messages API: typed content blocks
//! (text, tool use, tool result, image) and a typed SSE event stream. This
//! crate models that wire format; it performs no I/O.

pub mod sse;
pub mod types;

pub use sse::{BlockDelta, MessageDeltaBody, StreamEvent, parse_sse_stream};
pub use types::{
    ContentBlock, ErrorResponse, Message, MessageContent, MessagesRequest, MessagesResponse,
    RequestMetadata, ResponseBlock, Role, StopReason, SystemPrompt, ToolChoice, ToolDefinition,
    ToolResultContent, Usage,
};

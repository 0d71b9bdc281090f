// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Protocol translation between the client-facing Messages API and the
//! backend chat-completions API.
//!
//! - [`to_backend_request`]: restructures the transcript (tool_use turns,
//!   tool_result splitting) and maps tools and tool_choice.
//! - [`to_client_response`]: maps a complete backend response.
//! - [`to_client_stream`] / [`TranslationContext`]: the delta-to-block state
//!   machine for streamed responses.

pub mod request;
pub mod response;
pub mod stream;

pub use request::to_backend_request;
pub use response::{ClientResponse, TranslationWarning, map_finish_reason, to_client_response};
pub use stream::{ClientEventStream, ToolCallBlock, TranslationContext, to_client_stream};

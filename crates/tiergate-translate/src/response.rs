// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Non-streaming backend response -> client response.

use std::fmt;

use serde_json::{Value, json};
use tiergate_anthropic::{MessagesResponse, ResponseBlock, StopReason, Usage};
use tiergate_openai::{ChatCompletion, ChatUsage};
use tracing::warn;

/// A tool call whose accumulated arguments were not valid JSON.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationWarning {
    pub tool_call_id: String,
    pub tool_name: String,
    /// The raw argument text as received.
    pub raw_arguments: String,
}

impl fmt::Display for TranslationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "tool call {} ({}) has unparseable arguments",
            self.tool_call_id, self.tool_name
        )
    }
}

/// A translated response plus any warnings raised along the way.
#[derive(Debug, Clone)]
pub struct ClientResponse {
    pub message: MessagesResponse,
    pub warnings: Vec<TranslationWarning>,
}

/// Translate a complete backend response for the client.
///
/// `model` is the model the request was routed to. Unparseable tool arguments
/// do not fail the response: the block's input becomes
/// `{"_parse_error": ..., "_raw": ...}` and a warning is returned.
pub fn to_client_response(completion: ChatCompletion, model: &str) -> ClientResponse {
    let id = if completion.id.is_empty() {
        new_message_id()
    } else {
        completion.id
    };
    let mut message = MessagesResponse::empty(id, model);
    message.usage = completion.usage.map(to_usage).unwrap_or_default();

    let mut warnings = Vec::new();
    let Some(choice) = completion.choices.into_iter().next() else {
        warn!(model, "backend response carried no choices");
        message.stop_reason = Some(StopReason::EndTurn);
        return ClientResponse { message, warnings };
    };

    if let Some(text) = choice.message.content.filter(|t| !t.is_empty()) {
        message.content.push(ResponseBlock::Text { text });
    }

    let has_tool_calls = !choice.message.tool_calls.is_empty();
    for call in choice.message.tool_calls {
        let input = match parse_arguments(&call.function.arguments) {
            Ok(input) => input,
            Err(e) => {
                let warning = TranslationWarning {
                    tool_call_id: call.id.clone(),
                    tool_name: call.function.name.clone(),
                    raw_arguments: call.function.arguments.clone(),
                };
                warn!(model, error = %e, "{warning}");
                warnings.push(warning);
                json!({"_parse_error": e.to_string(), "_raw": call.function.arguments})
            }
        };
        message.content.push(ResponseBlock::ToolUse {
            id: call.id,
            name: call.function.name,
            input,
        });
    }

    message.stop_reason = Some(if has_tool_calls {
        StopReason::ToolUse
    } else {
        map_finish_reason(choice.finish_reason.as_deref())
    });

    ClientResponse { message, warnings }
}

/// Backend finish reason -> client stop reason.
pub fn map_finish_reason(reason: Option<&str>) -> StopReason {
    match reason {
        Some("length") => StopReason::MaxTokens,
        Some("tool_calls" | "function_call") => StopReason::ToolUse,
        _ => StopReason::EndTurn,
    }
}

/// Parse accumulated tool arguments. Empty means no arguments.
pub(crate) fn parse_arguments(raw: &str) -> Result<Value, serde_json::Error> {
    if raw.trim().is_empty() {
        return Ok(json!({}));
    }
    serde_json::from_str(raw)
}

pub(crate) fn to_usage(usage: ChatUsage) -> Usage {
    Usage {
        input_tokens: usage.prompt_tokens,
        output_tokens: usage.completion_tokens,
    }
}

pub(crate) fn new_message_id() -> String {
    format!("msg_{}", uuid::Uuid::new_v4().simple())
}

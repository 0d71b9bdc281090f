// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Client request -> backend request.

use std::collections::HashSet;

use tiergate_anthropic::{
    ContentBlock, Message, MessageContent, MessagesRequest, Role, ToolChoice, ToolDefinition,
};
use tiergate_core::TiergateError;
use tiergate_openai::types::{NamedFunction, NamedToolChoice};
use tiergate_openai::{
    ChatCompletionRequest, ChatMessage, ChatTool, ChatToolChoice, FunctionDefinition, ToolCall,
};
use tracing::debug;

/// Translate a client request into a chat-completions request for `model`.
///
/// Fails with [`TiergateError::Translation`] when the transcript is
/// inconsistent, before any backend is contacted.
pub fn to_backend_request(
    request: &MessagesRequest,
    model: &str,
) -> Result<ChatCompletionRequest, TiergateError> {
    let mut messages = Vec::with_capacity(request.messages.len() + 1);

    if let Some(system) = &request.system {
        let text = system.text();
        if !text.is_empty() {
            messages.push(ChatMessage::system(text));
        }
    }

    let mut known_tool_ids = HashSet::new();
    for (turn, message) in request.messages.iter().enumerate() {
        match message.role {
            Role::Assistant => {
                messages.push(assistant_message(message, &mut known_tool_ids));
            }
            Role::User => user_messages(message, turn, &known_tool_ids, &mut messages)?,
        }
    }

    Ok(ChatCompletionRequest {
        model: model.to_string(),
        messages,
        tools: request.tools.iter().map(to_chat_tool).collect(),
        tool_choice: request.tool_choice.as_ref().map(to_chat_tool_choice),
        stream: request.stream,
        stream_options: None,
        max_tokens: request.max_tokens,
        temperature: request.temperature,
        top_p: request.top_p,
        stop: request.stop_sequences.clone(),
    })
}

/// One backend message: concatenated text plus every tool_use, in order.
fn assistant_message(message: &Message, known_tool_ids: &mut HashSet<String>) -> ChatMessage {
    let blocks = match &message.content {
        MessageContent::Text(text) => return ChatMessage::assistant(text.as_str(), Vec::new()),
        MessageContent::Blocks(blocks) => blocks,
    };

    let mut text = String::new();
    let mut tool_calls = Vec::new();
    for block in blocks {
        match block {
            ContentBlock::Text { text: t } => text.push_str(t),
            ContentBlock::ToolUse { id, name, input } => {
                known_tool_ids.insert(id.clone());
                tool_calls.push(ToolCall::function(id, name, input.to_string()));
            }
            other => dropped(other, Role::Assistant),
        }
    }
    ChatMessage::assistant(text, tool_calls)
}

/// Tool results become `tool` messages; remaining text becomes one user message.
///
/// Tool messages come first so they directly follow the assistant turn that
/// issued the calls.
fn user_messages(
    message: &Message,
    turn: usize,
    known_tool_ids: &HashSet<String>,
    out: &mut Vec<ChatMessage>,
) -> Result<(), TiergateError> {
    let blocks = match &message.content {
        MessageContent::Text(text) => {
            out.push(ChatMessage::user(text.as_str()));
            return Ok(());
        }
        MessageContent::Blocks(blocks) => blocks,
    };

    let mut text = String::new();
    let mut saw_text = false;
    for block in blocks {
        match block {
            ContentBlock::Text { text: t } => {
                saw_text = true;
                text.push_str(t);
            }
            ContentBlock::ToolResult {
                tool_use_id,
                content,
                ..
            } => {
                if !known_tool_ids.contains(tool_use_id) {
                    return Err(TiergateError::Translation(format!(
                        "messages[{turn}]: tool_result references unknown tool_use id `{tool_use_id}`"
                    )));
                }
                let content = content.as_ref().map(|c| c.text()).unwrap_or_default();
                out.push(ChatMessage::tool(tool_use_id, content));
            }
            other => dropped(other, Role::User),
        }
    }
    if saw_text {
        out.push(ChatMessage::user(text));
    }
    Ok(())
}

fn dropped(block: &ContentBlock, role: Role) {
    let kind = match block {
        ContentBlock::Image { .. } => "image",
        ContentBlock::ToolUse { .. } => "tool_use",
        ContentBlock::ToolResult { .. } => "tool_result",
        ContentBlock::Unknown => "unknown",
        ContentBlock::Text { .. } => "text",
    };
    debug!(kind, role = ?role, "dropping content block");
}

fn to_chat_tool(tool: &ToolDefinition) -> ChatTool {
    ChatTool {
        kind: "function".to_string(),
        function: FunctionDefinition {
            name: tool.name.clone(),
            description: tool.description.clone(),
            parameters: tool.input_schema.clone(),
        },
    }
}

fn to_chat_tool_choice(choice: &ToolChoice) -> ChatToolChoice {
    match choice {
        ToolChoice::Auto => ChatToolChoice::Mode("auto".to_string()),
        ToolChoice::Any => ChatToolChoice::Mode("required".to_string()),
        ToolChoice::None => ChatToolChoice::Mode("none".to_string()),
        ToolChoice::Tool { name } => ChatToolChoice::Named(NamedToolChoice {
            kind: "function".to_string(),
            function: NamedFunction { name: name.clone() },
        }),
    }
}

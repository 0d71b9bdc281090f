// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Streaming translation: backend chunk deltas -> client block events.
//!
//! [`TranslationContext`] is a synchronous state machine. Each backend chunk
//! is fed to [`TranslationContext::push`], which returns the client events it
//! produces; [`TranslationContext::finish`] closes every open block and emits
//! the terminal `message_delta` and `message_stop`.
//!
//! Block rules:
//! - text deltas go to the open text block, opening one if needed
//! - a tool-call delta with an unseen upstream index opens a new tool block,
//!   closing the text block first
//! - client block indices follow first appearance, never completion order
//! - tool blocks stay open until the stream ends, then close in opening order

use std::collections::{HashMap, VecDeque};
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::stream::{Stream, StreamExt};
use futures::ready;
use serde_json::{Value, json};
use tiergate_anthropic::{
    BlockDelta, MessageDeltaBody, MessagesResponse, ResponseBlock, StopReason, StreamEvent, Usage,
};
use tiergate_core::TiergateError;
use tiergate_openai::{ChatCompletionChunk, ChunkStreamBox, ToolCallDelta};
use tracing::warn;

use crate::response::{TranslationWarning, map_finish_reason, new_message_id, parse_arguments, to_usage};

/// One tool call being assembled from deltas.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallBlock {
    pub id: String,
    pub name: String,
    /// Argument text accumulated so far.
    pub arguments_partial_json: String,
    /// Client-facing block index.
    pub index: usize,
}

impl ToolCallBlock {
    /// Parsed arguments, or `None` while they are not valid JSON.
    pub fn input(&self) -> Option<Value> {
        parse_arguments(&self.arguments_partial_json).ok()
    }
}

/// Per-request state of the streaming translator.
#[derive(Debug)]
pub struct TranslationContext {
    message_id: Option<String>,
    model: String,
    input_tokens: u32,
    started: bool,
    finished: bool,
    /// Tool blocks in opening order.
    open_blocks: Vec<ToolCallBlock>,
    /// Upstream tool-call index -> position in `open_blocks`.
    by_upstream_index: HashMap<usize, usize>,
    next_block_index: usize,
    /// Client index of the open text block.
    text_block: Option<usize>,
    finish_reason: Option<String>,
    usage: Option<Usage>,
    warnings: Vec<TranslationWarning>,
}

impl TranslationContext {
    /// `model` is reported to the client; `input_tokens` seeds the usage in
    /// `message_start` until the backend reports real counts.
    pub fn new(model: impl Into<String>, input_tokens: u32) -> Self {
        Self {
            message_id: None,
            model: model.into(),
            input_tokens,
            started: false,
            finished: false,
            open_blocks: Vec::new(),
            by_upstream_index: HashMap::new(),
            next_block_index: 0,
            text_block: None,
            finish_reason: None,
            usage: None,
            warnings: Vec::new(),
        }
    }

    /// Translate one backend chunk.
    pub fn push(&mut self, chunk: ChatCompletionChunk) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if self.finished {
            return events;
        }
        if self.message_id.is_none() && !chunk.id.is_empty() {
            self.message_id = Some(chunk.id.clone());
        }
        self.ensure_started(&mut events);

        if let Some(usage) = chunk.usage {
            self.usage = Some(to_usage(usage));
        }

        // Only the first choice is forwarded; n > 1 is never requested.
        let Some(choice) = chunk.choices.into_iter().find(|c| c.index == 0) else {
            return events;
        };

        if let Some(text) = choice.delta.content.filter(|t| !t.is_empty()) {
            let index = self.open_text_block(&mut events);
            events.push(StreamEvent::ContentBlockDelta {
                index,
                delta: BlockDelta::TextDelta { text },
            });
        }

        for delta in choice.delta.tool_calls {
            self.push_tool_delta(delta, &mut events);
        }

        if let Some(reason) = choice.finish_reason {
            self.finish_reason = Some(reason);
        }
        events
    }

    /// Close every open block and emit the terminal events.
    ///
    /// Idempotent: a second call returns nothing.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if self.finished {
            return events;
        }
        self.ensure_started(&mut events);
        self.finished = true;

        let mut open: Vec<usize> = self.open_blocks.iter().map(|b| b.index).collect();
        open.extend(self.text_block.take());
        open.sort_unstable();
        events.extend(
            open.into_iter()
                .map(|index| StreamEvent::ContentBlockStop { index }),
        );

        for block in &self.open_blocks {
            if let Err(e) = parse_arguments(&block.arguments_partial_json) {
                let warning = TranslationWarning {
                    tool_call_id: block.id.clone(),
                    tool_name: block.name.clone(),
                    raw_arguments: block.arguments_partial_json.clone(),
                };
                warn!(model = %self.model, index = block.index, error = %e, "{warning}");
                self.warnings.push(warning);
            }
        }

        let stop_reason = if self.open_blocks.is_empty() {
            map_finish_reason(self.finish_reason.as_deref())
        } else {
            StopReason::ToolUse
        };
        let usage = self.usage.unwrap_or(Usage {
            input_tokens: self.input_tokens,
            output_tokens: 0,
        });
        events.push(StreamEvent::MessageDelta {
            delta: MessageDeltaBody {
                stop_reason: Some(stop_reason),
                stop_sequence: None,
            },
            usage,
        });
        events.push(StreamEvent::MessageStop);
        events
    }

    /// Tool blocks seen so far, in client index order.
    pub fn tool_calls(&self) -> &[ToolCallBlock] {
        &self.open_blocks
    }

    pub fn warnings(&self) -> &[TranslationWarning] {
        &self.warnings
    }

    pub fn usage(&self) -> Option<Usage> {
        self.usage
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn ensure_started(&mut self, events: &mut Vec<StreamEvent>) {
        if self.started {
            return;
        }
        self.started = true;
        let id = self
            .message_id
            .get_or_insert_with(new_message_id)
            .clone();
        let mut message = MessagesResponse::empty(id, self.model.clone());
        message.usage.input_tokens = self.input_tokens;
        events.push(StreamEvent::MessageStart { message });
    }

    fn open_text_block(&mut self, events: &mut Vec<StreamEvent>) -> usize {
        if let Some(index) = self.text_block {
            return index;
        }
        let index = self.take_index();
        self.text_block = Some(index);
        events.push(StreamEvent::ContentBlockStart {
            index,
            content_block: ResponseBlock::Text {
                text: String::new(),
            },
        });
        index
    }

    fn push_tool_delta(&mut self, delta: ToolCallDelta, events: &mut Vec<StreamEvent>) {
        let (name, arguments) = match delta.function {
            Some(f) => (f.name, f.arguments),
            None => (None, None),
        };

        let existing = self.by_upstream_index.get(&delta.index).copied();
        let position = match existing {
            Some(position) => position,
            None => {
                if let Some(index) = self.text_block.take() {
                    events.push(StreamEvent::ContentBlockStop { index });
                }
                let block = ToolCallBlock {
                    id: delta
                        .id
                        .filter(|id| !id.is_empty())
                        .unwrap_or_else(|| format!("toolu_{}", uuid::Uuid::new_v4().simple())),
                    name: name.unwrap_or_default(),
                    arguments_partial_json: String::new(),
                    index: self.take_index(),
                };
                events.push(StreamEvent::ContentBlockStart {
                    index: block.index,
                    content_block: ResponseBlock::ToolUse {
                        id: block.id.clone(),
                        name: block.name.clone(),
                        input: json!({}),
                    },
                });
                self.open_blocks.push(block);
                let position = self.open_blocks.len() - 1;
                self.by_upstream_index.insert(delta.index, position);
                position
            }
        };

        if let Some(fragment) = arguments.filter(|a| !a.is_empty()) {
            let block = &mut self.open_blocks[position];
            block.arguments_partial_json.push_str(&fragment);
            events.push(StreamEvent::ContentBlockDelta {
                index: block.index,
                delta: BlockDelta::InputJsonDelta {
                    partial_json: fragment,
                },
            });
        }
    }

    fn take_index(&mut self) -> usize {
        let index = self.next_block_index;
        self.next_block_index += 1;
        index
    }
}

/// Client events translated from a backend chunk stream.
///
/// Yields every event in order, then ends. A backend error is yielded once
/// and ends the stream without the terminal events; the caller reports it.
pub struct ClientEventStream {
    chunks: ChunkStreamBox,
    context: TranslationContext,
    queue: VecDeque<Result<StreamEvent, TiergateError>>,
    done: bool,
}

impl ClientEventStream {
    pub fn context(&self) -> &TranslationContext {
        &self.context
    }
}

/// Translate a backend chunk stream into client events.
pub fn to_client_stream(chunks: ChunkStreamBox, context: TranslationContext) -> ClientEventStream {
    ClientEventStream {
        chunks,
        context,
        queue: VecDeque::new(),
        done: false,
    }
}

impl Stream for ClientEventStream {
    type Item = Result<StreamEvent, TiergateError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if let Some(item) = this.queue.pop_front() {
                return Poll::Ready(Some(item));
            }
            if this.done {
                return Poll::Ready(None);
            }
            match ready!(this.chunks.poll_next_unpin(cx)) {
                Some(Ok(chunk)) => this.queue.extend(this.context.push(chunk).into_iter().map(Ok)),
                Some(Err(e)) => {
                    this.done = true;
                    this.queue.push_back(Err(e));
                }
                None => {
                    this.done = true;
                    this.queue
                        .extend(this.context.finish().into_iter().map(Ok));
                }
            }
        }
    }
}

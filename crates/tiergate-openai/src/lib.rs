// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Backend-facing chat-completions protocol for the Tiergate router.
//!
//! This crate defines the [`ChatBackend`] seam the orchestrator calls through,
//! and [`BackendClient`], its HTTP implementation for OpenAI-compatible
//! servers (llama.cpp, vLLM, OpenRouter, ...).

pub mod client;
pub mod sse;
pub mod types;

use async_trait::async_trait;
use tiergate_core::TiergateError;

pub use client::BackendClient;
pub use sse::{ChunkStream, ChunkStreamBox, chunk_stream};
pub use types::{
    ChatCompletion, ChatCompletionChunk, ChatCompletionRequest, ChatMessage, ChatRole, ChatTool,
    ChatToolChoice, ChatUsage, FunctionDefinition, ToolCall, ToolCallDelta,
};

/// One chat-completions backend.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Catalogue id of this backend.
    fn id(&self) -> &str;

    /// Non-streaming completion.
    async fn complete(&self, request: &ChatCompletionRequest)
    -> Result<ChatCompletion, TiergateError>;

    /// Streaming completion.
    async fn stream(&self, request: &ChatCompletionRequest)
    -> Result<ChunkStreamBox, TiergateError>;
}

#[async_trait]
impl ChatBackend for BackendClient {
    fn id(&self) -> &str {
        self.backend_id()
    }

    async fn complete(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletion, TiergateError> {
        BackendClient::complete(self, request).await
    }

    async fn stream(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ChunkStreamBox, TiergateError> {
        BackendClient::stream(self, request).await
    }
}

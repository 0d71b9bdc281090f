// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process chat backend with queued replies.
//!
//! Replies are popped from a FIFO queue. When the queue is empty, a default
//! "mock response" text completion is returned.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use futures::stream;
use tiergate_core::TiergateError;
use tiergate_openai::{
    ChatBackend, ChatCompletion, ChatCompletionChunk, ChatCompletionRequest, ChunkStreamBox,
};
use tokio::sync::Mutex;

use crate::chunks;

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    Chunks(Vec<ChatCompletionChunk>),
    /// Fail with a backend error.
    Fail(String),
    /// Never answer. Streams yield `chunks` first, then hang.
    Hang(Vec<ChatCompletionChunk>),
}

/// A [`ChatBackend`] that replays queued replies.
#[derive(Clone)]
pub struct ScriptedBackend {
    id: String,
    replies: Arc<Mutex<VecDeque<Reply>>>,
    requests: Arc<Mutex<Vec<ChatCompletionRequest>>>,
    /// Live streams handed out and not yet dropped.
    open_streams: Arc<AtomicUsize>,
}

impl ScriptedBackend {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            replies: Arc::new(Mutex::new(VecDeque::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
            open_streams: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_replies(id: impl Into<String>, replies: Vec<Reply>) -> Self {
        Self {
            replies: Arc::new(Mutex::new(VecDeque::from(replies))),
            ..Self::new(id)
        }
    }

    pub async fn push(&self, reply: Reply) {
        self.replies.lock().await.push_back(reply);
    }

    /// Requests received so far.
    pub async fn requests(&self) -> Vec<ChatCompletionRequest> {
        self.requests.lock().await.clone()
    }

    pub fn open_streams(&self) -> usize {
        self.open_streams.load(Ordering::Acquire)
    }

    async fn next(&self, request: &ChatCompletionRequest) -> Reply {
        self.requests.lock().await.push(request.clone());
        self.replies
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Reply::Text("mock response".to_string()))
    }

    fn fail(&self, message: String) -> TiergateError {
        TiergateError::Backend {
            backend: self.id.clone(),
            message,
            source: None,
        }
    }
}

/// Decrements the open-stream count when the stream is dropped.
struct OpenStream(Arc<AtomicUsize>);

impl OpenStream {
    fn new(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self(Arc::clone(counter))
    }
}

impl Drop for OpenStream {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

fn text_chunks(text: &str) -> Vec<ChatCompletionChunk> {
    [chunks::text(text), chunks::finish("stop"), chunks::usage(10, 5)]
        .into_iter()
        .filter_map(|v| serde_json::from_value(v).ok())
        .collect()
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    fn id(&self) -> &str {
        &self.id
    }

    async fn complete(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletion, TiergateError> {
        match self.next(request).await {
            Reply::Text(text) => serde_json::from_value(chunks::completion(&request.model, &text))
                .map_err(|e| self.fail(e.to_string())),
            Reply::Chunks(_) => Err(self.fail("scripted chunks for a non-streaming call".into())),
            Reply::Fail(message) => Err(self.fail(message)),
            Reply::Hang(_) => futures::future::pending().await,
        }
    }

    async fn stream(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ChunkStreamBox, TiergateError> {
        let (items, hang) = match self.next(request).await {
            Reply::Text(text) => (text_chunks(&text), false),
            Reply::Chunks(chunks) => (chunks, false),
            Reply::Fail(message) => return Err(self.fail(message)),
            Reply::Hang(chunks) => (chunks, true),
        };
        let guard = OpenStream::new(&self.open_streams);
        let head = stream::iter(items.into_iter().map(Ok));
        let tail = stream::unfold(guard, move |guard| async move {
            if hang {
                futures::future::pending::<()>().await;
            }
            drop(guard);
            None::<(Result<ChatCompletionChunk, TiergateError>, OpenStream)>
        });
        Ok(Box::pin(futures::StreamExt::chain(head, tail)))
    }
}

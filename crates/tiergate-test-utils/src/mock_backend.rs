// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wiremock-backed chat-completions server.
//!
//! Non-streaming and streaming requests are told apart by the `stream` field
//! of the request body, so one server can hold both kinds of mock.

use std::time::Duration;

use serde_json::{Value, json};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::chunks;

const COMPLETIONS_PATH: &str = "/v1/chat/completions";

/// A mock chat-completions backend.
pub struct MockBackend {
    server: MockServer,
}

impl MockBackend {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Base URL to put in a backend's config entry.
    pub fn base_url(&self) -> String {
        format!("{}/v1", self.server.uri())
    }

    /// Answer non-streaming requests with a plain text completion.
    pub async fn mount_completion(&self, model: &str, text: &str) {
        self.mount_json(chunks::completion(model, text)).await;
    }

    /// Answer non-streaming requests with `body`.
    pub async fn mount_json(&self, body: Value) {
        Mock::given(method("POST"))
            .and(path(COMPLETIONS_PATH))
            .and(body_partial_json(json!({"stream": false})))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// Answer streaming requests with `chunks` as SSE, then `[DONE]`.
    pub async fn mount_stream(&self, chunks: &[Value]) {
        Mock::given(method("POST"))
            .and(path(COMPLETIONS_PATH))
            .and(body_partial_json(json!({"stream": true})))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(chunks::sse_body(chunks)),
            )
            .mount(&self.server)
            .await;
    }

    /// Answer every request with `status` and an OpenAI-style error body.
    pub async fn mount_status(&self, status: u16, message: &str) {
        Mock::given(method("POST"))
            .and(path(COMPLETIONS_PATH))
            .respond_with(ResponseTemplate::new(status).set_body_json(json!({
                "error": {"message": message, "type": "server_error"}
            })))
            .mount(&self.server)
            .await;
    }

    /// Answer non-streaming requests only after `delay`.
    pub async fn mount_delayed(&self, model: &str, delay: Duration) {
        Mock::given(method("POST"))
            .and(path(COMPLETIONS_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(chunks::completion(model, "slow"))
                    .set_delay(delay),
            )
            .mount(&self.server)
            .await;
    }

    /// Bodies of every request received so far.
    pub async fn received_bodies(&self) -> Vec<Value> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter_map(|r| serde_json::from_slice(&r.body).ok())
            .collect()
    }
}

// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for one chat-completions backend.
//!
//! Provides [`BackendClient`] which handles request construction, optional
//! bearer authentication, streaming SSE responses, and a single same-backend
//! retry for transient errors.

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use tiergate_config::model::BackendConfig;
use tiergate_core::TiergateError;
use tracing::{debug, warn};

use crate::sse::{self, ChunkStreamBox};
use crate::types::{ApiErrorResponse, ChatCompletion, ChatCompletionRequest, StreamOptions};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// HTTP client for a single backend.
///
/// Retries once on 429, 500, and 503. Both attempts happen before any
/// response bytes are handed to the caller.
#[derive(Debug, Clone)]
pub struct BackendClient {
    client: reqwest::Client,
    backend_id: String,
    endpoint: String,
    max_retries: u32,
    retry_delay: Duration,
}

impl BackendClient {
    /// Creates a client from a catalogue entry.
    ///
    /// The bearer token is read from the environment variable named by
    /// `api_key_env`. A missing variable is logged and the client proceeds
    /// unauthenticated; the backend will reject calls it cannot serve.
    pub fn new(config: &BackendConfig) -> Result<Self, TiergateError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(var) = &config.api_key_env {
            match std::env::var(var) {
                Ok(key) => {
                    let value = HeaderValue::from_str(&format!("Bearer {key}")).map_err(|e| {
                        TiergateError::Config(format!(
                            "invalid API key in ${var} for backend {}: {e}",
                            config.id
                        ))
                    })?;
                    headers.insert(AUTHORIZATION, value);
                }
                Err(_) => warn!(
                    backend = %config.id,
                    env = %var,
                    "API key variable not set; calls will be unauthenticated"
                ),
            }
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| TiergateError::Backend {
                backend: config.id.clone(),
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            backend_id: config.id.clone(),
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            max_retries: 1,
            retry_delay: DEFAULT_RETRY_DELAY,
        })
    }

    /// Overrides the delay before the transient-error retry.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// The backend id this client talks to.
    pub fn backend_id(&self) -> &str {
        &self.backend_id
    }

    /// Sends a non-streaming request and returns the full completion.
    pub async fn complete(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletion, TiergateError> {
        let mut req = request.clone();
        req.stream = false;
        req.stream_options = None;

        let response = self.send(&req).await?;
        let body = response.text().await.map_err(|e| self.error("failed to read response body", e))?;
        if let Some(api_err) = ApiErrorResponse::parse(&body) {
            return Err(TiergateError::Backend {
                backend: self.backend_id.clone(),
                message: format!("backend returned an error body: {}", api_err.message()),
                source: None,
            });
        }
        serde_json::from_str(&body).map_err(|e| self.error("failed to parse completion", e))
    }

    /// Sends a streaming request and returns the chunk stream.
    pub async fn stream(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ChunkStreamBox, TiergateError> {
        let mut req = request.clone();
        req.stream = true;
        req.stream_options = Some(StreamOptions {
            include_usage: true,
        });

        let response = self.send(&req).await?;
        Ok(Box::pin(sse::chunk_stream(
            self.backend_id.clone(),
            response.bytes_stream(),
        )))
    }

    /// POSTs the request, retrying once on a transient status.
    async fn send(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<reqwest::Response, TiergateError> {
        let mut attempt = 0;
        loop {
            let response = self
                .client
                .post(&self.endpoint)
                .json(request)
                .send()
                .await
                .map_err(|e| self.error("HTTP request failed", e))?;

            let status = response.status();
            debug!(backend = %self.backend_id, status = %status, attempt, "backend responded");

            if status.is_success() {
                return Ok(response);
            }

            let body = response.text().await.unwrap_or_default();
            if is_transient_error(status) && attempt < self.max_retries {
                warn!(
                    backend = %self.backend_id,
                    status = %status,
                    body = %body,
                    "transient error, retrying same backend"
                );
                attempt += 1;
                tokio::time::sleep(self.retry_delay).await;
                continue;
            }

            let message = match ApiErrorResponse::parse(&body) {
                Some(api_err) => format!("backend returned {status}: {}", api_err.message()),
                None => format!("backend returned {status}: {body}"),
            };
            return Err(TiergateError::Backend {
                backend: self.backend_id.clone(),
                message,
                source: None,
            });
        }
    }

    fn error(
        &self,
        context: &str,
        e: impl std::error::Error + Send + Sync + 'static,
    ) -> TiergateError {
        TiergateError::Backend {
            backend: self.backend_id.clone(),
            message: format!("{context}: {e}"),
            source: Some(Box::new(e)),
        }
    }
}

/// Returns true for HTTP status codes worth one same-backend retry.
fn is_transient_error(status: StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 500 | 503)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tiergate_core::BackendKind;

    fn config(base_url: &str) -> BackendConfig {
        BackendConfig {
            id: "gpu-small".into(),
            kind: BackendKind::LocalGpu,
            base_url: base_url.into(),
            api_key_env: None,
            models: vec!["qwen".into()],
            max_concurrent: 1,
            priority: 0,
            timeout_secs: None,
        }
    }

    #[test]
    fn endpoint_strips_trailing_slash() {
        let client = BackendClient::new(&config("http://127.0.0.1:8080/v1/")).unwrap();
        assert_eq!(client.endpoint, "http://127.0.0.1:8080/v1/chat/completions");
    }

    #[test]
    fn transient_statuses() {
        assert!(is_transient_error(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_transient_error(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(is_transient_error(StatusCode::SERVICE_UNAVAILABLE));
        assert!(!is_transient_error(StatusCode::BAD_REQUEST));
        assert!(!is_transient_error(StatusCode::BAD_GATEWAY));
    }

    #[test]
    fn missing_key_variable_is_not_fatal() {
        let mut cfg = config("https://api.example.com/v1");
        cfg.api_key_env = Some("TIERGATE_TEST_DEFINITELY_UNSET_KEY".into());
        assert!(BackendClient::new(&cfg).is_ok());
    }
}

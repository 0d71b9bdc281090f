// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.
//!
//! Sets up routes, middleware, and shared state for the gateway.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post, put};
use tiergate_config::TiergateConfig;
use tiergate_core::TiergateError;
use tiergate_openai::{BackendClient, ChatBackend};
use tiergate_router::{BackendDirectory, BackendSelector, QueryClassifier};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers;

/// Transcripts with long tool output routinely exceed axum's 2 MiB default.
const MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

/// Backend clients keyed by backend id.
pub type BackendRegistry = HashMap<String, Arc<dyn ChatBackend>>;

/// Health state for the liveness and metrics endpoints.
#[derive(Clone)]
pub struct HealthState {
    /// Process start time for uptime calculation.
    pub start_time: Instant,
    /// Optional Prometheus metrics render function.
    pub prometheus_render: Option<Arc<dyn Fn() -> String + Send + Sync>>,
}

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub classifier: Arc<QueryClassifier>,
    pub selector: BackendSelector,
    pub backends: Arc<BackendRegistry>,
    /// Deadline for backends without their own `timeout_secs`.
    pub default_timeout: Duration,
    pub health: HealthState,
}

impl GatewayState {
    /// Builds the classifier, directory, and selector from `config`.
    ///
    /// Every backend named in the config must have a client in `backends`.
    pub fn new(config: &TiergateConfig, backends: BackendRegistry) -> Result<Self, TiergateError> {
        if let Some(missing) = config.backends.iter().find(|b| !backends.contains_key(&b.id)) {
            return Err(TiergateError::Internal(format!(
                "no client registered for backend `{}`",
                missing.id
            )));
        }
        let directory = Arc::new(BackendDirectory::from_config(config)?);
        Ok(Self {
            classifier: Arc::new(QueryClassifier::new(config.classifier.clone())),
            selector: BackendSelector::new(directory),
            backends: Arc::new(backends),
            default_timeout: Duration::from_secs(config.server.request_timeout_secs),
            health: HealthState {
                start_time: Instant::now(),
                prometheus_render: None,
            },
        })
    }

    /// Overrides the default backend deadline.
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Serves `render` on `GET /metrics`.
    pub fn with_prometheus_render(
        mut self,
        render: Arc<dyn Fn() -> String + Send + Sync>,
    ) -> Self {
        self.health.prometheus_render = Some(render);
        self
    }

    pub fn directory(&self) -> &Arc<BackendDirectory> {
        self.selector.directory()
    }

    pub(crate) fn backend(&self, id: &str) -> Result<Arc<dyn ChatBackend>, TiergateError> {
        self.backends
            .get(id)
            .cloned()
            .ok_or_else(|| TiergateError::Internal(format!("no client for backend `{id}`")))
    }
}

/// One HTTP client per configured backend.
pub fn backends_from_config(config: &TiergateConfig) -> Result<BackendRegistry, TiergateError> {
    config
        .backends
        .iter()
        .map(|backend| {
            let client: Arc<dyn ChatBackend> = Arc::new(BackendClient::new(backend)?);
            Ok((backend.id.clone(), client))
        })
        .collect()
}

/// Builds the axum application.
///
/// - `GET /health`, `GET /metrics`
/// - `POST /v1/messages`
/// - `GET /v1/backends`, `POST /v1/backends/{id}/health`, `PUT /v1/mode`
pub fn build_router(state: GatewayState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(handlers::get_health))
        .route("/metrics", get(handlers::get_metrics));

    let api_routes = Router::new()
        .route("/v1/messages", post(handlers::post_messages))
        .route("/v1/backends", get(handlers::get_backends))
        .route("/v1/backends/{id}/health", post(handlers::post_backend_health))
        .route("/v1/mode", put(handlers::put_mode))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES));

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Binds `host:port` and serves until `shutdown` resolves.
pub async fn start_server(
    host: &str,
    port: u16,
    state: GatewayState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), TiergateError> {
    let app = build_router(state);

    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| TiergateError::Internal(format!("failed to bind gateway to {addr}: {e}")))?;

    tracing::info!("Gateway server listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| TiergateError::Internal(format!("gateway server error: {e}")))
}

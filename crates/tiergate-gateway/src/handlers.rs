// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers for gateway API endpoints.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use tiergate_anthropic::MessagesRequest;
use tiergate_core::HealthStatus;
use tiergate_router::{BackendSnapshot, CallerHints};

use crate::error::ApiError;
use crate::orchestrator::{self, RouteInfo, Routed};
use crate::server::GatewayState;
use crate::sse;

/// Response header naming the resolved complexity tier.
pub const TIER_RESPONSE_HEADER: &str = "x-tiergate-tier";
/// Response header naming the backend that served the request.
pub const BACKEND_RESPONSE_HEADER: &str = "x-tiergate-backend";
/// Response header naming the model that served the request.
pub const MODEL_RESPONSE_HEADER: &str = "x-tiergate-model";

/// Response body for GET /health.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

/// Response body for GET /v1/backends.
#[derive(Debug, Serialize)]
pub struct BackendListResponse {
    pub constrained: bool,
    pub constrained_backend: String,
    pub backends: Vec<BackendSnapshot>,
}

/// Request body for PUT /v1/mode.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModeRequest {
    pub constrained: bool,
}

/// Response body for PUT /v1/mode.
#[derive(Debug, Serialize)]
pub struct ModeResponse {
    pub constrained: bool,
    pub constrained_backend: String,
}

/// POST /v1/messages
///
/// Classifies the request, routes it to a backend, and answers with a JSON
/// message or an SSE stream depending on `stream`.
pub async fn post_messages(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Result<Json<serde_json::Value>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return ApiError::InvalidRequest(rejection.body_text()).into_response(),
    };
    let request = match MessagesRequest::from_json(body) {
        Ok(request) => request,
        Err(err) => return ApiError::from(err).into_response(),
    };
    let hints = CallerHints::from_parts(
        |name: &str| headers.get(name).and_then(|v| v.to_str().ok()),
        request.metadata.as_ref(),
    );

    match orchestrator::route(&state, hints, request).await {
        Ok(Routed::Complete { route, message }) => {
            (route_headers(&route), Json(message)).into_response()
        }
        Ok(Routed::Stream { route, stream }) => {
            (route_headers(&route), sse::into_response(stream)).into_response()
        }
        Err(failure) => {
            let mut response = ApiError::from(failure.error).into_response();
            insert_header(response.headers_mut(), TIER_RESPONSE_HEADER, &failure.tier.to_string());
            response
        }
    }
}

fn route_headers(route: &RouteInfo) -> HeaderMap {
    let mut headers = HeaderMap::new();
    insert_header(&mut headers, TIER_RESPONSE_HEADER, &route.tier.to_string());
    insert_header(&mut headers, BACKEND_RESPONSE_HEADER, &route.backend);
    insert_header(&mut headers, MODEL_RESPONSE_HEADER, &route.model);
    headers
}

/// Skips values that are not valid header text.
fn insert_header(headers: &mut HeaderMap, name: &'static str, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(HeaderName::from_static(name), value);
    }
}

/// GET /health
pub async fn get_health(State(state): State<GatewayState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.health.start_time.elapsed().as_secs(),
    })
}

/// GET /metrics
///
/// Prometheus text exposition, or 404 when the exporter is disabled.
pub async fn get_metrics(State(state): State<GatewayState>) -> Response {
    match &state.health.prometheus_render {
        Some(render) => (
            [(CONTENT_TYPE, "text/plain; version=0.0.4")],
            render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// GET /v1/backends
pub async fn get_backends(State(state): State<GatewayState>) -> Json<BackendListResponse> {
    let directory = state.directory();
    Json(BackendListResponse {
        constrained: directory.is_constrained(),
        constrained_backend: directory.constrained_backend().to_string(),
        backends: directory.snapshot(),
    })
}

/// POST /v1/backends/{id}/health
///
/// Entry point for the external health prober.
pub async fn post_backend_health(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    body: Result<Json<HealthStatus>, JsonRejection>,
) -> Response {
    let Json(status) = match body {
        Ok(body) => body,
        Err(rejection) => return ApiError::InvalidRequest(rejection.body_text()).into_response(),
    };
    let healthy = status.healthy;
    let mode_restricted = status.mode_restricted;
    if !state.directory().update_health(&id, status) {
        return ApiError::NotFound(format!("unknown backend `{id}`")).into_response();
    }
    tracing::info!(backend = %id, healthy, mode_restricted, "backend health updated");
    StatusCode::NO_CONTENT.into_response()
}

/// PUT /v1/mode
pub async fn put_mode(
    State(state): State<GatewayState>,
    body: Result<Json<ModeRequest>, JsonRejection>,
) -> Response {
    let Json(mode) = match body {
        Ok(body) => body,
        Err(rejection) => return ApiError::InvalidRequest(rejection.body_text()).into_response(),
    };
    let directory = state.directory();
    directory.set_constrained(mode.constrained);
    tracing::info!(
        constrained = mode.constrained,
        backend = directory.constrained_backend(),
        "operating mode changed"
    );
    Json(ModeResponse {
        constrained: directory.is_constrained(),
        constrained_backend: directory.constrained_backend().to_string(),
    })
    .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tiergate_core::ComplexityTier;

    #[test]
    fn health_response_serializes() {
        let resp = HealthResponse {
            status: "ok".to_string(),
            version: "0.1.0".to_string(),
            uptime_secs: 42,
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("\"status\":\"ok\""));
        assert!(json.contains("\"uptime_secs\":42"));
    }

    #[test]
    fn route_headers_name_tier_backend_and_model() {
        let headers = route_headers(&RouteInfo {
            tier: ComplexityTier::Moderate,
            backend: "gpu-large".into(),
            model: "qwen2.5-coder-32b-instruct".into(),
        });
        assert_eq!(headers[TIER_RESPONSE_HEADER], "moderate");
        assert_eq!(headers[BACKEND_RESPONSE_HEADER], "gpu-large");
        assert_eq!(headers[MODEL_RESPONSE_HEADER], "qwen2.5-coder-32b-instruct");
    }

    #[test]
    fn invalid_header_values_are_skipped() {
        let mut headers = HeaderMap::new();
        insert_header(&mut headers, MODEL_RESPONSE_HEADER, "bad\nvalue");
        assert!(headers.is_empty());
    }

    #[test]
    fn mode_request_rejects_unknown_fields() {
        assert!(serde_json::from_str::<ModeRequest>(r#"{"constrained":true}"#).is_ok());
        assert!(serde_json::from_str::<ModeRequest>(r#"{"constrained":true,"x":1}"#).is_err());
    }
}

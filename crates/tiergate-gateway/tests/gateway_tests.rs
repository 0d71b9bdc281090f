// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end gateway tests driven through the axum router.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use futures::StreamExt;
use serde_json::{Value, json};
use tiergate_anthropic::{BlockDelta, ResponseBlock, StopReason, StreamEvent, parse_sse_stream};
use tiergate_config::TiergateConfig;
use tiergate_gateway::{
    BACKEND_RESPONSE_HEADER, BackendRegistry, GatewayState, MODEL_RESPONSE_HEADER,
    TIER_RESPONSE_HEADER, backends_from_config, build_router,
};
use tiergate_openai::{ChatBackend, ChatCompletionChunk};
use tiergate_test_utils::{MockBackend, Reply, ScriptedBackend, chunks, config_with_urls};
use tower::ServiceExt;
use tracing_test::traced_test;

const SMALL_MODEL: &str = "qwen2.5-coder-7b-instruct";
const LARGE_MODEL: &str = "qwen2.5-coder-32b-instruct";

struct Harness {
    app: Router,
    state: GatewayState,
    small: ScriptedBackend,
    large: ScriptedBackend,
    cloud: ScriptedBackend,
}

impl Harness {
    fn new() -> Self {
        let small = ScriptedBackend::new("gpu-small");
        let large = ScriptedBackend::new("gpu-large");
        let cloud = ScriptedBackend::new("cloud");
        let mut registry = BackendRegistry::new();
        for backend in [&small, &large, &cloud] {
            let client: Arc<dyn ChatBackend> = Arc::new(backend.clone());
            registry.insert(backend.id().to_string(), client);
        }
        let state = GatewayState::new(&TiergateConfig::default(), registry)
            .unwrap()
            .with_default_timeout(Duration::from_millis(200));
        Self {
            app: build_router(state.clone()),
            state,
            small,
            large,
            cloud,
        }
    }

    async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.app.clone().oneshot(request).await.unwrap()
    }

    fn in_flight(&self, backend: &str) -> u32 {
        self.state.directory().in_flight(backend).unwrap()
    }
}

async fn http_app(urls: &[(&str, String)]) -> Router {
    let config = config_with_urls(urls);
    let state = GatewayState::new(&config, backends_from_config(&config).unwrap()).unwrap();
    build_router(state)
}

fn post(path: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn messages(text: &str, stream: bool) -> Value {
    json!({
        "model": "claude-sonnet-4",
        "max_tokens": 256,
        "stream": stream,
        "messages": [{"role": "user", "content": text}]
    })
}

async fn body_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_events(response: Response<Body>) -> Vec<StreamEvent> {
    parse_sse_stream(response.into_body().into_data_stream())
        .map(Result::unwrap)
        .collect()
        .await
}

fn header<'a>(response: &'a Response<Body>, name: &str) -> &'a str {
    response.headers()[name].to_str().unwrap()
}

fn chunk(value: Value) -> ChatCompletionChunk {
    serde_json::from_value(value).unwrap()
}

#[tokio::test]
async fn routine_request_served_by_small_gpu() {
    let small = MockBackend::start().await;
    small.mount_completion(SMALL_MODEL, "4").await;
    let app = http_app(&[("gpu-small", small.base_url())]).await;

    let response = app
        .oneshot(post("/v1/messages", messages("what is 2+2", false)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, TIER_RESPONSE_HEADER), "routine");
    assert_eq!(header(&response, BACKEND_RESPONSE_HEADER), "gpu-small");
    assert_eq!(header(&response, MODEL_RESPONSE_HEADER), SMALL_MODEL);

    let body = body_json(response).await;
    assert_eq!(body["type"], "message");
    assert_eq!(body["model"], SMALL_MODEL);
    assert_eq!(body["content"][0]["text"], "4");
    assert_eq!(body["stop_reason"], "end_turn");

    let sent = small.received_bodies().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0]["model"], SMALL_MODEL);
    assert_eq!(sent[0]["messages"][0]["content"], "what is 2+2");
}

#[tokio::test]
async fn force_tag_routes_to_cloud_and_is_stripped() {
    let cloud = MockBackend::start().await;
    cloud
        .mount_completion("anthropic/claude-sonnet-4", "renamed")
        .await;
    let app = http_app(&[("cloud", cloud.base_url())]).await;

    let response = app
        .oneshot(post(
            "/v1/messages",
            messages("[[COMPLEX]] rename this variable", false),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, TIER_RESPONSE_HEADER), "complex");
    assert_eq!(header(&response, BACKEND_RESPONSE_HEADER), "cloud");

    let sent = cloud.received_bodies().await;
    let content = sent[0]["messages"][0]["content"].as_str().unwrap();
    assert!(!content.contains("[[COMPLEX]]"), "tag leaked: {content}");
    assert!(content.contains("rename this variable"));
}

#[tokio::test]
async fn streamed_tool_call_arrives_as_one_tool_use_block() {
    let small = MockBackend::start().await;
    small
        .mount_stream(&[
            chunks::tool(0, Some("call_1"), Some("bash"), "{\"comman"),
            chunks::tool(0, None, None, "d\":\"ls"),
            chunks::tool(0, None, None, "\"}"),
            chunks::finish("tool_calls"),
            chunks::usage(12, 7),
        ])
        .await;
    let app = http_app(&[("gpu-small", small.base_url())]).await;

    let response = app
        .oneshot(post("/v1/messages", messages("list the files", true)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, TIER_RESPONSE_HEADER), "routine");
    assert!(header(&response, "content-type").starts_with("text/event-stream"));

    let events = body_events(response).await;
    assert!(matches!(events.first(), Some(StreamEvent::MessageStart { .. })));
    assert_eq!(events.last(), Some(&StreamEvent::MessageStop));

    let starts: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::ContentBlockStart {
                content_block: ResponseBlock::ToolUse { id, name, .. },
                ..
            } => Some((id.as_str(), name.as_str())),
            _ => None,
        })
        .collect();
    assert_eq!(starts, [("call_1", "bash")]);

    let arguments: String = events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::ContentBlockDelta {
                delta: BlockDelta::InputJsonDelta { partial_json },
                ..
            } => Some(partial_json.as_str()),
            _ => None,
        })
        .collect();
    let input: Value = serde_json::from_str(&arguments).unwrap();
    assert_eq!(input, json!({"command": "ls"}));

    let delta = events
        .iter()
        .find_map(|e| match e {
            StreamEvent::MessageDelta { delta, usage } => Some((delta.stop_reason, *usage)),
            _ => None,
        })
        .unwrap();
    assert_eq!(delta.0, Some(StopReason::ToolUse));
    assert_eq!(delta.1.output_tokens, 7);
}

#[tokio::test]
async fn backend_error_maps_to_bad_gateway() {
    let small = MockBackend::start().await;
    small.mount_status(400, "model not loaded").await;
    let config = config_with_urls(&[("gpu-small", small.base_url())]);
    let state = GatewayState::new(&config, backends_from_config(&config).unwrap()).unwrap();
    let app = build_router(state.clone());

    let response = app
        .oneshot(post("/v1/messages", messages("hello", false)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(header(&response, TIER_RESPONSE_HEADER), "routine");
    let body = body_json(response).await;
    assert_eq!(body["type"], "error");
    assert_eq!(body["error"]["type"], "api_error");
    assert_eq!(state.directory().in_flight("gpu-small"), Some(0));
}

#[tokio::test]
async fn unknown_tool_result_id_is_rejected_before_backend_call() {
    let harness = Harness::new();
    let body = json!({
        "model": "claude-sonnet-4",
        "messages": [{
            "role": "user",
            "content": [{"type": "tool_result", "tool_use_id": "toolu_missing", "content": "ok"}]
        }]
    });

    let response = harness.send(post("/v1/messages", body)).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["type"], "invalid_request_error");
    assert!(
        body["error"]["message"]
            .as_str()
            .unwrap()
            .contains("toolu_missing")
    );
    assert!(harness.small.requests().await.is_empty());
    assert_eq!(harness.in_flight("gpu-small"), 0);
}

#[tokio::test]
async fn exhausted_chain_returns_overloaded_with_skip_reasons() {
    let harness = Harness::new();
    for id in ["gpu-small", "gpu-large", "cloud"] {
        let response = harness
            .send(post(
                &format!("/v1/backends/{id}/health"),
                json!({"healthy": false, "last_error": "probe failed"}),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    let response = harness
        .send(post("/v1/messages", messages("hello", false)))
        .await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(header(&response, TIER_RESPONSE_HEADER), "routine");
    let body = body_json(response).await;
    assert_eq!(body["error"]["type"], "overloaded_error");
    let skipped: Vec<(&str, &str)> = body["error"]["skipped"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| (s["backend"].as_str().unwrap(), s["reason"].as_str().unwrap()))
        .collect();
    assert_eq!(
        skipped,
        [
            ("gpu-small", "unhealthy"),
            ("gpu-large", "unhealthy"),
            ("cloud", "unhealthy")
        ]
    );
}

#[tokio::test]
async fn non_streaming_timeout_releases_slot() {
    let harness = Harness::new();
    harness.small.push(Reply::Hang(Vec::new())).await;

    let response = harness
        .send(post("/v1/messages", messages("hello", false)))
        .await;

    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    let body = body_json(response).await;
    assert_eq!(body["error"]["type"], "timeout_error");
    assert_eq!(harness.in_flight("gpu-small"), 0);
}

#[tokio::test]
async fn stream_deadline_ends_with_error_event() {
    let harness = Harness::new();
    harness
        .small
        .push(Reply::Hang(vec![chunk(chunks::text("partial"))]))
        .await;

    let response = harness
        .send(post("/v1/messages", messages("hello", true)))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let events = body_events(response).await;
    assert!(matches!(events.first(), Some(StreamEvent::MessageStart { .. })));
    assert!(events.iter().any(|e| matches!(
        e,
        StreamEvent::ContentBlockDelta { delta: BlockDelta::TextDelta { text }, .. } if text == "partial"
    )));
    match events.last() {
        Some(StreamEvent::Error { error }) => assert_eq!(error.type_, "timeout_error"),
        other => panic!("expected a terminal error event, got {other:?}"),
    }
    assert!(!events.contains(&StreamEvent::MessageStop));
    assert_eq!(harness.small.open_streams(), 0);
    assert_eq!(harness.in_flight("gpu-small"), 0);
}

#[tokio::test]
async fn stream_refused_by_backend_is_bad_gateway() {
    let harness = Harness::new();
    let response = harness
        .send(post("/v1/messages", messages("hello", true)))
        .await;
    let events = body_events(response).await;
    assert_eq!(events.last(), Some(&StreamEvent::MessageStop));

    harness
        .small
        .push(Reply::Fail("connection reset".into()))
        .await;
    let response = harness
        .send(post("/v1/messages", messages("hello", true)))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(harness.in_flight("gpu-small"), 0);
}

#[tokio::test]
async fn mid_stream_backend_error_is_terminal_error_event() {
    let small = MockBackend::start().await;
    small
        .mount_stream(&[chunks::text("Hel"), chunks::error("CUDA out of memory")])
        .await;
    let config = config_with_urls(&[("gpu-small", small.base_url())]);
    let state = GatewayState::new(&config, backends_from_config(&config).unwrap()).unwrap();
    let app = build_router(state.clone());

    let response = app
        .oneshot(post("/v1/messages", messages("hello", true)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let events = body_events(response).await;
    match events.last() {
        Some(StreamEvent::Error { error }) => {
            assert_eq!(error.type_, "api_error");
            assert!(error.message.contains("CUDA out of memory"), "got: {}", error.message);
        }
        other => panic!("expected a terminal error event, got {other:?}"),
    }
    assert!(!events.contains(&StreamEvent::MessageStop));
    assert!(!events.iter().any(|e| matches!(e, StreamEvent::MessageDelta { .. })));
    assert_eq!(state.directory().in_flight("gpu-small"), Some(0));
}

#[tokio::test]
async fn error_body_with_success_status_is_bad_gateway() {
    let small = MockBackend::start().await;
    small.mount_json(chunks::error("model is loading")).await;
    let app = http_app(&[("gpu-small", small.base_url())]).await;

    let response = app
        .oneshot(post("/v1/messages", messages("hello", false)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = body_json(response).await;
    assert_eq!(body["error"]["type"], "api_error");
    assert!(
        body["error"]["message"]
            .as_str()
            .unwrap()
            .contains("model is loading")
    );
}

#[tokio::test]
async fn client_disconnect_releases_slot_and_backend_stream() {
    let harness = Harness::new();
    harness.small.push(Reply::Hang(Vec::new())).await;

    let response = harness
        .send(post("/v1/messages", messages("hello", true)))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(harness.in_flight("gpu-small"), 1);
    assert_eq!(harness.small.open_streams(), 1);

    drop(response);

    assert_eq!(harness.in_flight("gpu-small"), 0);
    assert_eq!(harness.small.open_streams(), 0);
}

#[tokio::test]
async fn busy_small_gpu_falls_through_to_large() {
    let harness = Harness::new();
    harness.small.push(Reply::Hang(Vec::new())).await;
    let held = harness
        .send(post("/v1/messages", messages("hello", true)))
        .await;
    assert_eq!(header(&held, BACKEND_RESPONSE_HEADER), "gpu-small");

    let response = harness
        .send(post("/v1/messages", messages("hello again", false)))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, BACKEND_RESPONSE_HEADER), "gpu-large");
    assert_eq!(header(&response, MODEL_RESPONSE_HEADER), LARGE_MODEL);
    assert_eq!(harness.large.requests().await.len(), 1);

    drop(held);
    let response = harness
        .send(post("/v1/messages", messages("and again", false)))
        .await;
    assert_eq!(header(&response, BACKEND_RESPONSE_HEADER), "gpu-small");
}

#[tokio::test]
async fn caller_class_floor_lifts_tier() {
    let harness = Harness::new();
    let mut request = post("/v1/messages", messages("hello", false));
    request.headers_mut().insert(
        "x-tiergate-caller-class",
        "autonomous-agent".parse().unwrap(),
    );

    let response = harness.send(request).await;

    assert_eq!(header(&response, TIER_RESPONSE_HEADER), "moderate");
    assert_eq!(header(&response, BACKEND_RESPONSE_HEADER), "gpu-large");
}

#[tokio::test]
async fn constrained_mode_pins_every_tier_to_small_gpu() {
    let harness = Harness::new();
    let response = harness
        .send(
            Request::builder()
                .method("PUT")
                .uri("/v1/mode")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"constrained":true}"#))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["constrained"], true);
    assert_eq!(body["constrained_backend"], "gpu-small");

    let mut request = post("/v1/messages", messages("design the system", false));
    request
        .headers_mut()
        .insert("x-tiergate-tier", "complex".parse().unwrap());
    let response = harness.send(request).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, TIER_RESPONSE_HEADER), "complex");
    assert_eq!(header(&response, BACKEND_RESPONSE_HEADER), "gpu-small");
    assert!(harness.cloud.requests().await.is_empty());
}

#[tokio::test]
async fn backend_listing_reports_live_state() {
    let harness = Harness::new();
    let response = harness
        .send(post(
            "/v1/backends/gpu-large/health",
            json!({"healthy": true, "mode_restricted": true}),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = harness
        .send(
            Request::builder()
                .uri("/v1/backends")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    let body = body_json(response).await;
    assert_eq!(body["constrained"], false);
    let backends = body["backends"].as_array().unwrap();
    assert_eq!(backends.len(), 3);
    let large = backends.iter().find(|b| b["id"] == "gpu-large").unwrap();
    assert_eq!(large["mode_restricted"], true);
    assert_eq!(large["in_flight"], 0);
}

#[tokio::test]
async fn health_update_for_unknown_backend_is_not_found() {
    let harness = Harness::new();
    let response = harness
        .send(post("/v1/backends/tpu-pod/health", json!({"healthy": true})))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["error"]["type"], "not_found_error");
}

#[tokio::test]
async fn malformed_body_is_invalid_request() {
    let harness = Harness::new();
    let response = harness
        .send(
            Request::builder()
                .method("POST")
                .uri("/v1/messages")
                .header("content-type", "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["type"], "invalid_request_error");
}

#[tokio::test]
async fn body_without_messages_is_rejected_before_any_backend_call() {
    let harness = Harness::new();
    for body in [json!([]), json!({"model": "claude-sonnet-4"}), json!({"messages": []})] {
        let response = harness.send(post("/v1/messages", body.clone())).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "accepted {body}");
        let body = body_json(response).await;
        assert_eq!(body["error"]["type"], "invalid_request_error");
    }
    assert!(harness.small.requests().await.is_empty());
    assert!(harness.large.requests().await.is_empty());
    assert!(harness.cloud.requests().await.is_empty());
}

#[tokio::test]
async fn health_and_metrics_endpoints() {
    let harness = Harness::new();
    let response = harness
        .send(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "ok");

    let response = harness
        .send(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let state = harness
        .state
        .clone()
        .with_prometheus_render(Arc::new(|| "tiergate_requests_total 1\n".to_string()));
    let response = build_router(state)
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert!(String::from_utf8_lossy(&bytes).contains("tiergate_requests_total"));
}

#[tokio::test]
#[traced_test]
async fn completion_log_line_carries_classification() {
    let harness = Harness::new();
    let response = harness
        .send(post("/v1/messages", messages("hello", false)))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    assert!(logs_contain("request completed"));
    assert!(logs_contain("primary_signal"));
    assert!(logs_contain("elapsed_ms"));
    assert!(logs_contain("gpu-small"));
}

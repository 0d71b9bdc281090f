// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Anthropic-compatible HTTP gateway for the Tiergate router.
//!
//! `POST /v1/messages` classifies each request, takes a slot on a backend
//! from the tier's fallback chain, translates the request to chat-completions,
//! and translates the answer back (JSON or SSE). Admin endpoints expose the
//! backend directory and let an external prober push health updates.

pub mod error;
pub mod handlers;
pub mod orchestrator;
pub mod server;
pub mod sse;

pub use error::ApiError;
pub use handlers::{BACKEND_RESPONSE_HEADER, MODEL_RESPONSE_HEADER, TIER_RESPONSE_HEADER};
pub use orchestrator::{Failure, RequestStage, RouteInfo, Routed, route};
pub use server::{
    BackendRegistry, GatewayState, HealthState, backends_from_config, build_router, start_server,
};
pub use sse::LiveStream;

// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Tiergate integration tests.
//!
//! # Components
//!
//! - [`MockBackend`] - wiremock chat-completions server (JSON and SSE)
//! - [`ScriptedBackend`] - in-process [`ChatBackend`](tiergate_openai::ChatBackend)
//!   with queued replies, including a stream that never ends
//! - [`chunks`] - builders for chat-completions chunk JSON
//! - [`config_with_urls`] - default config pointed at mock servers

pub mod chunks;
pub mod mock_backend;
pub mod scripted;

pub use mock_backend::MockBackend;
pub use scripted::{Reply, ScriptedBackend};

use tiergate_config::TiergateConfig;

/// The default configuration with each backend's `base_url` replaced.
///
/// `urls` pairs backend ids with base URLs; unlisted backends keep theirs.
pub fn config_with_urls(urls: &[(&str, String)]) -> TiergateConfig {
    let mut config = TiergateConfig::default();
    for backend in &mut config.backends {
        if let Some((_, url)) = urls.iter().find(|(id, _)| *id == backend.id) {
            backend.base_url = url.clone();
        }
    }
    config
}

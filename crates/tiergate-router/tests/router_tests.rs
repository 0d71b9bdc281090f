// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end classification and selection scenarios, plus property tests for
//! classifier monotonicity and slot accounting.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use proptest::prelude::*;
use tiergate_anthropic::{Message, MessagesRequest, RequestMetadata, ToolDefinition};
use tiergate_config::TiergateConfig;
use tiergate_config::model::ClassifierConfig;
use tiergate_core::{ComplexityTier, SkipReason, TiergateError};
use tiergate_router::{BackendDirectory, BackendSelector, CallerHints, QueryClassifier};

fn selector() -> BackendSelector {
    let dir = BackendDirectory::from_config(&TiergateConfig::default()).unwrap();
    BackendSelector::new(Arc::new(dir))
}

fn tool(name: &str) -> ToolDefinition {
    ToolDefinition {
        name: name.to_string(),
        description: None,
        input_schema: serde_json::json!({"type": "object"}),
    }
}

fn chat(turns: usize, tools: usize, text: &str) -> MessagesRequest {
    let mut messages = Vec::new();
    for i in 0..turns {
        messages.push(Message::user(format!("turn {i}")));
        messages.push(Message::assistant("ok"));
    }
    messages.push(Message::user(text));
    MessagesRequest {
        model: "claude-sonnet-4".into(),
        messages,
        tools: (0..tools).map(|i| tool(&format!("tool_{i}"))).collect(),
        max_tokens: Some(512),
        ..Default::default()
    }
}

#[test]
fn routine_chat_lands_on_small_gpu() {
    let classifier = QueryClassifier::new(ClassifierConfig::default());
    let selector = selector();

    let request = chat(0, 0, "what does ls -la do?");
    let result = classifier.classify(&request, &CallerHints::default());
    assert_eq!(result.tier, ComplexityTier::Routine);

    let selection = selector.select(result.tier).unwrap();
    assert_eq!(selection.backend.id, "gpu-small");
    assert_eq!(selection.model, "qwen2.5-coder-7b-instruct");
}

#[test]
fn autonomous_agent_floor_skips_small_gpu() {
    let classifier = QueryClassifier::new(ClassifierConfig::default());
    let selector = selector();

    let request = MessagesRequest {
        metadata: Some(RequestMetadata {
            caller_class: Some("autonomous-agent".into()),
            ..Default::default()
        }),
        ..chat(0, 0, "list the files")
    };
    let hints = CallerHints::from_metadata(request.metadata.as_ref());
    let result = classifier.classify(&request, &hints);
    assert_eq!(result.tier, ComplexityTier::Moderate);
    assert_eq!(result.primary_signal, "caller_floor");

    let selection = selector.select(result.tier).unwrap();
    assert_eq!(selection.backend.id, "gpu-large");
}

#[test]
fn saturated_chain_names_every_candidate() {
    let selector = selector();
    let _small = selector.select(ComplexityTier::Routine).unwrap();
    let _large = selector.select(ComplexityTier::Routine).unwrap();
    let _cloud: Vec<_> = (0..8)
        .map(|_| selector.select(ComplexityTier::Routine).unwrap())
        .collect();

    let err = selector.select(ComplexityTier::Routine).unwrap_err();
    assert_eq!(err.kind(), "no_backend_available");
    let TiergateError::NoBackendAvailable { skipped, .. } = err else {
        panic!("expected NoBackendAvailable");
    };
    let backends: Vec<_> = skipped.iter().map(|c| c.backend.as_str()).collect();
    assert_eq!(backends, ["gpu-small", "gpu-large", "cloud"]);
    assert!(skipped.iter().all(|c| c.reason == SkipReason::AtCapacity));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_selection_never_exceeds_capacity() {
    let selector = selector();
    let peak_small = Arc::new(AtomicU32::new(0));
    let peak_cloud = Arc::new(AtomicU32::new(0));

    let mut tasks = Vec::new();
    for _ in 0..64 {
        let selector = selector.clone();
        let peak_small = Arc::clone(&peak_small);
        let peak_cloud = Arc::clone(&peak_cloud);
        tasks.push(tokio::spawn(async move {
            for _ in 0..20 {
                if let Ok(selection) = selector.select(ComplexityTier::Routine) {
                    let dir = selector.directory();
                    peak_small.fetch_max(dir.in_flight("gpu-small").unwrap(), Ordering::AcqRel);
                    peak_cloud.fetch_max(dir.in_flight("cloud").unwrap(), Ordering::AcqRel);
                    tokio::time::sleep(Duration::from_millis(1)).await;
                    drop(selection);
                }
                tokio::task::yield_now().await;
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert!(peak_small.load(Ordering::Acquire) <= 1);
    assert!(peak_cloud.load(Ordering::Acquire) <= 8);
    let dir = selector.directory();
    for id in ["gpu-small", "gpu-large", "cloud"] {
        assert_eq!(dir.in_flight(id), Some(0), "{id} leaked a slot");
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Adding tools never lowers the tier.
    #[test]
    fn prop_more_tools_never_lowers_tier(turns in 0usize..12, tools in 0usize..10, extra in 1usize..6) {
        let classifier = QueryClassifier::new(ClassifierConfig::default());
        let hints = CallerHints::default();
        let base = classifier.classify(&chat(turns, tools, "fix the bug"), &hints);
        let more = classifier.classify(&chat(turns, tools + extra, "fix the bug"), &hints);
        prop_assert!(more.tier >= base.tier);
        prop_assert!(more.score >= base.score);
    }

    /// A caller floor never lowers the heuristic tier.
    #[test]
    fn prop_caller_floor_never_lowers_tier(turns in 0usize..12, tools in 0usize..10) {
        let classifier = QueryClassifier::new(ClassifierConfig::default());
        let request = chat(turns, tools, "refactor this module");
        let plain = classifier.classify(&request, &CallerHints::default());
        let floored = classifier.classify(&request, &CallerHints {
            caller_class: Some("autonomous-agent".into()),
            ..Default::default()
        });
        prop_assert!(floored.tier >= plain.tier);
        prop_assert!(floored.tier >= ComplexityTier::Moderate);
    }

    /// Same input, same classification.
    #[test]
    fn prop_classification_is_deterministic(text in "[a-z ]{0,200}", turns in 0usize..8, tools in 0usize..6) {
        let classifier = QueryClassifier::new(ClassifierConfig::default());
        let request = chat(turns, tools, &text);
        let a = classifier.classify(&request, &CallerHints::default());
        let b = classifier.classify(&request, &CallerHints::default());
        prop_assert_eq!(a, b);
    }

    /// Interleaved acquire and release keeps every counter equal to the
    /// number of live guards and within capacity.
    #[test]
    fn prop_slot_accounting(ops in prop::collection::vec((any::<bool>(), 0usize..3), 1..80)) {
        let selector = selector();
        let mut held = Vec::new();
        for (acquire, pick) in ops {
            if acquire {
                let tier = ComplexityTier::ALL[pick];
                if let Ok(selection) = selector.select(tier) {
                    held.push(selection);
                }
            } else if !held.is_empty() {
                held.swap_remove(pick % held.len());
            }

            let dir = selector.directory();
            for snapshot in dir.snapshot() {
                let live = held
                    .iter()
                    .filter(|s| s.guard.backend_id() == snapshot.descriptor.id)
                    .count() as u32;
                prop_assert_eq!(snapshot.in_flight, live);
                prop_assert!(snapshot.in_flight <= snapshot.descriptor.max_concurrent);
            }
        }
        drop(held);
        for snapshot in selector.directory().snapshot() {
            prop_assert_eq!(snapshot.in_flight, 0);
        }
    }
}

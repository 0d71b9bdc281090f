// SPDX-FileCopyrightText: 2026 Tiergate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Caller-declared complexity signals.
//!
//! Sources are checked in strict priority order and the first match wins:
//! declared tier > force-complex flag > in-message force tag > per-caller
//! default > caller-class floor.

use std::str::FromStr;

use tiergate_anthropic::{ContentBlock, MessageContent, MessagesRequest, RequestMetadata, Role};
use tiergate_config::model::ClassifierConfig;
use tiergate_core::ComplexityTier;

/// Header naming the tier directly.
pub const TIER_HEADER: &str = "x-tiergate-tier";
/// Legacy boolean header forcing the complex tier.
pub const FORCE_COMPLEX_HEADER: &str = "x-force-complex";
/// Header carrying the caller identity.
pub const CALLER_HEADER: &str = "x-tiergate-caller";
/// Header carrying the caller class.
pub const CALLER_CLASS_HEADER: &str = "x-tiergate-caller-class";

/// Caller-side hints gathered from headers and request metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallerHints {
    /// Raw declared tier; ignored when it does not name a tier.
    pub declared_tier: Option<String>,
    pub force_complex: bool,
    pub caller_id: Option<String>,
    pub caller_class: Option<String>,
}

impl CallerHints {
    /// Build hints from a header lookup and the body metadata.
    ///
    /// Headers take precedence over metadata fields.
    pub fn from_parts<'a>(
        header: impl Fn(&str) -> Option<&'a str>,
        metadata: Option<&RequestMetadata>,
    ) -> Self {
        let pick = |name: &str, field: Option<&String>| {
            header(name)
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .or_else(|| field.cloned())
        };
        Self {
            declared_tier: pick(TIER_HEADER, metadata.and_then(|m| m.tier.as_ref())),
            force_complex: header(FORCE_COMPLEX_HEADER).is_some_and(is_truthy),
            caller_id: pick(CALLER_HEADER, metadata.and_then(|m| m.user_id.as_ref())),
            caller_class: pick(
                CALLER_CLASS_HEADER,
                metadata.and_then(|m| m.caller_class.as_ref()),
            ),
        }
    }

    /// Hints carried by the request body alone.
    pub fn from_metadata(metadata: Option<&RequestMetadata>) -> Self {
        Self::from_parts(|_| None, metadata)
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// A caller signal that fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallerSignal {
    pub name: &'static str,
    pub tier: ComplexityTier,
}

/// Resolve the caller-declared tier, if any source declares one.
pub fn resolve_caller_tier(
    hints: &CallerHints,
    request: &MessagesRequest,
    config: &ClassifierConfig,
) -> Option<CallerSignal> {
    if let Some(tier) = hints
        .declared_tier
        .as_deref()
        .and_then(|raw| ComplexityTier::from_str(raw.trim()).ok())
    {
        return Some(CallerSignal {
            name: "declared_tier",
            tier,
        });
    }

    if hints.force_complex {
        return Some(CallerSignal {
            name: "force_complex_flag",
            tier: ComplexityTier::Complex,
        });
    }

    if contains_force_tag(request, &config.force_tag) {
        return Some(CallerSignal {
            name: "force_tag",
            tier: ComplexityTier::Complex,
        });
    }

    if let Some(&tier) = hints
        .caller_id
        .as_deref()
        .and_then(|id| config.caller_defaults.get(id))
    {
        return Some(CallerSignal {
            name: "caller_default",
            tier,
        });
    }

    hints
        .caller_class
        .as_deref()
        .and_then(|class| config.caller_floors.get(class))
        .map(|&tier| CallerSignal {
            name: "caller_floor",
            tier,
        })
}

/// Index of the final user turn.
pub(crate) fn final_user_index(request: &MessagesRequest) -> Option<usize> {
    request.messages.iter().rposition(|m| m.role == Role::User)
}

/// Whether the final user message contains the force tag.
pub fn contains_force_tag(request: &MessagesRequest, tag: &str) -> bool {
    if tag.is_empty() {
        return false;
    }
    final_user_index(request)
        .map(|i| request.messages[i].content.text().contains(tag))
        .unwrap_or(false)
}

/// Remove the force tag from the final user message.
///
/// Returns whether anything was removed. The tag steers routing only and is
/// never forwarded to a backend.
pub fn strip_force_tag(request: &mut MessagesRequest, tag: &str) -> bool {
    if tag.is_empty() {
        return false;
    }
    let Some(i) = final_user_index(request) else {
        return false;
    };

    let strip = |text: &mut String| {
        if text.contains(tag) {
            *text = text.replace(tag, "").trim().to_string();
            true
        } else {
            false
        }
    };

    match &mut request.messages[i].content {
        MessageContent::Text(text) => strip(text),
        MessageContent::Blocks(blocks) => blocks.iter_mut().fold(false, |found, block| {
            let stripped = match block {
                ContentBlock::Text { text } => strip(text),
                _ => false,
            };
            found | stripped
        }),
    }
}

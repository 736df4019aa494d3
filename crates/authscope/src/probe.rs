// Copyright 2026 Authscope Contributors
// SPDX-License-Identifier: Apache-2.0

//! Declarative element probes.
//!
//! Selector sweeps are written as lists of [`Probe`]s evaluated by one
//! routine. A probe whose query raises (invalid selector, detached document)
//! evaluates to an empty match set rather than an error.

use crate::renderer::{ElementHandle, ElementQuery, RenderContext};
use std::collections::HashSet;
use tracing::debug;

/// One element lookup in a sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Probe {
    pub query: ElementQuery,
}

impl Probe {
    pub fn css(selector: impl Into<String>) -> Self {
        Self {
            query: ElementQuery::css(selector),
        }
    }

    pub fn text(scope: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            query: ElementQuery::text(scope, text),
        }
    }

    /// Human-readable form recorded in results (e.g. `selectorUsed`).
    pub fn describe(&self) -> String {
        self.query.to_string()
    }
}

/// Probes for each of `selectors`, in order.
pub fn css_probes<'a>(selectors: impl IntoIterator<Item = &'a String>) -> Vec<Probe> {
    selectors.into_iter().map(Probe::css).collect()
}

/// Text probes for each of `labels` within `scope`, in order.
pub fn text_probes<'a>(scope: &str, labels: impl IntoIterator<Item = &'a String>) -> Vec<Probe> {
    labels
        .into_iter()
        .map(|label| Probe::text(scope, label.as_str()))
        .collect()
}

/// Elements matching one probe. Failures become an empty result.
pub async fn matches(ctx: &dyn RenderContext, probe: &Probe) -> Vec<ElementHandle> {
    match ctx.query(&probe.query).await {
        Ok(found) => found,
        Err(e) => {
            debug!(probe = %probe.describe(), "probe failed: {e:#}");
            Vec::new()
        }
    }
}

/// Union of all probes' matches, in probe order then document order, with
/// each element (by identity) kept once.
pub async fn all_matches(ctx: &dyn RenderContext, probes: &[Probe]) -> Vec<ElementHandle> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for probe in probes {
        for element in matches(ctx, probe).await {
            if seen.insert(element.id) {
                out.push(element);
            }
        }
    }
    out
}

/// Whether any probe matches at least one element.
pub async fn any_present(ctx: &dyn RenderContext, probes: &[Probe]) -> bool {
    for probe in probes {
        if !matches(ctx, probe).await.is_empty() {
            return true;
        }
    }
    false
}

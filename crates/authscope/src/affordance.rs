// Copyright 2026 Authscope Contributors
// SPDX-License-Identifier: Apache-2.0

//! Login-affordance discovery.
//!
//! Three independent channels are unioned in this order:
//!
//! 1. **Structural**: href/class/id substrings such as `login` or `signin`.
//! 2. **Exact text**: known login labels across locales.
//! 3. **Free text**: every link/button whose trimmed text matches the
//!    login-word pattern.
//!
//! Before the free-text scan, collapsed menus (hamburger, profile icon) are
//! opened one at a time, re-running the structural selectors after each,
//! until one reveals a new login link; that menu is left open. Candidates are deduplicated by element
//! identity and only those with a non-zero rendered box survive.

use crate::config::{DetectionPatterns, Timings};
use crate::probe::{self, Probe};
use crate::renderer::{ElementHandle, ElementQuery, RenderContext};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Discovers candidate login-triggering elements.
pub struct AffordanceFinder {
    patterns: Arc<DetectionPatterns>,
    structural: Vec<Probe>,
    labelled: Vec<Probe>,
    menu_triggers: Vec<Probe>,
    timings: Timings,
}

impl AffordanceFinder {
    pub fn new(patterns: Arc<DetectionPatterns>, timings: Timings) -> Self {
        let structural = probe::css_probes(&patterns.login_selectors);
        let labelled = probe::text_probes(&patterns.login_scope, &patterns.login_texts);
        let menu_triggers = probe::css_probes(&patterns.menu_triggers);
        Self {
            patterns,
            structural,
            labelled,
            menu_triggers,
            timings,
        }
    }

    /// Visible candidates in discovery order, each element at most once.
    pub async fn find(&self, ctx: &dyn RenderContext) -> Vec<ElementHandle> {
        let mut candidates = Vec::new();
        candidates.extend(probe::all_matches(ctx, &self.structural).await);
        candidates.extend(probe::all_matches(ctx, &self.labelled).await);
        let revealed = self.open_menus(ctx, &candidates).await;
        candidates.extend(revealed);
        candidates.extend(self.free_text_scan(ctx).await);

        let unique = dedupe(candidates);
        let mut visible = Vec::with_capacity(unique.len());
        for element in unique {
            if is_interactable(ctx, &element).await {
                visible.push(element);
            }
        }
        debug!(count = visible.len(), "login candidates");
        visible
    }

    /// Click menu triggers one at a time until one makes structural matches
    /// interactable that were not before, and return those. The menu is left
    /// open.
    async fn open_menus(
        &self,
        ctx: &dyn RenderContext,
        known: &[ElementHandle],
    ) -> Vec<ElementHandle> {
        let mut visible_before = HashSet::new();
        for element in known {
            if is_interactable(ctx, element).await {
                visible_before.insert(element.id);
            }
        }

        for trigger in probe::all_matches(ctx, &self.menu_triggers).await {
            // An earlier trigger may have hidden this one.
            if !is_interactable(ctx, &trigger).await {
                continue;
            }
            if let Err(e) = ctx.click(&trigger).await {
                debug!(tag = %trigger.tag, "menu trigger click failed: {e:#}");
                continue;
            }
            tokio::time::sleep(self.timings.menu_settle).await;

            let mut revealed = Vec::new();
            for element in probe::all_matches(ctx, &self.structural).await {
                if !visible_before.contains(&element.id) && is_interactable(ctx, &element).await {
                    revealed.push(element);
                }
            }
            if !revealed.is_empty() {
                debug!(tag = %trigger.tag, count = revealed.len(), "menu revealed login links");
                return revealed;
            }
        }
        Vec::new()
    }

    async fn free_text_scan(&self, ctx: &dyn RenderContext) -> Vec<ElementHandle> {
        let scope = Probe {
            query: ElementQuery::css(self.patterns.interactive_scope.clone()),
        };
        probe::matches(ctx, &scope)
            .await
            .into_iter()
            .filter(|element| self.patterns.is_login_text(&element.text))
            .collect()
    }
}

fn dedupe(elements: Vec<ElementHandle>) -> Vec<ElementHandle> {
    let mut seen = HashSet::new();
    elements
        .into_iter()
        .filter(|element| seen.insert(element.id))
        .collect()
}

/// A missing box means "not currently interactable", never a fault.
async fn is_interactable(ctx: &dyn RenderContext, element: &ElementHandle) -> bool {
    match ctx.bounding_box(element).await {
        Ok(Some(b)) => b.is_visible(),
        Ok(None) => false,
        Err(e) => {
            debug!(tag = %element.tag, "bounding box unavailable: {e:#}");
            false
        }
    }
}

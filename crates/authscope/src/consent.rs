// Copyright 2026 Authscope Contributors
// SPDX-License-Identifier: Apache-2.0

//! Cookie/consent banner dismissal.

use crate::config::{DetectionPatterns, Timings};
use crate::model::ConsentOutcome;
use crate::probe::{self, Probe};
use crate::renderer::RenderContext;
use tracing::{debug, info};

/// Clicks the first consent control that accepts a click.
pub struct ConsentResolver {
    probes: Vec<Probe>,
    timings: Timings,
}

impl ConsentResolver {
    /// Localized "accept" labels first, then structural selectors.
    pub fn new(patterns: &DetectionPatterns, timings: Timings) -> Self {
        let mut probes = probe::text_probes(&patterns.consent_scope, &patterns.consent_texts);
        probes.extend(probe::css_probes(&patterns.consent_selectors));
        Self { probes, timings }
    }

    pub fn probes(&self) -> &[Probe] {
        &self.probes
    }

    /// Never fails: a missing banner is the common case.
    pub async fn resolve(&self, ctx: &dyn RenderContext) -> ConsentOutcome {
        tokio::time::sleep(self.timings.consent_grace).await;

        for probe in &self.probes {
            let Some(control) = probe::matches(ctx, probe).await.into_iter().next() else {
                continue;
            };
            match ctx.click(&control).await {
                Ok(()) => {
                    info!(selector = %probe.describe(), "consent banner dismissed");
                    tokio::time::sleep(self.timings.consent_settle).await;
                    return ConsentOutcome::handled(probe.describe());
                }
                Err(e) => debug!(selector = %probe.describe(), "consent click failed: {e:#}"),
            }
        }
        ConsentOutcome::absent()
    }
}

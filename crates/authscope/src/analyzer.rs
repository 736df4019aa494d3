// Copyright 2026 Authscope Contributors
// SPDX-License-Identifier: Apache-2.0

//! Per-site pipeline.
//!
//! One session per site, stages in a fixed order:
//! `Created → Navigated → ConsentResolved → AffordancesFound → Classified →
//! OAuthChecked → Completed`, with `Failed` reachable from any of them.
//! The session is closed on every exit path.

use crate::affordance::AffordanceFinder;
use crate::classifier::AuthMethodClassifier;
use crate::config::{AnalysisMode, DetectionPatterns, ProviderRegistry, RunConfig};
use crate::consent::ConsentResolver;
use crate::error::{ProbeError, ProbeResult};
use crate::model::{ConsentOutcome, LoginDetection, OAuthFindings, SiteResult};
use crate::oauth::OAuthDetector;
use crate::renderer::{RenderContext, Renderer};
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info_span, warn, Instrument};

/// Pipeline stage, logged as the analysis advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Created,
    Navigated,
    ConsentResolved,
    AffordancesFound,
    Classified,
    OAuthChecked,
    Completed,
    Failed,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Navigated => "navigated",
            Self::ConsentResolved => "consent-resolved",
            Self::AffordancesFound => "affordances-found",
            Self::Classified => "classified",
            Self::OAuthChecked => "oauth-checked",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Turn an input entry into an absolute http(s) URL.
///
/// Bare domains get `https://`. Anything with another scheme, or that does
/// not parse with a host, is rejected.
pub fn normalize_url(entry: &str) -> ProbeResult<String> {
    let trimmed = entry.trim();
    if trimmed.is_empty() {
        return Err(ProbeError::InvalidUrl("empty entry".to_string()));
    }

    let lower = trimmed.to_lowercase();
    let candidate = if lower.starts_with("http://") || lower.starts_with("https://") {
        trimmed.to_string()
    } else if trimmed.contains("://") {
        return Err(ProbeError::InvalidUrl(format!(
            "unsupported scheme in '{trimmed}'"
        )));
    } else {
        format!("https://{trimmed}")
    };

    let parsed = url::Url::parse(&candidate)
        .map_err(|e| ProbeError::InvalidUrl(format!("'{trimmed}': {e}")))?;
    match parsed.host_str() {
        Some(host) if !host.is_empty() => Ok(parsed.to_string()),
        _ => Err(ProbeError::InvalidUrl(format!("'{trimmed}' has no host"))),
    }
}

/// Runs the full detection pipeline against one site at a time.
pub struct SiteAnalyzer {
    renderer: Arc<dyn Renderer>,
    consent: ConsentResolver,
    finder: AffordanceFinder,
    classifier: AuthMethodClassifier,
    oauth: OAuthDetector,
    mode: AnalysisMode,
    nav_timeout_ms: u64,
}

/// Outputs of the stages that ran after navigation.
struct StageOutputs {
    consent: ConsentOutcome,
    login: LoginDetection,
    oauth: OAuthFindings,
    errors: Vec<String>,
}

impl SiteAnalyzer {
    pub fn new(
        renderer: Arc<dyn Renderer>,
        registry: Arc<ProviderRegistry>,
        patterns: Arc<DetectionPatterns>,
        config: &RunConfig,
    ) -> Self {
        let timings = config.timings;
        Self {
            renderer,
            consent: ConsentResolver::new(&patterns, timings),
            finder: AffordanceFinder::new(Arc::clone(&patterns), timings),
            classifier: AuthMethodClassifier::new(Arc::clone(&patterns), timings),
            oauth: OAuthDetector::new(registry, patterns),
            mode: config.mode,
            nav_timeout_ms: config.nav_timeout_ms,
        }
    }

    pub fn mode(&self) -> AnalysisMode {
        self.mode
    }

    /// Analyze one input entry.
    ///
    /// Returns `Err` only when no useful record exists: the entry is not a
    /// URL ([`ProbeError::InvalidUrl`]) or the page never loaded
    /// ([`ProbeError::TransientSite`]). Failures after navigation are
    /// recorded in the result's `errors` instead.
    pub async fn analyze(&self, entry: &str) -> ProbeResult<SiteResult> {
        let target = normalize_url(entry)?;
        let span = info_span!("analyze", url = %target, mode = %self.mode);
        self.analyze_target(entry, &target).instrument(span).await
    }

    async fn analyze_target(&self, entry: &str, target: &str) -> ProbeResult<SiteResult> {
        let started = Instant::now();
        let mut ctx = self
            .renderer
            .new_context()
            .await
            .map_err(|e| ProbeError::TransientSite(format!("failed to open session: {e:#}")))?;
        debug!(stage = %Stage::Created);

        let outcome = self.run_stages(ctx.as_mut(), target).await;

        if let Err(e) = ctx.close().await {
            warn!("failed to close session: {e:#}");
        }

        let outputs = match outcome {
            Ok(outputs) => outputs,
            Err(e) => {
                debug!(stage = %Stage::Failed, "{e}");
                return Err(e);
            }
        };
        debug!(stage = %Stage::Completed, errors = outputs.errors.len());

        Ok(SiteResult {
            url: entry.to_string(),
            timestamp: Utc::now(),
            consent: outputs.consent,
            login_detection: outputs.login,
            oauth: outputs.oauth,
            errors: outputs.errors,
            execution_time_ms: started.elapsed().as_millis() as u64,
        })
    }

    async fn run_stages(
        &self,
        ctx: &mut dyn RenderContext,
        target: &str,
    ) -> ProbeResult<StageOutputs> {
        let nav = ctx
            .navigate(target, self.nav_timeout_ms)
            .await
            .map_err(|e| ProbeError::TransientSite(format!("{e:#}")))?;
        debug!(stage = %Stage::Navigated, final_url = %nav.final_url, load_ms = nav.load_time_ms);

        let ctx: &dyn RenderContext = ctx;
        let mut errors = Vec::new();

        let consent = self.consent.resolve(ctx).await;
        debug!(stage = %Stage::ConsentResolved, handled = consent.handled);

        let login = match self.mode {
            AnalysisMode::Both => {
                let candidates = self.finder.find(ctx).await;
                debug!(stage = %Stage::AffordancesFound, candidates = candidates.len());
                let login = self.classifier.classify(ctx, &candidates).await;
                debug!(stage = %Stage::Classified, method = %login.method);
                login
            }
            AnalysisMode::OAuth => LoginDetection::not_found(),
        };

        let oauth = match self.oauth.detect(ctx).await {
            Ok(findings) => findings,
            Err(e) => {
                warn!("oauth detection failed: {e}");
                errors.push(format!("oauth detection failed: {e}"));
                OAuthFindings::none()
            }
        };
        debug!(stage = %Stage::OAuthChecked, has_oauth = oauth.has_oauth);

        Ok(StageOutputs {
            consent,
            login,
            oauth,
            errors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Timings;
    use crate::model::AuthMethod;
    use crate::renderer::scripted::{ClickEffect, ScriptedElement, ScriptedPage, ScriptedRenderer};
    use crate::renderer::NoopRenderer;

    fn analyzer(renderer: Arc<dyn Renderer>, mode: AnalysisMode) -> SiteAnalyzer {
        let config = RunConfig {
            mode,
            timings: Timings::instant(),
            ..RunConfig::default()
        };
        SiteAnalyzer::new(
            renderer,
            Arc::new(ProviderRegistry::builtin().clone()),
            Arc::new(DetectionPatterns::builtin().clone()),
            &config,
        )
    }

    fn login_page() -> ScriptedPage {
        ScriptedPage::new("https://shop.example/")
            .html("<button>Log in</button><p>Continue with Google</p>")
            .element(ScriptedElement::new(1, "button", "Accept all"))
            .element(ScriptedElement::new(2, "button", "Log in").on_click(ClickEffect::Reveal(vec![3])))
            .element(ScriptedElement::password(3))
    }

    #[test]
    fn test_normalize_url() {
        assert_eq!(normalize_url(" a.com ").unwrap(), "https://a.com/");
        assert_eq!(normalize_url("http://a.com/x").unwrap(), "http://a.com/x");
        assert_eq!(normalize_url("HTTPS://A.com").unwrap(), "https://a.com/");
        assert!(matches!(normalize_url(""), Err(ProbeError::InvalidUrl(_))));
        assert!(matches!(normalize_url("ftp://a.com"), Err(ProbeError::InvalidUrl(_))));
        assert!(matches!(normalize_url("exa mple"), Err(ProbeError::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn test_full_pipeline() {
        let renderer = Arc::new(ScriptedRenderer::new().with_page(login_page()));
        let result = analyzer(renderer.clone(), AnalysisMode::Both)
            .analyze("shop.example")
            .await
            .unwrap();

        assert_eq!(result.url, "shop.example");
        assert!(result.consent.handled);
        assert_eq!(result.login_detection.method, AuthMethod::Modal);
        assert_eq!(
            result.oauth.providers.iter().map(|p| p.as_str()).collect::<Vec<_>>(),
            vec!["google"]
        );
        assert!(result.errors.is_empty());
        assert_eq!(renderer.active_contexts(), 0);
    }

    #[tokio::test]
    async fn test_zero_candidates_still_runs_oauth() {
        let page = ScriptedPage::new("https://news.example/")
            .request("https://kauth.kakao.com/oauth/authorize?client_id=1");
        let renderer = Arc::new(ScriptedRenderer::new().with_page(page));
        let result = analyzer(renderer, AnalysisMode::Both)
            .analyze("news.example")
            .await
            .unwrap();
        assert_eq!(result.login_detection, LoginDetection::not_found());
        assert!(result.oauth.has_oauth);
    }

    #[tokio::test]
    async fn test_oauth_mode_clicks_nothing_but_consent() {
        let renderer = Arc::new(ScriptedRenderer::new().with_page(login_page()));
        let result = analyzer(renderer.clone(), AnalysisMode::OAuth)
            .analyze("https://shop.example/")
            .await
            .unwrap();
        assert!(!result.login_detection.found);
        assert!(result.oauth.has_oauth);
        assert_eq!(renderer.clicks(), vec![1]);
    }

    #[tokio::test]
    async fn test_navigation_failure_is_transient_and_closes_session() {
        let renderer = Arc::new(
            ScriptedRenderer::new()
                .with_page(login_page())
                .failing_navigation("https://shop.example/", 1),
        );
        let err = analyzer(renderer.clone(), AnalysisMode::Both)
            .analyze("shop.example")
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert_eq!(renderer.contexts_created(), 1);
        assert_eq!(renderer.active_contexts(), 0);
    }

    #[tokio::test]
    async fn test_invalid_entry_opens_no_session() {
        let renderer = Arc::new(ScriptedRenderer::new());
        let err = analyzer(renderer.clone(), AnalysisMode::Both)
            .analyze("mailto://someone")
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::InvalidUrl(_)));
        assert_eq!(renderer.contexts_created(), 0);
    }

    #[tokio::test]
    async fn test_session_creation_failure_is_transient() {
        let err = analyzer(Arc::new(NoopRenderer), AnalysisMode::Both)
            .analyze("a.example")
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }
}

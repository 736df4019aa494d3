// Copyright 2026 Authscope Contributors
// SPDX-License-Identifier: Apache-2.0

//! Third-party identity-provider inference.
//!
//! Three channels run for every registered provider and each can mark it
//! detected on its own:
//!
//! - **button**: a provider selector or button label resolves to an element;
//! - **content**: the lowercased page markup contains a provider keyword;
//! - **network**: an observed request URL contains a provider domain.
//!
//! Request URLs on a generic OAuth path are recorded as endpoints even when
//! no provider claims them. Everything after the DOM sweep is a pure function
//! of (button hits, markup, requests), so re-running it over unchanged input
//! yields the same findings.

use crate::config::{DetectionPatterns, ProviderRegistry};
use crate::error::{ProbeError, ProbeResult};
use crate::model::{DetectionMethod, OAuthFindings, ProviderId};
use crate::probe::{self, Probe};
use crate::renderer::RenderContext;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Elements that may carry a provider button label.
const PROVIDER_BUTTON_SCOPE: &str = "a, button, [role=\"button\"]";

/// Detects which identity providers a page references.
pub struct OAuthDetector {
    registry: Arc<ProviderRegistry>,
    patterns: Arc<DetectionPatterns>,
}

impl OAuthDetector {
    pub fn new(registry: Arc<ProviderRegistry>, patterns: Arc<DetectionPatterns>) -> Self {
        Self { registry, patterns }
    }

    /// Inspect the current page. Fails only when the markup is unreadable.
    pub async fn detect(&self, ctx: &dyn RenderContext) -> ProbeResult<OAuthFindings> {
        let button_hits = self.button_hits(ctx).await;
        let html = ctx
            .get_html()
            .await
            .map_err(|e| ProbeError::ElementInteraction(format!("failed to read page markup: {e:#}")))?;
        let requests = ctx.observed_requests();
        debug!(requests = requests.len(), "assessing oauth signals");

        let findings = assess(&self.registry, &self.patterns, &button_hits, &html, &requests);
        if findings.has_oauth {
            info!(
                providers = ?findings.providers.iter().map(ProviderId::as_str).collect::<Vec<_>>(),
                "oauth providers detected"
            );
        }
        Ok(findings)
    }

    async fn button_hits(&self, ctx: &dyn RenderContext) -> BTreeSet<ProviderId> {
        let mut hits = BTreeSet::new();
        for (id, descriptor) in self.registry.iter() {
            let mut probes: Vec<Probe> = probe::css_probes(&descriptor.selectors);
            probes.extend(probe::text_probes(
                PROVIDER_BUTTON_SCOPE,
                &descriptor.button_labels,
            ));
            if probe::any_present(ctx, &probes).await {
                debug!(provider = %id, "provider button present");
                hits.insert(id.clone());
            }
        }
        hits
    }
}

/// Combine button hits with the content and network channels.
pub fn assess(
    registry: &ProviderRegistry,
    patterns: &DetectionPatterns,
    button_hits: &BTreeSet<ProviderId>,
    html: &str,
    requests: &[String],
) -> OAuthFindings {
    let markup = html.to_lowercase();
    let lowered: Vec<String> = requests.iter().map(|r| r.to_lowercase()).collect();

    let mut providers = BTreeSet::new();
    let mut methods = BTreeSet::new();
    let mut endpoints = BTreeSet::new();

    for (id, descriptor) in registry.iter() {
        if button_hits.contains(id) {
            providers.insert(id.clone());
            methods.insert(DetectionMethod::Button);
        }

        if descriptor.keywords.iter().any(|k| markup.contains(k.as_str())) {
            providers.insert(id.clone());
            methods.insert(DetectionMethod::Content);
        }

        for (request, lower) in requests.iter().zip(&lowered) {
            if descriptor.domains.iter().any(|d| lower.contains(d.as_str())) {
                providers.insert(id.clone());
                methods.insert(DetectionMethod::Network);
                endpoints.insert(request.clone());
            }
        }
    }

    for request in requests {
        if patterns.is_oauth_path(request) {
            endpoints.insert(request.clone());
        }
    }

    OAuthFindings::new(providers, methods, endpoints)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::scripted::{ScriptedElement, ScriptedPage, ScriptedRenderer};
    use crate::renderer::Renderer;

    fn detector() -> OAuthDetector {
        OAuthDetector::new(
            Arc::new(ProviderRegistry::builtin().clone()),
            Arc::new(DetectionPatterns::builtin().clone()),
        )
    }

    async fn detect(page: ScriptedPage) -> OAuthFindings {
        let url = page.url.clone();
        let renderer = ScriptedRenderer::new().with_page(page);
        let mut ctx = renderer.new_context().await.unwrap();
        ctx.navigate(&url, 1000).await.unwrap();
        detector().detect(ctx.as_ref()).await.unwrap()
    }

    fn ids(findings: &OAuthFindings) -> Vec<&str> {
        findings.providers.iter().map(ProviderId::as_str).collect()
    }

    #[tokio::test]
    async fn test_google_button_and_content_without_network() {
        let page = ScriptedPage::new("https://shop.example/")
            .html("<div class=\"g_id_signin\"><span>Sign in with Google</span></div>")
            .element(ScriptedElement::new(1, "div", "Sign in with Google").matches(".g_id_signin"))
            .request("https://cdn.shop.example/app.js");
        let findings = detect(page).await;
        assert!(findings.has_oauth);
        assert_eq!(ids(&findings), vec!["google"]);
        assert!(findings.detection_methods.contains(&DetectionMethod::Button));
        assert!(findings.detection_methods.contains(&DetectionMethod::Content));
        assert!(!findings.detection_methods.contains(&DetectionMethod::Network));
        assert!(findings.endpoints.is_empty());
    }

    #[tokio::test]
    async fn test_button_label_alone_marks_provider() {
        let page = ScriptedPage::new("https://shop.example/")
            .element(ScriptedElement::new(1, "button", "Continue with GitHub"));
        let findings = detect(page).await;
        assert_eq!(ids(&findings), vec!["github"]);
        assert_eq!(
            findings.detection_methods,
            BTreeSet::from([DetectionMethod::Button])
        );
    }

    #[tokio::test]
    async fn test_nothing_detected_is_explicit_negative() {
        let page = ScriptedPage::new("https://blog.example/").html("<p>Hello</p>");
        let findings = detect(page).await;
        assert_eq!(findings, OAuthFindings::none());
        assert!(!findings.has_oauth);
    }

    #[test]
    fn test_network_attribution_and_generic_endpoints() {
        let registry = ProviderRegistry::builtin();
        let patterns = DetectionPatterns::builtin();
        let requests = vec![
            "https://shop.example/".to_string(),
            "https://kauth.kakao.com/oauth/authorize?client_id=abc".to_string(),
            "https://shop.example/api/auth/session".to_string(),
            "https://cdn.example/lib.js".to_string(),
        ];
        let findings = assess(registry, patterns, &BTreeSet::new(), "", &requests);
        assert_eq!(ids(&findings), vec!["kakao"]);
        assert_eq!(
            findings.detection_methods,
            BTreeSet::from([DetectionMethod::Network])
        );
        assert_eq!(
            findings.endpoints,
            BTreeSet::from([
                "https://kauth.kakao.com/oauth/authorize?client_id=abc".to_string(),
                "https://shop.example/api/auth/session".to_string(),
            ])
        );
    }

    #[test]
    fn test_generic_endpoint_without_provider_is_not_oauth() {
        let requests = vec!["https://sso.corp.example/oauth2/authorize".to_string()];
        let findings = assess(
            ProviderRegistry::builtin(),
            DetectionPatterns::builtin(),
            &BTreeSet::new(),
            "",
            &requests,
        );
        assert!(!findings.has_oauth);
        assert_eq!(findings.endpoints.len(), 1);
    }

    #[test]
    fn test_endpoints_deduplicated() {
        let url = "https://accounts.google.com/o/oauth2/v2/auth?x=1".to_string();
        let requests = vec![url.clone(), url.clone(), url];
        let findings = assess(
            ProviderRegistry::builtin(),
            DetectionPatterns::builtin(),
            &BTreeSet::new(),
            "",
            &requests,
        );
        assert_eq!(ids(&findings), vec!["google"]);
        assert_eq!(findings.endpoints.len(), 1);
    }

    #[test]
    fn test_assessment_is_idempotent() {
        let registry = ProviderRegistry::builtin();
        let patterns = DetectionPatterns::builtin();
        let html = "<a>Continue with Facebook</a><p>카카오 로그인</p>";
        let requests = vec![
            "https://connect.facebook.net/en_US/sdk.js".to_string(),
            "https://example.com/authorize".to_string(),
        ];
        let hits = BTreeSet::from([ProviderId::new("apple")]);
        let first = assess(registry, patterns, &hits, html, &requests);
        let mut reversed = requests.clone();
        reversed.reverse();
        let second = assess(registry, patterns, &hits, html, &reversed);
        assert_eq!(first.providers, second.providers);
        assert_eq!(first.endpoints, second.endpoints);
        assert!(first.providers.contains(&ProviderId::new("apple")));
    }

    #[test]
    fn test_custom_provider_is_a_data_addition() {
        let mut registry = ProviderRegistry::default();
        registry.insert(
            ProviderId::new("acme"),
            crate::config::ProviderDescriptor {
                domains: vec!["sso.acme.test".into()],
                ..Default::default()
            },
        );
        let requests = vec!["https://SSO.acme.test/login".to_string()];
        let findings = assess(
            &registry,
            DetectionPatterns::builtin(),
            &BTreeSet::new(),
            "",
            &requests,
        );
        assert_eq!(ids(&findings), vec!["acme"]);
        assert!(findings.endpoints.contains("https://SSO.acme.test/login"));
    }
}

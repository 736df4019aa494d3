// Copyright 2026 Authscope Contributors
// SPDX-License-Identifier: Apache-2.0

//! Authentication-method classification.
//!
//! Candidates are activated one at a time in discovery order and the first
//! one that yields a classification wins:
//!
//! - a new window opened → `popup` (checked first, regardless of any
//!   password field);
//! - the URL changed and a password input is present → `redirect`;
//! - a password input is present without navigation → `modal`.
//!
//! The popup listener is armed before the click so the event cannot fire
//! ahead of it.

use crate::config::{DetectionPatterns, Timings};
use crate::error::ProbeError;
use crate::model::{AuthMethod, LoginDetection};
use crate::probe::{self, Probe};
use crate::renderer::{ElementHandle, RenderContext};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Classifies how login candidates present their credential form.
pub struct AuthMethodClassifier {
    password: Probe,
    timings: Timings,
}

impl AuthMethodClassifier {
    pub fn new(patterns: Arc<DetectionPatterns>, timings: Timings) -> Self {
        Self {
            password: Probe::css(patterns.password_selector.clone()),
            timings,
        }
    }

    /// First candidate that classifies wins; otherwise the explicit negative.
    pub async fn classify(
        &self,
        ctx: &dyn RenderContext,
        candidates: &[ElementHandle],
    ) -> LoginDetection {
        for (index, candidate) in candidates.iter().enumerate() {
            match self.probe_candidate(ctx, candidate).await {
                Ok(Some(detection)) => {
                    info!(
                        index,
                        tag = %candidate.tag,
                        method = %detection.method,
                        "login affordance classified"
                    );
                    return detection;
                }
                Ok(None) => debug!(index, tag = %candidate.tag, "candidate did not classify"),
                Err(e) => warn!(index, tag = %candidate.tag, "skipping candidate: {e}"),
            }
        }
        LoginDetection::not_found()
    }

    async fn probe_candidate(
        &self,
        ctx: &dyn RenderContext,
        candidate: &ElementHandle,
    ) -> Result<Option<LoginDetection>, ProbeError> {
        let before = ctx.get_url().await.map_err(interaction)?;

        let watch = ctx.watch_popup().await.map_err(interaction)?;
        ctx.click(candidate).await.map_err(interaction)?;

        if let Some(popup) = watch.wait(self.timings.popup_wait).await {
            if let Err(e) = ctx.close_popup(&popup).await {
                debug!("failed to close popup {}: {e:#}", popup.url);
            }
            return Ok(Some(LoginDetection::detected(
                AuthMethod::Popup,
                candidate.tag.clone(),
                popup.url,
            )));
        }

        tokio::time::sleep(self.timings.click_settle).await;

        let after = ctx.get_url().await.map_err(interaction)?;
        if !probe::any_present(ctx, std::slice::from_ref(&self.password)).await {
            return Ok(None);
        }

        let method = if after != before {
            AuthMethod::Redirect
        } else {
            AuthMethod::Modal
        };
        Ok(Some(LoginDetection::detected(
            method,
            candidate.tag.clone(),
            after,
        )))
    }
}

fn interaction(e: anyhow::Error) -> ProbeError {
    ProbeError::ElementInteraction(format!("{e:#}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::scripted::{ClickEffect, ScriptedElement, ScriptedPage, ScriptedRenderer};
    use crate::renderer::{ElementQuery, Renderer};

    async fn classify(page: ScriptedPage) -> (LoginDetection, ScriptedRenderer) {
        let url = page.url.clone();
        let renderer = ScriptedRenderer::new().with_page(page);
        let mut ctx = renderer.new_context().await.unwrap();
        ctx.navigate(&url, 1000).await.unwrap();
        let candidates = ctx.query(&ElementQuery::css("a, button")).await.unwrap();
        let classifier = AuthMethodClassifier::new(
            Arc::new(DetectionPatterns::builtin().clone()),
            Timings::instant(),
        );
        let detection = classifier.classify(ctx.as_ref(), &candidates).await;
        ctx.close().await.unwrap();
        (detection, renderer)
    }

    #[tokio::test]
    async fn test_password_without_navigation_is_modal() {
        let page = ScriptedPage::new("https://a.example/")
            .element(ScriptedElement::new(1, "button", "Log in").on_click(ClickEffect::Reveal(vec![9])))
            .element(ScriptedElement::password(9));
        let (detection, _) = classify(page).await;
        assert!(detection.found);
        assert_eq!(detection.method, AuthMethod::Modal);
        assert_eq!(detection.selector_tag.as_deref(), Some("button"));
        assert_eq!(detection.resolved_url.as_deref(), Some("https://a.example/"));
    }

    #[tokio::test]
    async fn test_password_after_url_change_is_redirect() {
        let page = ScriptedPage::new("https://a.example/")
            .element(ScriptedElement::new(1, "a", "Sign in").on_click(ClickEffect::Navigate {
                url: "https://a.example/login".into(),
                reveal: vec![9],
            }))
            .element(ScriptedElement::password(9));
        let (detection, _) = classify(page).await;
        assert_eq!(detection.method, AuthMethod::Redirect);
        assert_eq!(
            detection.resolved_url.as_deref(),
            Some("https://a.example/login")
        );
    }

    #[tokio::test]
    async fn test_popup_wins_even_with_password_present() {
        let page = ScriptedPage::new("https://a.example/")
            .element(ScriptedElement::new(1, "button", "Login").on_click(ClickEffect::OpenPopup {
                url: "https://auth.a.example/popup".into(),
            }))
            // password input present from the start
            .element(ScriptedElement::new(9, "input", "").matches("input[type=\"password\"]"));
        let (detection, renderer) = classify(page).await;
        assert_eq!(detection.method, AuthMethod::Popup);
        assert_eq!(
            detection.resolved_url.as_deref(),
            Some("https://auth.a.example/popup")
        );
        assert!(renderer
            .interactions()
            .contains(&crate::renderer::scripted::Interaction::ClosePopup(
                "https://auth.a.example/popup".into()
            )));
    }

    #[tokio::test]
    async fn test_first_classifying_candidate_wins() {
        let page = ScriptedPage::new("https://a.example/")
            .element(ScriptedElement::new(1, "a", "Login"))
            .element(ScriptedElement::new(2, "a", "Sign in").on_click(ClickEffect::OpenPopup {
                url: "https://idp.example/".into(),
            }))
            .element(ScriptedElement::new(3, "button", "Log in").on_click(ClickEffect::Reveal(vec![9])))
            .element(ScriptedElement::password(9));
        let (detection, renderer) = classify(page).await;
        assert_eq!(detection.method, AuthMethod::Popup);
        // candidate 3 is never clicked once 2 classifies
        assert_eq!(renderer.clicks(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_failing_candidate_is_skipped() {
        let page = ScriptedPage::new("https://a.example/")
            .element(
                ScriptedElement::new(1, "a", "Login")
                    .on_click(ClickEffect::Fail("element is not attached".into())),
            )
            .element(ScriptedElement::new(2, "button", "Log in").on_click(ClickEffect::Reveal(vec![9])))
            .element(ScriptedElement::password(9));
        let (detection, renderer) = classify(page).await;
        assert_eq!(detection.method, AuthMethod::Modal);
        assert_eq!(renderer.clicks(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_nothing_classifies() {
        let page = ScriptedPage::new("https://a.example/")
            .element(ScriptedElement::new(1, "a", "Login"))
            .element(ScriptedElement::new(2, "a", "Help").on_click(ClickEffect::Navigate {
                url: "https://a.example/help".into(),
                reveal: vec![],
            }));
        let (detection, _) = classify(page).await;
        assert_eq!(detection, LoginDetection::not_found());
    }

    #[tokio::test]
    async fn test_empty_candidate_list() {
        let (detection, renderer) = classify(ScriptedPage::new("https://a.example/")).await;
        assert!(!detection.found);
        assert_eq!(detection.method, AuthMethod::None);
        assert!(renderer.clicks().is_empty());
    }
}

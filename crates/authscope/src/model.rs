// Copyright 2026 Authscope Contributors
// SPDX-License-Identifier: Apache-2.0

//! Result records produced for every analyzed site.
//!
//! A [`SiteResult`] is assembled once from the outputs of each pipeline step
//! and never patched afterwards. Constructors on the nested records keep the
//! derived flags (`found`, `has_oauth`) consistent with the data they summarize.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Identifier of a third-party identity provider (e.g. `google`).
///
/// Providers are configuration data, so the id is an open string rather than
/// a closed enum.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderId(pub String);

impl ProviderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How activating a login affordance presented the credential form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMethod {
    Popup,
    Redirect,
    Modal,
    None,
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Popup => write!(f, "popup"),
            Self::Redirect => write!(f, "redirect"),
            Self::Modal => write!(f, "modal"),
            Self::None => write!(f, "none"),
        }
    }
}

/// Which channel of the OAuth detector fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionMethod {
    Button,
    Content,
    Network,
}

impl fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Button => write!(f, "button"),
            Self::Content => write!(f, "content"),
            Self::Network => write!(f, "network"),
        }
    }
}

/// Outcome of consent-banner dismissal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentOutcome {
    pub detected: bool,
    pub handled: bool,
    pub selector_used: Option<String>,
}

impl ConsentOutcome {
    /// No banner was found (the common case).
    pub fn absent() -> Self {
        Self::default()
    }

    /// A banner control matched `selector` and was clicked.
    pub fn handled(selector: impl Into<String>) -> Self {
        Self {
            detected: true,
            handled: true,
            selector_used: Some(selector.into()),
        }
    }
}

/// Outcome of login-affordance classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginDetection {
    pub found: bool,
    pub method: AuthMethod,
    pub selector_tag: Option<String>,
    pub resolved_url: Option<String>,
}

impl LoginDetection {
    /// Explicit negative: no affordance produced a classification.
    pub fn not_found() -> Self {
        Self {
            found: false,
            method: AuthMethod::None,
            selector_tag: None,
            resolved_url: None,
        }
    }

    /// A classified affordance. Passing [`AuthMethod::None`] yields the
    /// explicit negative so `found` always agrees with `method`.
    pub fn detected(method: AuthMethod, selector_tag: String, resolved_url: String) -> Self {
        if method == AuthMethod::None {
            return Self::not_found();
        }
        Self {
            found: true,
            method,
            selector_tag: Some(selector_tag),
            resolved_url: Some(resolved_url),
        }
    }
}

impl Default for LoginDetection {
    fn default() -> Self {
        Self::not_found()
    }
}

/// Outcome of OAuth-provider inference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthFindings {
    #[serde(rename = "hasOAuth")]
    pub has_oauth: bool,
    pub providers: BTreeSet<ProviderId>,
    pub detection_methods: BTreeSet<DetectionMethod>,
    pub endpoints: BTreeSet<String>,
}

impl OAuthFindings {
    pub fn new(
        providers: BTreeSet<ProviderId>,
        detection_methods: BTreeSet<DetectionMethod>,
        endpoints: BTreeSet<String>,
    ) -> Self {
        Self {
            has_oauth: !providers.is_empty(),
            providers,
            detection_methods,
            endpoints,
        }
    }

    /// Explicit negative: nothing detected.
    pub fn none() -> Self {
        Self::default()
    }
}

/// The record kept for one input entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteResult {
    /// The original input entry, as read from the list.
    pub url: String,
    pub timestamp: DateTime<Utc>,
    pub consent: ConsentOutcome,
    pub login_detection: LoginDetection,
    pub oauth: OAuthFindings,
    /// Errors in the order they were encountered.
    pub errors: Vec<String>,
    pub execution_time_ms: u64,
}

impl SiteResult {
    /// Terminal failure record: no successful fields, only errors.
    pub fn failed(url: impl Into<String>, errors: Vec<String>, execution_time_ms: u64) -> Self {
        Self {
            url: url.into(),
            timestamp: Utc::now(),
            consent: ConsentOutcome::absent(),
            login_detection: LoginDetection::not_found(),
            oauth: OAuthFindings::none(),
            errors,
            execution_time_ms,
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Whether the analysis produced any positive signal.
    pub fn is_success(&self) -> bool {
        self.login_detection.found || self.oauth.has_oauth
    }

    /// RFC 3339 timestamp with millisecond precision, as written to the
    /// tab-separated outputs.
    pub fn timestamp_string(&self) -> String {
        self.timestamp
            .to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
    }
}

//! Login, consent, and OAuth-path patterns.
//!
//! Embedded at compile time from `patterns.json`; a file of the same shape
//! replaces the defaults wholesale.

use crate::error::{ProbeError, ProbeResult};
use regex::RegexSet;
use serde::Deserialize;
use std::path::Path;
use std::sync::OnceLock;
use tracing::error;

/// Raw JSON content of the default pattern set.
const PATTERNS_JSON: &str = include_str!("patterns.json");

#[derive(Debug, Deserialize)]
struct RawPatterns {
    consent_scope: String,
    consent_texts: Vec<String>,
    consent_selectors: Vec<String>,
    login_selectors: Vec<String>,
    login_scope: String,
    login_texts: Vec<String>,
    menu_triggers: Vec<String>,
    interactive_scope: String,
    login_word_pattern: String,
    password_selector: String,
    oauth_path_pattern: String,
}

/// Compiled pattern set shared by the pipeline components.
#[derive(Debug, Clone)]
pub struct DetectionPatterns {
    /// Elements that may carry a consent label.
    pub consent_scope: String,
    /// Localized "accept" labels, tried in order.
    pub consent_texts: Vec<String>,
    /// Structural consent-button selectors, tried after the labels.
    pub consent_selectors: Vec<String>,
    /// Structural login selectors (href/class/id substrings).
    pub login_selectors: Vec<String>,
    /// Elements that may carry a login label.
    pub login_scope: String,
    /// Exact login labels across locales.
    pub login_texts: Vec<String>,
    /// Controls that expand collapsed navigation.
    pub menu_triggers: Vec<String>,
    /// Elements scanned by the free-text pass.
    pub interactive_scope: String,
    pub login_word: RegexSet,
    pub password_selector: String,
    pub oauth_path: RegexSet,
}

impl DetectionPatterns {
    pub fn from_json(json: &str) -> ProbeResult<Self> {
        let raw: RawPatterns = serde_json::from_str(json)
            .map_err(|e| ProbeError::Configuration(format!("invalid pattern set: {e}")))?;
        let compile = |name: &str, pattern: &str| {
            RegexSet::new([pattern])
                .map_err(|e| ProbeError::Configuration(format!("invalid {name}: {e}")))
        };
        Ok(Self {
            login_word: compile("login_word_pattern", &raw.login_word_pattern)?,
            oauth_path: compile("oauth_path_pattern", &raw.oauth_path_pattern)?,
            consent_scope: raw.consent_scope,
            consent_texts: raw.consent_texts,
            consent_selectors: raw.consent_selectors,
            login_selectors: raw.login_selectors,
            login_scope: raw.login_scope,
            login_texts: raw.login_texts,
            menu_triggers: raw.menu_triggers,
            interactive_scope: raw.interactive_scope,
            password_selector: raw.password_selector,
        })
    }

    pub fn from_path(path: &Path) -> ProbeResult<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            ProbeError::Configuration(format!(
                "failed to read pattern set {}: {e}",
                path.display()
            ))
        })?;
        Self::from_json(&json)
    }

    /// The embedded default pattern set.
    pub fn builtin() -> &'static DetectionPatterns {
        static PATTERNS: OnceLock<DetectionPatterns> = OnceLock::new();
        PATTERNS.get_or_init(|| {
            Self::from_json(PATTERNS_JSON).unwrap_or_else(|e| {
                error!("embedded patterns.json is invalid: {e}");
                Self::empty()
            })
        })
    }

    /// A pattern set that matches nothing.
    pub fn empty() -> Self {
        Self {
            consent_scope: String::new(),
            consent_texts: Vec::new(),
            consent_selectors: Vec::new(),
            login_selectors: Vec::new(),
            login_scope: String::new(),
            login_texts: Vec::new(),
            menu_triggers: Vec::new(),
            interactive_scope: String::new(),
            login_word: RegexSet::empty(),
            password_selector: String::new(),
            oauth_path: RegexSet::empty(),
        }
    }

    /// Whether `text` reads like a login label.
    pub fn is_login_text(&self, text: &str) -> bool {
        self.login_word.is_match(text.trim())
    }

    /// Whether `url` looks like an OAuth/authorization endpoint.
    pub fn is_oauth_path(&self, url: &str) -> bool {
        let path = match url::Url::parse(url) {
            Ok(parsed) => {
                let mut tail = parsed.path().to_string();
                if let Some(query) = parsed.query() {
                    tail.push('?');
                    tail.push_str(query);
                }
                tail
            }
            Err(_) => url.to_string(),
        };
        self.oauth_path.is_match(&path)
    }
}

// Copyright 2026 Authscope Contributors
// SPDX-License-Identifier: Apache-2.0

//! Configuration loading and resolution.
//!
//! Every knob resolves as: explicit value (CLI flag) > `AUTHSCOPE_*`
//! environment variable > built-in default.

pub mod patterns;
pub mod providers;

pub use patterns::DetectionPatterns;
pub use providers::{ProviderDescriptor, ProviderRegistry};

use crate::error::{ProbeError, ProbeResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Default number of attempts per site.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default navigation timeout in milliseconds.
pub const DEFAULT_NAV_TIMEOUT_MS: u64 = 15_000;

/// Which detections run for each site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisMode {
    /// Login-affordance classification and OAuth detection.
    #[default]
    Both,
    /// OAuth detection only; nothing on the page is clicked except the
    /// consent banner.
    OAuth,
}

impl FromStr for AnalysisMode {
    type Err = ProbeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "both" => Ok(Self::Both),
            "oauth" | "oauth-only" => Ok(Self::OAuth),
            other => Err(ProbeError::Configuration(format!(
                "unknown mode '{other}' (expected 'both' or 'oauth')"
            ))),
        }
    }
}

impl std::fmt::Display for AnalysisMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Both => write!(f, "both"),
            Self::OAuth => write!(f, "oauth"),
        }
    }
}

/// Durations of every suspension point in the per-site pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    /// Wait for a consent banner to render before probing it.
    pub consent_grace: Duration,
    /// Settle time after a consent click.
    pub consent_settle: Duration,
    /// How long to wait for a popup after clicking a candidate.
    pub popup_wait: Duration,
    /// Settle time after a candidate click before inspecting the page.
    pub click_settle: Duration,
    /// Settle time after opening a collapsed menu.
    pub menu_settle: Duration,
    /// Pause between attempts at the same site.
    pub retry_backoff: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            consent_grace: Duration::from_millis(1000),
            consent_settle: Duration::from_millis(1000),
            popup_wait: Duration::from_millis(5000),
            click_settle: Duration::from_millis(2000),
            menu_settle: Duration::from_millis(800),
            retry_backoff: Duration::from_millis(2000),
        }
    }
}

impl Timings {
    /// No settle delays; popup waits bounded to a few milliseconds.
    pub fn instant() -> Self {
        Self {
            consent_grace: Duration::ZERO,
            consent_settle: Duration::ZERO,
            popup_wait: Duration::from_millis(20),
            click_settle: Duration::ZERO,
            menu_settle: Duration::ZERO,
            retry_backoff: Duration::ZERO,
        }
    }
}

/// Values supplied explicitly (usually from CLI flags).
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub output_dir: Option<PathBuf>,
    pub mode: Option<AnalysisMode>,
    pub headless: Option<bool>,
    pub max_retries: Option<u32>,
    pub nav_timeout_ms: Option<u64>,
    pub chromium_path: Option<PathBuf>,
    pub providers_file: Option<PathBuf>,
    pub patterns_file: Option<PathBuf>,
}

/// Fully resolved run configuration.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub output_dir: PathBuf,
    pub mode: AnalysisMode,
    pub headless: bool,
    pub max_retries: u32,
    pub nav_timeout_ms: u64,
    pub chromium_path: Option<PathBuf>,
    pub providers_file: Option<PathBuf>,
    pub patterns_file: Option<PathBuf>,
    pub timings: Timings,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            mode: AnalysisMode::Both,
            headless: true,
            max_retries: DEFAULT_MAX_RETRIES,
            nav_timeout_ms: DEFAULT_NAV_TIMEOUT_MS,
            chromium_path: None,
            providers_file: None,
            patterns_file: None,
            timings: Timings::default(),
        }
    }
}

impl RunConfig {
    /// Resolve against the process environment.
    pub fn resolve(overrides: ConfigOverrides) -> ProbeResult<Self> {
        Self::resolve_with(overrides, |key| std::env::var(key).ok())
    }

    /// Resolve against an arbitrary environment lookup.
    pub fn resolve_with<F>(overrides: ConfigOverrides, env: F) -> ProbeResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let output_dir = overrides
            .output_dir
            .or_else(|| env("AUTHSCOPE_OUTPUT_DIR").map(PathBuf::from))
            .unwrap_or(defaults.output_dir);

        let mode = match overrides.mode {
            Some(mode) => mode,
            None => env("AUTHSCOPE_MODE")
                .map(|m| m.parse())
                .transpose()?
                .unwrap_or(defaults.mode),
        };

        let headless = match overrides.headless {
            Some(h) => h,
            None => env("AUTHSCOPE_HEADLESS")
                .map(|v| parse_bool("AUTHSCOPE_HEADLESS", &v))
                .transpose()?
                .unwrap_or(defaults.headless),
        };

        let max_retries = match overrides.max_retries {
            Some(n) => n,
            None => env("AUTHSCOPE_MAX_RETRIES")
                .map(|v| parse_number("AUTHSCOPE_MAX_RETRIES", &v))
                .transpose()?
                .unwrap_or(defaults.max_retries),
        };
        if max_retries == 0 {
            return Err(ProbeError::Configuration(
                "max retries must be at least 1".to_string(),
            ));
        }

        let nav_timeout_ms = match overrides.nav_timeout_ms {
            Some(ms) => ms,
            None => env("AUTHSCOPE_NAV_TIMEOUT_MS")
                .map(|v| parse_number("AUTHSCOPE_NAV_TIMEOUT_MS", &v))
                .transpose()?
                .unwrap_or(defaults.nav_timeout_ms),
        };

        let chromium_path = overrides
            .chromium_path
            .or_else(|| env("AUTHSCOPE_CHROMIUM_PATH").map(PathBuf::from));

        Ok(Self {
            output_dir,
            mode,
            headless,
            max_retries,
            nav_timeout_ms,
            chromium_path,
            providers_file: overrides.providers_file,
            patterns_file: overrides.patterns_file,
            timings: defaults.timings,
        })
    }

    /// Load the provider registry, honouring an override file.
    pub fn load_providers(&self) -> ProbeResult<ProviderRegistry> {
        match &self.providers_file {
            Some(path) => ProviderRegistry::from_path(path),
            None => Ok(ProviderRegistry::builtin().clone()),
        }
    }

    /// Load the pattern set, honouring an override file.
    pub fn load_patterns(&self) -> ProbeResult<DetectionPatterns> {
        match &self.patterns_file {
            Some(path) => DetectionPatterns::from_path(path),
            None => Ok(DetectionPatterns::builtin().clone()),
        }
    }
}

fn parse_bool(key: &str, value: &str) -> ProbeResult<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ProbeError::Configuration(format!(
            "{key}: expected a boolean, got '{other}'"
        ))),
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> ProbeResult<T> {
    value.trim().parse().map_err(|_| {
        ProbeError::Configuration(format!("{key}: expected a number, got '{value}'"))
    })
}

// Copyright 2026 Authscope Contributors
// SPDX-License-Identifier: Apache-2.0

//! Result files.
//!
//! The full file set is regenerated from the in-memory results after every
//! site. Each file is written to a temporary sibling and renamed into place,
//! so readers only ever see whole snapshots.

use crate::error::ProbeResult;
use crate::model::{AuthMethod, SiteResult};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const DETAILED_RESULTS_FILE: &str = "detailed-results.json";
pub const OAUTH_FILE: &str = "OAuth.txt";
pub const NO_OAUTH_FILE: &str = "NOOAuth.txt";
pub const POPUP_FILE: &str = "Popup.txt";
pub const FAILED_FILE: &str = "Failed.txt";
pub const ERROR_LOG_FILE: &str = "error.log";

/// Writes the result file set into one directory.
#[derive(Debug, Clone)]
pub struct ResultWriter {
    dir: PathBuf,
}

impl ResultWriter {
    /// Create the writer, creating `dir` if needed.
    pub fn new(dir: impl Into<PathBuf>) -> ProbeResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Rewrite every output file from `results`.
    pub fn write_all(&self, results: &[SiteResult]) -> ProbeResult<()> {
        let json = serde_json::to_string_pretty(results)?;
        self.replace(DETAILED_RESULTS_FILE, &json)?;

        self.replace(OAUTH_FILE, &lines(results, oauth_line))?;
        self.replace(NO_OAUTH_FILE, &lines(results, no_oauth_line))?;
        self.replace(POPUP_FILE, &lines(results, popup_line))?;
        self.replace(FAILED_FILE, &lines(results, failed_line))?;
        self.replace(ERROR_LOG_FILE, &lines(results, error_line))?;

        debug!(dir = %self.dir.display(), results = results.len(), "result files written");
        Ok(())
    }

    fn replace(&self, name: &str, contents: &str) -> ProbeResult<()> {
        let target = self.dir.join(name);
        let tmp = self.dir.join(format!(".{name}.tmp"));
        {
            let mut file = std::fs::File::create(&tmp)?;
            file.write_all(contents.as_bytes())?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp, &target)?;
        Ok(())
    }
}

fn lines(results: &[SiteResult], line: fn(&SiteResult) -> Option<String>) -> String {
    let mut out = String::new();
    for entry in results.iter().filter_map(line) {
        out.push_str(&entry);
        out.push('\n');
    }
    out
}

/// `url \t providers \t detection-methods \t timestamp` for sites with OAuth.
pub fn oauth_line(result: &SiteResult) -> Option<String> {
    if !result.oauth.has_oauth {
        return None;
    }
    let providers: Vec<&str> = result.oauth.providers.iter().map(|p| p.as_str()).collect();
    let methods: Vec<String> = result
        .oauth
        .detection_methods
        .iter()
        .map(ToString::to_string)
        .collect();
    Some(format!(
        "{}\t{}\t{}\t{}",
        result.url,
        providers.join(","),
        methods.join(","),
        result.timestamp_string()
    ))
}

/// `url \t method-or-"no-login" \t timestamp` for cleanly analyzed sites
/// without OAuth.
pub fn no_oauth_line(result: &SiteResult) -> Option<String> {
    if result.oauth.has_oauth || result.has_errors() {
        return None;
    }
    Some(format!(
        "{}\t{}\t{}",
        result.url,
        method_label(result),
        result.timestamp_string()
    ))
}

/// `url \t popup \t timestamp` for sites whose login opens a popup.
pub fn popup_line(result: &SiteResult) -> Option<String> {
    if result.login_detection.method != AuthMethod::Popup {
        return None;
    }
    Some(format!("{}\tpopup\t{}", result.url, result.timestamp_string()))
}

/// `url \t first-error-or-"no-login-detected" \t timestamp` for sites with
/// errors or without a login entry point.
pub fn failed_line(result: &SiteResult) -> Option<String> {
    let reason = match result.errors.first() {
        Some(error) => single_line(error),
        None if !result.login_detection.found => "no-login-detected".to_string(),
        None => return None,
    };
    Some(format!(
        "{}\t{}\t{}",
        result.url,
        reason,
        result.timestamp_string()
    ))
}

/// `url \t first-error \t timestamp` for sites with any error.
pub fn error_line(result: &SiteResult) -> Option<String> {
    let error = result.errors.first()?;
    Some(format!(
        "{}\t{}\t{}",
        result.url,
        single_line(error),
        result.timestamp_string()
    ))
}

fn method_label(result: &SiteResult) -> String {
    if result.login_detection.found {
        result.login_detection.method.to_string()
    } else {
        "no-login".to_string()
    }
}

/// Tabs and newlines would break the column layout.
fn single_line(text: &str) -> String {
    text.split(['\t', '\n', '\r'])
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

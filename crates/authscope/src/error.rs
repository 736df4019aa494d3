// Copyright 2026 Authscope Contributors
// SPDX-License-Identifier: Apache-2.0

//! Error taxonomy for the analysis pipeline.

/// All errors the pipeline distinguishes between.
#[derive(thiserror::Error, Debug)]
pub enum ProbeError {
    /// Navigation timeout, network failure, certificate error, or a session
    /// that could not be opened. Retried by the batch runner.
    #[error("transient site error: {0}")]
    TransientSite(String),

    /// A stale, obstructed, or missing element during discovery or
    /// classification. Recovered locally by skipping the element.
    #[error("element interaction failed: {0}")]
    ElementInteraction(String),

    /// Unreadable input or override file. Fatal to the whole run.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The input entry could not be turned into an http(s) URL.
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ProbeError {
    /// Whether another attempt at the same site may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, ProbeError::TransientSite(_))
    }
}

pub type ProbeResult<T> = Result<T, ProbeError>;

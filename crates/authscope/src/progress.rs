// Copyright 2026 Authscope Contributors
// SPDX-License-Identifier: Apache-2.0

//! Progress event types and broadcast channel for batch telemetry.
//!
//! The batch runner emits `ProgressEvent`s as sites start, retry and finish.
//! They flow through a `tokio::sync::broadcast` channel to every subscriber
//! (the CLI progress bar, tests). When no subscriber exists, events are
//! silently dropped.

use crate::model::AuthMethod;
use serde::{Deserialize, Serialize};

/// A progress event emitted during a batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// The run this event belongs to.
    pub run_id: String,
    /// Monotonically increasing sequence number.
    pub seq: u64,
    /// The kind of progress event.
    pub event: ProgressEventKind,
}

/// The specific kind of progress event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProgressEventKind {
    /// A site is about to be analyzed. `index` is zero-based.
    SiteStarted {
        url: String,
        index: usize,
        total: usize,
    },
    /// One attempt failed; `will_retry` is false on the last attempt.
    AttemptFailed {
        url: String,
        attempt: u32,
        max_attempts: u32,
        error: String,
        will_retry: bool,
    },
    /// A site has its final record.
    SiteCompleted {
        url: String,
        method: AuthMethod,
        has_oauth: bool,
        failed: bool,
        duration_ms: u64,
    },
    /// Every site has a record.
    RunCompleted {
        total: usize,
        succeeded: usize,
        failed: usize,
        elapsed_ms: u64,
    },
}

/// Sender handle for emitting progress events.
pub type ProgressSender = tokio::sync::broadcast::Sender<ProgressEvent>;

/// Receiver handle for consuming progress events.
pub type ProgressReceiver = tokio::sync::broadcast::Receiver<ProgressEvent>;

/// Create a new progress broadcast channel with a bounded buffer.
pub fn channel() -> (ProgressSender, ProgressReceiver) {
    tokio::sync::broadcast::channel(256)
}

/// Emit a progress event, ignoring send errors (no receivers listening).
pub fn emit(tx: &Option<ProgressSender>, run_id: &str, seq: &mut u64, event: ProgressEventKind) {
    if let Some(ref sender) = tx {
        *seq += 1;
        let _ = sender.send(ProgressEvent {
            run_id: run_id.to_string(),
            seq: *seq,
            event,
        });
    }
}

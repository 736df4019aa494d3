// Copyright 2026 Authscope Contributors
// SPDX-License-Identifier: Apache-2.0

//! Batch orchestration.
//!
//! Sites run strictly one after another. Each gets up to `max_retries`
//! attempts; transient failures are retried after a backoff, anything else
//! (or the last transient failure) becomes a terminal failure record. The
//! full result file set is rewritten after every site.

use crate::analyzer::SiteAnalyzer;
use crate::audit::{AttemptLog, AttemptOutcome};
use crate::config::RunConfig;
use crate::error::{ProbeError, ProbeResult};
use crate::model::{AuthMethod, ProviderId, SiteResult};
use crate::progress::{self, ProgressEventKind, ProgressSender};
use crate::report::ResultWriter;
use chrono::Utc;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{info, info_span, warn, Instrument};

/// Trim entries, drop blanks, and keep the first occurrence of each.
pub fn dedupe_urls<I, S>(entries: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    entries
        .into_iter()
        .map(|entry| entry.as_ref().trim().to_string())
        .filter(|entry| !entry.is_empty())
        .filter(|entry| seen.insert(entry.clone()))
        .collect()
}

/// Read an input list (one entry per line).
pub fn load_url_list(path: &Path) -> ProbeResult<Vec<String>> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        ProbeError::Configuration(format!(
            "failed to read input file {}: {e}",
            path.display()
        ))
    })?;
    Ok(dedupe_urls(text.lines()))
}

/// Aggregate counts over a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub total: usize,
    /// Sites where a login entry point or an OAuth provider was found.
    pub succeeded: usize,
    /// Terminal failure records.
    pub failed: usize,
    pub oauth: usize,
    pub popup: usize,
    pub redirect: usize,
    pub modal: usize,
    /// Sites per provider, most frequent first, ties by name.
    pub providers: Vec<(ProviderId, usize)>,
    pub elapsed_ms: u64,
}

impl RunSummary {
    /// Count `results`, `terminal` of which are terminal failures.
    pub fn from_results(results: &[SiteResult], terminal: usize, elapsed_ms: u64) -> Self {
        let mut summary = Self {
            total: results.len(),
            failed: terminal,
            elapsed_ms,
            ..Self::default()
        };
        let mut providers: BTreeMap<ProviderId, usize> = BTreeMap::new();

        for result in results {
            if result.is_success() {
                summary.succeeded += 1;
            }
            if result.oauth.has_oauth {
                summary.oauth += 1;
            }
            match result.login_detection.method {
                AuthMethod::Popup => summary.popup += 1,
                AuthMethod::Redirect => summary.redirect += 1,
                AuthMethod::Modal => summary.modal += 1,
                AuthMethod::None => {}
            }
            for provider in &result.oauth.providers {
                *providers.entry(provider.clone()).or_default() += 1;
            }
        }

        let mut providers: Vec<(ProviderId, usize)> = providers.into_iter().collect();
        providers.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        summary.providers = providers;
        summary
    }
}

/// Drives the analyzer over a URL list.
pub struct BatchRunner {
    analyzer: SiteAnalyzer,
    writer: ResultWriter,
    attempt_log: Option<AttemptLog>,
    progress: Option<ProgressSender>,
    max_retries: u32,
    retry_backoff: Duration,
    run_id: String,
    seq: u64,
    results: Vec<SiteResult>,
    terminal: usize,
}

impl BatchRunner {
    pub fn new(analyzer: SiteAnalyzer, writer: ResultWriter, config: &RunConfig) -> Self {
        Self {
            analyzer,
            writer,
            attempt_log: None,
            progress: None,
            max_retries: config.max_retries.max(1),
            retry_backoff: config.timings.retry_backoff,
            run_id: format!("run-{}", Utc::now().format("%Y%m%dT%H%M%S")),
            seq: 0,
            results: Vec::new(),
            terminal: 0,
        }
    }

    /// Record every attempt to `log`.
    pub fn with_attempt_log(mut self, log: AttemptLog) -> Self {
        self.attempt_log = Some(log);
        self
    }

    /// Emit progress events on `tx`.
    pub fn with_progress(mut self, tx: ProgressSender) -> Self {
        self.progress = Some(tx);
        self
    }

    /// Records collected so far, in processing order.
    pub fn results(&self) -> &[SiteResult] {
        &self.results
    }

    /// Analyze every distinct entry of `entries`.
    pub async fn run<S: AsRef<str>>(&mut self, entries: &[S]) -> ProbeResult<RunSummary> {
        let started = Instant::now();
        let urls = dedupe_urls(entries);
        let total = urls.len();
        info!(total, mode = %self.analyzer.mode(), "starting batch");

        for (index, url) in urls.iter().enumerate() {
            self.emit(ProgressEventKind::SiteStarted {
                url: url.clone(),
                index,
                total,
            });

            let span = info_span!("site", index, url = %url);
            let (result, terminal) = self.analyze_with_retries(url).instrument(span).await;

            self.emit(ProgressEventKind::SiteCompleted {
                url: url.clone(),
                method: result.login_detection.method,
                has_oauth: result.oauth.has_oauth,
                failed: terminal,
                duration_ms: result.execution_time_ms,
            });

            if terminal {
                self.terminal += 1;
            }
            self.results.push(result);
            // The next site's rewrite carries everything this one missed.
            if let Err(e) = self.writer.write_all(&self.results) {
                warn!(dir = %self.writer.dir().display(), "failed to write results: {e}");
            }
        }

        let summary = RunSummary::from_results(
            &self.results,
            self.terminal,
            started.elapsed().as_millis() as u64,
        );
        self.emit(ProgressEventKind::RunCompleted {
            total: summary.total,
            succeeded: summary.succeeded,
            failed: summary.failed,
            elapsed_ms: summary.elapsed_ms,
        });
        info!(
            total = summary.total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "batch complete"
        );
        Ok(summary)
    }

    /// The site's record, and whether it is a terminal failure.
    async fn analyze_with_retries(&mut self, url: &str) -> (SiteResult, bool) {
        let site_started = Instant::now();
        let mut attempt = 1;
        loop {
            let attempt_started = Instant::now();
            let outcome = self.analyzer.analyze(url).await;
            let duration_ms = attempt_started.elapsed().as_millis() as u64;

            let error = match outcome {
                Ok(result) => {
                    self.log_attempt(url, attempt, AttemptOutcome::Ok, None, duration_ms);
                    return (result, false);
                }
                Err(e) => e,
            };

            let will_retry = error.is_transient() && attempt < self.max_retries;
            let message = error.to_string();
            warn!(attempt, max = self.max_retries, will_retry, "attempt failed: {message}");
            self.emit(ProgressEventKind::AttemptFailed {
                url: url.to_string(),
                attempt,
                max_attempts: self.max_retries,
                error: message.clone(),
                will_retry,
            });

            if will_retry {
                self.log_attempt(url, attempt, AttemptOutcome::Retry, Some(&message), duration_ms);
                tokio::time::sleep(self.retry_backoff).await;
                attempt += 1;
                continue;
            }

            self.log_attempt(url, attempt, AttemptOutcome::Terminal, Some(&message), duration_ms);
            let reason = if error.is_transient() {
                format!("max retries ({}) exceeded: {message}", self.max_retries)
            } else {
                message
            };
            let elapsed = site_started.elapsed().as_millis() as u64;
            return (SiteResult::failed(url, vec![reason], elapsed), true);
        }
    }

    fn log_attempt(
        &mut self,
        url: &str,
        attempt: u32,
        outcome: AttemptOutcome,
        message: Option<&str>,
        duration_ms: u64,
    ) {
        if let Some(log) = self.attempt_log.as_mut() {
            if let Err(e) = log.log_attempt(url, attempt, outcome, message, duration_ms) {
                warn!("failed to write attempt log: {e:#}");
            }
        }
    }

    fn emit(&mut self, event: ProgressEventKind) {
        progress::emit(&self.progress, &self.run_id, &mut self.seq, event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AnalysisMode, DetectionPatterns, ProviderRegistry, Timings};
    use crate::model::{DetectionMethod, LoginDetection, OAuthFindings};
    use crate::renderer::scripted::{ScriptedPage, ScriptedRenderer};
    use crate::renderer::Renderer;
    use std::collections::BTreeSet;
    use std::sync::Arc;

    fn config(max_retries: u32) -> RunConfig {
        RunConfig {
            max_retries,
            mode: AnalysisMode::Both,
            timings: Timings::instant(),
            ..RunConfig::default()
        }
    }

    fn runner(renderer: Arc<dyn Renderer>, dir: &Path, max_retries: u32) -> BatchRunner {
        let config = config(max_retries);
        let analyzer = SiteAnalyzer::new(
            renderer,
            Arc::new(ProviderRegistry::builtin().clone()),
            Arc::new(DetectionPatterns::builtin().clone()),
            &config,
        );
        BatchRunner::new(analyzer, ResultWriter::new(dir).unwrap(), &config)
    }

    #[test]
    fn test_dedupe_scenario() {
        assert_eq!(dedupe_urls(["a.com", "a.com", " b.com "]), vec!["a.com", "b.com"]);
    }

    #[test]
    fn test_dedupe_drops_blanks_and_keeps_first_seen_order() {
        let lines = ["", "  ", "c.com", "a.com", "c.com", "\tb.com", "a.com "];
        assert_eq!(dedupe_urls(lines), vec!["c.com", "a.com", "b.com"]);
    }

    #[test]
    fn test_load_url_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sites.txt");
        std::fs::write(&path, "github.com\n\nmedium.com\r\ngithub.com\n").unwrap();
        assert_eq!(load_url_list(&path).unwrap(), vec!["github.com", "medium.com"]);

        let err = load_url_list(&dir.path().join("missing.txt")).unwrap_err();
        assert!(matches!(err, ProbeError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_failed_snapshot_write_does_not_stop_batch() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let renderer = Arc::new(
            ScriptedRenderer::new()
                .with_page(ScriptedPage::new("https://a.example/"))
                .with_page(ScriptedPage::new("https://b.example/"))
                .with_page(ScriptedPage::new("https://c.example/")),
        );
        let mut runner = runner(renderer, &out, 1);

        // A plain file where the output directory should be.
        std::fs::remove_dir_all(&out).unwrap();
        std::fs::write(&out, "").unwrap();
        let summary = runner.run(&["a.example", "b.example"]).await.unwrap();
        assert_eq!(summary.total, 2);
        assert_eq!(runner.results().len(), 2);

        std::fs::remove_file(&out).unwrap();
        std::fs::create_dir(&out).unwrap();
        runner.run(&["c.example"]).await.unwrap();
        let written: Vec<SiteResult> = serde_json::from_str(
            &std::fs::read_to_string(out.join(crate::report::DETAILED_RESULTS_FILE)).unwrap(),
        )
        .unwrap();
        assert_eq!(written.len(), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_keep_one_terminal_record() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = Arc::new(
            ScriptedRenderer::new()
                .with_page(ScriptedPage::new("https://slow.example/"))
                .failing_navigation("https://slow.example/", 3),
        );
        let mut runner = runner(renderer.clone(), dir.path(), 3);
        let summary = runner.run(&["slow.example"]).await.unwrap();

        assert_eq!(renderer.contexts_created(), 3);
        assert_eq!(summary.total, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.succeeded, 0);

        let results = runner.results();
        assert_eq!(results.len(), 1);
        let record = &results[0];
        assert_eq!(record.url, "slow.example");
        assert_eq!(record.errors.len(), 1);
        assert!(record.errors[0].starts_with("max retries (3) exceeded"));
        assert_eq!(record.login_detection, LoginDetection::not_found());
        assert_eq!(record.oauth, OAuthFindings::none());
        assert!(!record.consent.detected);
    }

    #[tokio::test]
    async fn test_transient_failure_then_success() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = Arc::new(
            ScriptedRenderer::new()
                .with_page(ScriptedPage::new("https://flaky.example/"))
                .failing_navigation("https://flaky.example/", 2),
        );
        let log = AttemptLog::in_dir(dir.path()).unwrap();
        let mut runner = runner(renderer.clone(), dir.path(), 3).with_attempt_log(log);
        let summary = runner.run(&["flaky.example"]).await.unwrap();

        assert_eq!(summary.failed, 0);
        assert!(runner.results()[0].errors.is_empty());

        let log = std::fs::read_to_string(dir.path().join("attempts.jsonl")).unwrap();
        let outcomes: Vec<String> = log
            .lines()
            .map(|l| serde_json::from_str::<serde_json::Value>(l).unwrap()["outcome"].to_string())
            .collect();
        assert_eq!(outcomes, vec!["\"retry\"", "\"retry\"", "\"ok\""]);
    }

    #[tokio::test]
    async fn test_invalid_entry_is_not_retried() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = Arc::new(ScriptedRenderer::new());
        let mut runner = runner(renderer.clone(), dir.path(), 3);
        let summary = runner.run(&["gopher://old.example"]).await.unwrap();

        assert_eq!(renderer.contexts_created(), 0);
        assert_eq!(summary.failed, 1);
        assert!(runner.results()[0].errors[0].starts_with("invalid url"));
    }

    #[tokio::test]
    async fn test_progress_events_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = Arc::new(
            ScriptedRenderer::new()
                .with_page(ScriptedPage::new("https://a.example/"))
                .failing_navigation("https://a.example/", 1),
        );
        let (tx, mut rx) = progress::channel();
        let mut runner = runner(renderer, dir.path(), 2).with_progress(tx);
        runner.run(&["a.example"]).await.unwrap();

        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            kinds.push(match event.event {
                ProgressEventKind::SiteStarted { .. } => "started",
                ProgressEventKind::AttemptFailed { will_retry: true, .. } => "retry",
                ProgressEventKind::AttemptFailed { .. } => "gave-up",
                ProgressEventKind::SiteCompleted { .. } => "completed",
                ProgressEventKind::RunCompleted { .. } => "run-completed",
            });
        }
        assert_eq!(kinds, vec!["started", "retry", "completed", "run-completed"]);
    }

    #[test]
    fn test_summary_counts_and_provider_order() {
        let mut results = Vec::new();
        for (url, method, providers) in [
            ("a", AuthMethod::Popup, vec!["kakao", "google"]),
            ("b", AuthMethod::Redirect, vec!["google"]),
            ("c", AuthMethod::None, vec!["apple"]),
            ("d", AuthMethod::None, vec![]),
        ] {
            let mut result = SiteResult::failed(url, vec![], 10);
            result.login_detection = LoginDetection::detected(method, "a".into(), url.into());
            result.oauth = OAuthFindings::new(
                providers.into_iter().map(ProviderId::new).collect(),
                BTreeSet::from([DetectionMethod::Content]),
                BTreeSet::new(),
            );
            results.push(result);
        }

        let summary = RunSummary::from_results(&results, 0, 99);
        assert_eq!(summary.total, 4);
        assert_eq!(summary.succeeded, 3);
        assert_eq!(summary.oauth, 3);
        assert_eq!((summary.popup, summary.redirect, summary.modal), (1, 1, 0));
        assert_eq!(
            summary.providers,
            vec![
                (ProviderId::new("google"), 2),
                (ProviderId::new("apple"), 1),
                (ProviderId::new("kakao"), 1),
            ]
        );
    }
}

//! `authscope analyze`: run the full batch over an input list.

use crate::audit::AttemptLog;
use crate::batch::{load_url_list, BatchRunner, RunSummary};
use crate::cli::output;
use crate::config::{ConfigOverrides, RunConfig};
use crate::progress::{self, ProgressEventKind, ProgressReceiver};
use crate::report::ResultWriter;
use anyhow::{bail, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use tokio::sync::broadcast::error::RecvError;

/// Run the analyze command.
pub async fn run(input: &Path, overrides: ConfigOverrides) -> Result<()> {
    let config = RunConfig::resolve(overrides)?;
    let urls = load_url_list(input)?;
    if urls.is_empty() {
        bail!("no URLs found in {}", input.display());
    }

    let writer = ResultWriter::new(&config.output_dir)?;
    let attempt_log = AttemptLog::in_dir(&config.output_dir)?;
    let (renderer, analyzer) = super::build_analyzer(&config).await?;

    if !output::is_quiet() {
        eprintln!(
            "  Analyzing {} sites (mode: {}, retries: {})",
            urls.len(),
            config.mode,
            config.max_retries
        );
    }

    let (tx, rx) = progress::channel();
    let bar_task = (!output::is_quiet()).then(|| tokio::spawn(render_progress(rx, urls.len())));

    let mut runner = BatchRunner::new(analyzer, writer, &config)
        .with_attempt_log(attempt_log)
        .with_progress(tx);
    let outcome = runner.run(urls.as_slice()).await;
    drop(runner);

    if let Some(task) = bar_task {
        task.await.ok();
    }
    renderer.shutdown().await.ok();

    let summary = outcome?;
    print_summary(&summary, &config);
    Ok(())
}

async fn render_progress(mut rx: ProgressReceiver, total: usize) {
    let bar = ProgressBar::new(total as u64);
    if let Ok(style) = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
    ) {
        bar.set_style(style.progress_chars("#>-"));
    }

    loop {
        let event = match rx.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => break,
        };
        match event.event {
            ProgressEventKind::SiteStarted { url, .. } => bar.set_message(url),
            ProgressEventKind::AttemptFailed {
                url,
                attempt,
                max_attempts,
                error,
                will_retry,
            } => {
                let label = if will_retry { "retrying" } else { "giving up" };
                bar.println(format!(
                    "  [{attempt}/{max_attempts}] {url}: {error} ({label})"
                ));
            }
            ProgressEventKind::SiteCompleted { .. } => bar.inc(1),
            ProgressEventKind::RunCompleted { .. } => break,
        }
    }
    bar.finish_and_clear();
}

fn print_summary(summary: &RunSummary, config: &RunConfig) {
    if output::is_json() {
        let providers: serde_json::Map<String, serde_json::Value> = summary
            .providers
            .iter()
            .map(|(id, count)| (id.to_string(), serde_json::json!(count)))
            .collect();
        output::print_json(&serde_json::json!({
            "total": summary.total,
            "succeeded": summary.succeeded,
            "failed": summary.failed,
            "oauth": summary.oauth,
            "methods": {
                "popup": summary.popup,
                "redirect": summary.redirect,
                "modal": summary.modal,
            },
            "providers": providers,
            "elapsed_ms": summary.elapsed_ms,
            "output_dir": config.output_dir.display().to_string(),
        }));
        return;
    }
    if output::is_quiet() {
        return;
    }

    let pct = |n: usize| {
        if summary.total == 0 {
            0
        } else {
            n * 100 / summary.total
        }
    };
    println!();
    println!(
        "  Analyzed {} sites in {}",
        summary.total,
        output::format_duration_ms(summary.elapsed_ms)
    );
    println!("    Succeeded:  {} ({}%)", summary.succeeded, pct(summary.succeeded));
    println!("    Failed:     {} ({}%)", summary.failed, pct(summary.failed));
    println!("    OAuth:      {}", summary.oauth);
    println!(
        "    Login:      popup {}, redirect {}, modal {}",
        summary.popup, summary.redirect, summary.modal
    );
    if !summary.providers.is_empty() {
        println!("  Providers:");
        for (id, count) in &summary.providers {
            println!("    {:<12} {count:>4}", id.as_str());
        }
    }
    println!();
    println!("  Results written to {}/", config.output_dir.display());
}

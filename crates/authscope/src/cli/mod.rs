//! CLI subcommand implementations for the authscope binary.

pub mod analyze_cmd;
pub mod doctor;
pub mod init_cmd;
pub mod output;
pub mod single_cmd;

use crate::analyzer::SiteAnalyzer;
use crate::config::RunConfig;
use crate::renderer::chromium::{ChromiumRenderer, LaunchOptions};
use crate::renderer::Renderer;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

/// Load detection data, launch Chromium and wire up the analyzer.
///
/// Override files are read first so a bad file aborts before any browser
/// process starts.
pub async fn build_analyzer(config: &RunConfig) -> Result<(Arc<dyn Renderer>, SiteAnalyzer)> {
    let registry = Arc::new(config.load_providers()?);
    let patterns = Arc::new(config.load_patterns()?);
    info!(providers = registry.len(), "detection data loaded");

    let renderer = ChromiumRenderer::launch(&LaunchOptions {
        headless: config.headless,
        chromium_path: config.chromium_path.clone(),
    })
    .await
    .context("failed to start the browser (run `authscope doctor`)")?;
    let renderer: Arc<dyn Renderer> = Arc::new(renderer);

    let analyzer = SiteAnalyzer::new(Arc::clone(&renderer), registry, patterns, config);
    Ok((renderer, analyzer))
}

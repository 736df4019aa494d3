//! `authscope single <url>`: analyze one site and print its record.

use crate::cli::output;
use crate::config::{ConfigOverrides, RunConfig};
use anyhow::Result;

/// Run the single-site command.
pub async fn run(url: &str, overrides: ConfigOverrides) -> Result<()> {
    let config = RunConfig::resolve(overrides)?;
    let (renderer, analyzer) = super::build_analyzer(&config).await?;

    if !output::is_quiet() {
        eprintln!("  Analyzing {url} (mode: {})...", config.mode);
    }
    let outcome = analyzer.analyze(url).await;
    renderer.shutdown().await.ok();

    let result = outcome?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

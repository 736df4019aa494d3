//! `authscope init`: write a sample input list.

use crate::cli::output;
use anyhow::{bail, Context, Result};
use std::path::Path;

/// Entries of the sample list.
pub const SAMPLE_URLS: [&str; 3] = ["github.com", "stackoverflow.com", "medium.com"];

/// Run the init command.
pub async fn run(path: &Path, force: bool) -> Result<()> {
    write_sample(path, force)?;

    if output::is_json() {
        output::print_json(&serde_json::json!({
            "path": path.display().to_string(),
            "urls": SAMPLE_URLS,
        }));
    } else if !output::is_quiet() {
        println!("  Wrote {} sample URLs to {}", SAMPLE_URLS.len(), path.display());
        println!("  Run: authscope analyze -i {}", path.display());
    }
    Ok(())
}

/// Write the sample list, refusing to clobber an existing file unless `force`.
pub fn write_sample(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut contents = SAMPLE_URLS.join("\n");
    contents.push('\n');
    std::fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))
}

//! Environment readiness check.

use crate::cli::output;
use crate::config::{ConfigOverrides, ProviderRegistry, RunConfig};
use crate::renderer::chromium::find_chromium;
use anyhow::Result;
use std::path::Path;
use std::process::Command;

/// Check Chromium availability, the output directory, and available memory.
pub async fn run() -> Result<()> {
    let config = RunConfig::resolve(ConfigOverrides::default())?;
    let chromium = find_chromium(config.chromium_path.as_ref());
    let output_ok = dir_is_writable(&config.output_dir);
    let mem_mb = get_available_memory_mb();
    let providers = ProviderRegistry::builtin().len();
    let ready = chromium.is_some() && output_ok;

    if output::is_json() {
        output::print_json(&serde_json::json!({
            "os": std::env::consts::OS,
            "arch": std::env::consts::ARCH,
            "chromium": chromium.as_ref().map(|p| p.display().to_string()),
            "output_dir": config.output_dir.display().to_string(),
            "output_dir_writable": output_ok,
            "available_memory_mb": mem_mb,
            "providers": providers,
            "ready": ready,
        }));
        return Ok(());
    }

    println!("Authscope Doctor");
    println!("================");
    println!();
    println!("OS:   {}", std::env::consts::OS);
    println!("Arch: {}", std::env::consts::ARCH);
    println!();

    match &chromium {
        Some(path) => println!("[OK] Chromium found: {}", path.display()),
        None => println!(
            "[!!] Chromium NOT found. Install Chrome or set AUTHSCOPE_CHROMIUM_PATH."
        ),
    }

    if output_ok {
        println!(
            "[OK] Output directory {} is writable",
            config.output_dir.display()
        );
    } else {
        println!(
            "[!!] Output directory {} is not writable",
            config.output_dir.display()
        );
    }

    println!("[OK] {providers} identity providers configured");

    match mem_mb {
        Some(mb) if mb >= 512 => println!("[OK] Available memory: {mb}MB (>= 512MB required)"),
        Some(mb) => println!("[!!] Available memory: {mb}MB (< 512MB, may be insufficient)"),
        None => println!("[??] Could not determine available memory"),
    }

    println!();
    if ready {
        println!("Status: READY");
    } else {
        println!("Status: NOT READY");
    }

    Ok(())
}

/// Whether a file can be created in `dir` (created if missing).
fn dir_is_writable(dir: &Path) -> bool {
    if std::fs::create_dir_all(dir).is_err() {
        return false;
    }
    let probe = dir.join(".authscope-doctor");
    let ok = std::fs::write(&probe, b"ok").is_ok();
    std::fs::remove_file(&probe).ok();
    ok
}

/// Get available memory in MB (platform-specific).
fn get_available_memory_mb() -> Option<u64> {
    #[cfg(target_os = "macos")]
    {
        let output = Command::new("sysctl")
            .args(["-n", "hw.memsize"])
            .output()
            .ok()?;
        let s = String::from_utf8_lossy(&output.stdout);
        let bytes: u64 = s.trim().parse().ok()?;
        Some(bytes / 1_048_576)
    }
    #[cfg(target_os = "linux")]
    {
        let output = Command::new("free").args(["-m"]).output().ok()?;
        let s = String::from_utf8_lossy(&output.stdout);
        s.lines()
            .find(|line| line.starts_with("Mem:"))
            .and_then(|line| line.split_whitespace().nth(6))
            .and_then(|available| available.parse().ok())
    }
    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dir_is_writable() {
        let dir = tempfile::tempdir().unwrap();
        assert!(dir_is_writable(&dir.path().join("nested/out")));
        assert!(!dir.path().join("nested/out/.authscope-doctor").exists());
    }
}

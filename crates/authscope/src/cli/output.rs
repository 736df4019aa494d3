//! Global output flags and shared printing helpers.

use std::sync::atomic::{AtomicBool, Ordering};

static JSON: AtomicBool = AtomicBool::new(false);
static QUIET: AtomicBool = AtomicBool::new(false);

/// Record the global `--json` / `--quiet` flags.
pub fn init(json: bool, quiet: bool) {
    JSON.store(json, Ordering::Relaxed);
    QUIET.store(quiet, Ordering::Relaxed);
}

/// Machine-readable output requested.
pub fn is_json() -> bool {
    JSON.load(Ordering::Relaxed)
}

/// Non-essential output suppressed. JSON mode implies quiet.
pub fn is_quiet() -> bool {
    QUIET.load(Ordering::Relaxed) || is_json()
}

/// Print a JSON value to stdout.
pub fn print_json(value: &serde_json::Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(e) => eprintln!("  Error: failed to encode output: {e}"),
    }
}

/// `1234` → `1.2s`, `450` → `450ms`.
pub fn format_duration_ms(ms: u64) -> String {
    if ms >= 1000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else {
        format!("{ms}ms")
    }
}

//! JSONL attempt log: one line per site attempt.
//!
//! Features:
//! - Append-only JSONL format for easy parsing
//! - Automatic rotation when the file exceeds `MAX_LOG_SIZE` (10MB)
//! - Rotated files named `.1`, `.2`, etc. (at most `MAX_ROTATIONS` kept)

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Maximum attempt log size before rotation (10 MB).
const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;

/// Maximum number of rotated log files to keep.
const MAX_ROTATIONS: u32 = 3;

/// File name of the attempt log inside the output directory.
pub const ATTEMPT_LOG_FILE: &str = "attempts.jsonl";

/// How an attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptOutcome {
    /// The site produced a record.
    Ok,
    /// The attempt failed and another will follow.
    Retry,
    /// The attempt failed and the site gets a terminal failure record.
    Terminal,
}

/// A single attempt line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub timestamp: String,
    pub url: String,
    pub attempt: u32,
    pub outcome: AttemptOutcome,
    pub message: Option<String>,
    pub duration_ms: u64,
}

/// Append-only JSONL attempt log with automatic rotation.
pub struct AttemptLog {
    file: File,
    path: PathBuf,
    /// Approximate current size (may drift slightly; re-checked on rotation).
    current_size: u64,
    max_size: u64,
    max_rotations: u32,
}

impl AttemptLog {
    /// Open or create the attempt log file.
    pub fn open(path: &Path) -> Result<Self> {
        Self::with_limits(path, MAX_LOG_SIZE, MAX_ROTATIONS)
    }

    /// Open `attempts.jsonl` inside `dir`.
    pub fn in_dir(dir: &Path) -> Result<Self> {
        Self::open(&dir.join(ATTEMPT_LOG_FILE))
    }

    /// Open with custom rotation limits.
    pub fn with_limits(path: &Path, max_size: u64, max_rotations: u32) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = open_append(path)?;
        let current_size = file.metadata().map(|m| m.len()).unwrap_or(0);

        Ok(Self {
            file,
            path: path.to_path_buf(),
            current_size,
            max_size,
            max_rotations,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record.
    pub fn log(&mut self, record: &AttemptRecord) -> Result<()> {
        if self.current_size >= self.max_size {
            self.rotate()?;
        }

        let json = serde_json::to_string(record)?;
        writeln!(self.file, "{json}")
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        self.current_size += json.len() as u64 + 1;
        Ok(())
    }

    /// Log an attempt stamped with the current time.
    pub fn log_attempt(
        &mut self,
        url: &str,
        attempt: u32,
        outcome: AttemptOutcome,
        message: Option<&str>,
        duration_ms: u64,
    ) -> Result<()> {
        self.log(&AttemptRecord {
            timestamp: Utc::now().to_rfc3339(),
            url: url.to_string(),
            attempt,
            outcome,
            message: message.map(String::from),
            duration_ms,
        })
    }

    /// Rotate: attempts.jsonl → .1, .1 → .2, ..., dropping the oldest.
    fn rotate(&mut self) -> Result<()> {
        self.file.flush()?;

        if self.max_rotations == 0 {
            std::fs::remove_file(&self.path).ok();
        } else {
            let oldest = rotation_path(&self.path, self.max_rotations);
            if oldest.exists() {
                std::fs::remove_file(&oldest).ok();
            }
            for i in (1..self.max_rotations).rev() {
                let from = rotation_path(&self.path, i);
                if from.exists() {
                    std::fs::rename(&from, rotation_path(&self.path, i + 1)).ok();
                }
            }
            std::fs::rename(&self.path, rotation_path(&self.path, 1)).ok();
        }

        self.file = open_append(&self.path)
            .with_context(|| "failed to reopen attempt log after rotation")?;
        self.current_size = 0;
        Ok(())
    }
}

fn open_append(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open attempt log: {}", path.display()))
}

/// Build path for a rotated log file: `attempts.jsonl.1`, `attempts.jsonl.2`, etc.
fn rotation_path(base: &Path, index: u32) -> PathBuf {
    let name = format!(
        "{}.{index}",
        base.file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(ATTEMPT_LOG_FILE)
    );
    base.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(path: &Path) -> Vec<AttemptRecord> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn test_appends_jsonl_lines() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = AttemptLog::in_dir(dir.path()).unwrap();
        log.log_attempt("a.com", 1, AttemptOutcome::Retry, Some("timeout"), 15)
            .unwrap();
        log.log_attempt("a.com", 2, AttemptOutcome::Ok, None, 30).unwrap();

        let records = lines(&dir.path().join(ATTEMPT_LOG_FILE));
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].outcome, AttemptOutcome::Retry);
        assert_eq!(records[0].message.as_deref(), Some("timeout"));
        assert_eq!(records[1].attempt, 2);
    }

    #[test]
    fn test_reopen_continues_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.jsonl");
        AttemptLog::open(&path)
            .unwrap()
            .log_attempt("a.com", 1, AttemptOutcome::Ok, None, 1)
            .unwrap();
        AttemptLog::open(&path)
            .unwrap()
            .log_attempt("b.com", 1, AttemptOutcome::Ok, None, 1)
            .unwrap();
        assert_eq!(lines(&path).len(), 2);
    }

    #[test]
    fn test_rotation_keeps_bounded_history() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attempts.jsonl");
        let mut log = AttemptLog::with_limits(&path, 1, 2).unwrap();
        for attempt in 1..=4 {
            log.log_attempt("a.com", attempt, AttemptOutcome::Terminal, None, 0)
                .unwrap();
        }
        // each write after the first rotates; the current file holds the latest
        assert_eq!(lines(&path)[0].attempt, 4);
        assert_eq!(lines(&rotation_path(&path, 1))[0].attempt, 3);
        assert_eq!(lines(&rotation_path(&path, 2))[0].attempt, 2);
        assert!(!rotation_path(&path, 3).exists());
    }
}

//! Structured logging, the ingestion error log, and run metrics.
//!
//! This module provides:
//! - [`init_logging`]: one-time `tracing` setup with `RUST_LOG` support
//! - [`ErrorLog`]: append-only per-failure log written during ingestion
//! - [`redact_secrets`]: scrubs credentials out of text bound for the log
//! - [`IngestMetrics`]: serializable counters and timings for one run

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use crate::error::StructdexError;

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_LOG_DIRECTIVE: &str = "structdex=info";

/// Initialize structured logging with `RUST_LOG` environment variable support.
///
/// Falls back to `default_directive` when `RUST_LOG` is not set. Call once
/// at program startup; later calls are ignored.
pub fn init_logging(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    // try_init so double-init in tests doesn't panic
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Redact credentials that may leak into error messages (API keys, bearer
/// tokens echoed back by an HTTP endpoint).
pub fn redact_secrets(text: &str) -> String {
    let patterns: &[(&str, &str)] = &[
        (
            r#"(?i)(api[_-]?key|apikey)\s*[:=]\s*['"]?([a-zA-Z0-9_\-]{20,})['"]?"#,
            "$1=***REDACTED***",
        ),
        (r"(?i)Bearer\s+[a-zA-Z0-9_\-\.]{20,}", "Bearer ***REDACTED***"),
        (r"\bsk-[a-zA-Z0-9_\-]{20,}", "***REDACTED***"),
    ];

    let mut result = text.to_string();
    for (pattern, replacement) in patterns {
        if let Ok(re) = Regex::new(pattern) {
            result = re.replace_all(&result, *replacement).to_string();
        }
    }
    result
}

// ---------------------------------------------------------------------------
// Error log
// ---------------------------------------------------------------------------

/// One error-log line: `[<RFC 3339>] <file>: <kind>: <message>`.
pub fn format_entry(at: DateTime<Utc>, file: &str, kind: &str, message: &str) -> String {
    let message = redact_secrets(message).replace('\n', " ");
    format!(
        "[{}] {file}: {kind}: {message}",
        at.to_rfc3339_opts(SecondsFormat::Secs, true)
    )
}

/// Append-only failure log.
///
/// The file is created on the first entry, so a clean run leaves nothing
/// behind. Failing to write the log is itself only logged.
#[derive(Debug)]
pub struct ErrorLog {
    path: PathBuf,
    entries: usize,
}

impl ErrorLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Entries written by this handle.
    pub fn entries(&self) -> usize {
        self.entries
    }

    /// Record a failure attributed to `file`.
    pub fn record(&mut self, file: &str, error: &StructdexError) {
        self.record_raw(file, error.kind(), &error.to_string());
    }

    pub fn record_raw(&mut self, file: &str, kind: &str, message: &str) {
        tracing::error!("{file}: {kind}: {message}");
        let line = format_entry(Utc::now(), file, kind, message);
        let written = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut f| writeln!(f, "{line}"));
        match written {
            Ok(()) => self.entries += 1,
            Err(e) => tracing::warn!("could not append to {}: {e}", self.path.display()),
        }
    }
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// Counters and timings for one ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestMetrics {
    pub hierarchy_classes: usize,
    pub scan_ms: u64,
    pub pass2_ms: u64,
    pub chunks_parsed: usize,
    pub chunks_enriched: usize,
    pub enrichment_fallbacks: usize,
    pub enrichment_batches: usize,
    pub storage_writes: usize,
    pub chunks_written: usize,
    pub write_failures: usize,
}

impl IngestMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }

    /// Share of enriched chunks that needed the fallback.
    pub fn fallback_rate(&self) -> f64 {
        if self.chunks_enriched == 0 {
            0.0
        } else {
            self.enrichment_fallbacks as f64 / self.chunks_enriched as f64
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    #[test]
    fn init_logging_does_not_panic() {
        init_logging(DEFAULT_LOG_DIRECTIVE);
        init_logging(DEFAULT_LOG_DIRECTIVE);
    }

    #[test]
    fn entry_format() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        assert_eq!(
            format_entry(at, "src/Dog.java", "ParseFailure", "unexpected token"),
            "[2024-05-01T12:30:00Z] src/Dog.java: ParseFailure: unexpected token"
        );
    }

    #[test]
    fn entry_is_single_line() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        assert!(!format_entry(at, "f", "k", "line one\nline two").contains('\n'));
    }

    #[test]
    fn error_log_appends_and_counts() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("errors.log");
        let mut log = ErrorLog::new(&path);
        assert!(!path.exists());

        log.record("A.java", &StructdexError::parse("A.java", "bad tree"));
        log.record_raw("B.java", "StorageFailure", "disk full");
        assert_eq!(log.entries(), 2);

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("] A.java: ParseFailure: Parse error in A.java: bad tree"));
        assert!(lines[1].ends_with("B.java: StorageFailure: disk full"));
    }

    #[test]
    fn unwritable_log_does_not_panic() {
        let mut log = ErrorLog::new("/no/such/dir/errors.log");
        log.record_raw("X.java", "IoError", "boom");
        assert_eq!(log.entries(), 0);
    }

    #[test]
    fn redacts_keys_and_bearer_tokens() {
        let text = "401: invalid api_key=abcdefghijklmnopqrstuvwxyz, Bearer abcdefghijklmnopqrstuvwx";
        let redacted = redact_secrets(text);
        assert!(!redacted.contains("abcdefghijklmnopqrstuvwxyz"));
        assert!(redacted.contains("Bearer ***REDACTED***"));
        assert!(redact_secrets("key sk-proj1234567890abcdefghij").contains("***REDACTED***"));
    }

    #[test]
    fn metrics_serialize() {
        let metrics = IngestMetrics {
            chunks_enriched: 4,
            enrichment_fallbacks: 1,
            ..IngestMetrics::new()
        };
        assert_eq!(metrics.to_json()["chunks_enriched"], 4);
        assert!((metrics.fallback_rate() - 0.25).abs() < f64::EPSILON);
    }
}

//! Configuration data structures for structdex.
//!
//! The YAML file has four sections: `paths`, `ingestion`, `enrichment`, and
//! `storage`. Every field has a serde default, so an empty file (or no file)
//! is a valid configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StructdexError};

/// File name of the hierarchy map written next to the scanned sources.
pub const HIERARCHY_FILE_NAME: &str = "project_hierarchy.json";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructdexConfig {
    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub ingestion: IngestionConfig,

    #[serde(default)]
    pub enrichment: EnrichmentConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

impl StructdexConfig {
    /// Reject settings that would stall or disable the pipeline.
    pub fn validate(&self) -> Result<()> {
        let checks = [
            (self.ingestion.flush_size == 0, "ingestion.flush_size must be at least 1"),
            (self.ingestion.write_multiple == 0, "ingestion.write_multiple must be at least 1"),
            (self.ingestion.max_concurrent == 0, "ingestion.max_concurrent must be at least 1"),
            (
                self.ingestion.enrichment_timeout_secs == 0,
                "ingestion.enrichment_timeout_secs must be at least 1",
            ),
            (
                self.ingestion.max_inheritance_depth == 0,
                "ingestion.max_inheritance_depth must be at least 1",
            ),
        ];
        match checks.iter().find(|(failed, _)| *failed) {
            Some((_, message)) => Err(StructdexError::Config((*message).to_string())),
            None => Ok(()),
        }
    }

    /// Hierarchy file location: the configured path, or
    /// `<project_root>/project_hierarchy.json`.
    pub fn hierarchy_path(&self) -> PathBuf {
        self.paths
            .hierarchy_file
            .clone()
            .unwrap_or_else(|| self.paths.project_root.join(HIERARCHY_FILE_NAME))
    }

    /// Accumulated enriched chunks that trigger a storage write.
    pub fn write_threshold(&self) -> usize {
        self.ingestion.flush_size * self.ingestion.write_multiple
    }

    pub fn enrichment_timeout(&self) -> Duration {
        Duration::from_secs(self.ingestion.enrichment_timeout_secs)
    }
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Filesystem locations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Root of the Java source tree.
    #[serde(default = "default_project_root")]
    pub project_root: PathBuf,

    /// SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Hierarchy map; `None` means `<project_root>/project_hierarchy.json`.
    #[serde(default)]
    pub hierarchy_file: Option<PathBuf>,

    /// Append-only failure log.
    #[serde(default = "default_error_log")]
    pub error_log: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            project_root: default_project_root(),
            database_path: default_database_path(),
            hierarchy_file: None,
            error_log: default_error_log(),
        }
    }
}

/// Pipeline sizing and behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionConfig {
    /// Parsed chunks per enrichment batch.
    #[serde(default = "default_flush_size")]
    pub flush_size: usize,

    /// Enrichment batches accumulated per storage write.
    #[serde(default = "default_write_multiple")]
    pub write_multiple: usize,

    /// Enrichment calls in flight at once.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Per-chunk enrichment timeout.
    #[serde(default = "default_enrichment_timeout_secs")]
    pub enrichment_timeout_secs: u64,

    #[serde(default)]
    pub mock_enrichment: bool,

    #[serde(default = "default_true")]
    pub show_progress: bool,

    /// Longest ancestor chain followed when resolving inherited methods.
    #[serde(default = "default_max_inheritance_depth")]
    pub max_inheritance_depth: usize,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            flush_size: default_flush_size(),
            write_multiple: default_write_multiple(),
            max_concurrent: default_max_concurrent(),
            enrichment_timeout_secs: default_enrichment_timeout_secs(),
            mock_enrichment: false,
            show_progress: true,
            max_inheritance_depth: default_max_inheritance_depth(),
        }
    }
}

/// Enrichment client settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    #[serde(default = "default_model")]
    pub model: String,

    /// Base URL of an OpenAI-compatible API.
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Bodies larger than this get a canned summary instead of a remote call.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Body characters included in the prompt.
    #[serde(default = "default_prompt_body_chars")]
    pub prompt_body_chars: usize,

    /// Simulated latency of the mock enricher.
    #[serde(default = "default_mock_delay_ms")]
    pub mock_delay_ms: u64,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            api_base: default_api_base(),
            api_key_env: default_api_key_env(),
            max_body_bytes: default_max_body_bytes(),
            prompt_body_chars: default_prompt_body_chars(),
            mock_delay_ms: default_mock_delay_ms(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

/// Storage behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Retries for a write that hit lock contention.
    #[serde(default = "default_write_retries")]
    pub write_retries: u32,

    /// Base backoff; retry `n` waits `n * retry_backoff_ms`.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// How long SQLite itself waits on a lock before reporting BUSY.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Prepended to query text before embedding.
    #[serde(default)]
    pub query_prefix: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            write_retries: default_write_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            busy_timeout_ms: default_busy_timeout_ms(),
            query_prefix: String::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

fn default_project_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./data/structdex.db")
}

fn default_error_log() -> PathBuf {
    PathBuf::from("ingestion_errors.log")
}

fn default_flush_size() -> usize {
    20
}

fn default_write_multiple() -> usize {
    5
}

fn default_max_concurrent() -> usize {
    5
}

fn default_enrichment_timeout_secs() -> u64 {
    60
}

fn default_true() -> bool {
    true
}

fn default_max_inheritance_depth() -> usize {
    crate::indexer::inheritance::DEFAULT_MAX_DEPTH
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_max_body_bytes() -> usize {
    50_000
}

fn default_prompt_body_chars() -> usize {
    800
}

fn default_mock_delay_ms() -> u64 {
    100
}

fn default_temperature() -> f32 {
    0.3
}

fn default_max_tokens() -> u32 {
    300
}

fn default_write_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_busy_timeout_ms() -> u64 {
    crate::db::schema::DEFAULT_BUSY_TIMEOUT.as_millis() as u64
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

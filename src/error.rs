//! Error types for structdex.
//!
//! One enum covers the whole pipeline. Variants map onto the failure
//! taxonomy used in the error log (see [`StructdexError::kind`]), so a
//! caller can decide whether a failure is fatal for the run or scoped to a
//! single file, chunk, or batch.

use std::path::PathBuf;

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, StructdexError>;

/// Main error type for structdex operations.
#[derive(Error, Debug)]
pub enum StructdexError {
    /// A required file or directory does not exist.
    #[error("Not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The syntax tree could not be produced, or a declaration lacked an
    /// expected child node.
    #[error("Parse error in {}: {message}", file.display())]
    Parse {
        /// The file being parsed.
        file: PathBuf,
        /// What went wrong.
        message: String,
    },

    /// The enrichment collaborator failed (remote error, bad JSON shape,
    /// timeout, oversized input).
    #[error("Enrichment error: {0}")]
    Enrichment(String),

    /// The storage collaborator failed outside of SQLite itself.
    #[error("Storage error: {0}")]
    Storage(String),

    /// SQLite error.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid or unreadable configuration.
    #[error("Config error: {0}")]
    Config(String),

    /// Anything else.
    #[error("{0}")]
    Other(String),
}

impl StructdexError {
    /// Shorthand for a [`StructdexError::Parse`] on `file`.
    pub fn parse(file: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Parse {
            file: file.into(),
            message: message.into(),
        }
    }

    /// Taxonomy name written to the error log.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NotFound",
            Self::Parse { .. } => "ParseFailure",
            Self::Enrichment(_) => "EnrichmentFailure",
            Self::Storage(_) | Self::Sqlite(_) => "StorageFailure",
            Self::Io(_) => "IoError",
            Self::Json(_) => "JsonError",
            Self::Config(_) => "ConfigError",
            Self::Other(_) => "Error",
        }
    }

    /// Whether the failure is transient lock contention worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_maps_taxonomy() {
        assert_eq!(StructdexError::NotFound("x".into()).kind(), "NotFound");
        assert_eq!(StructdexError::parse("A.java", "bad").kind(), "ParseFailure");
        assert_eq!(
            StructdexError::Enrichment("timeout".into()).kind(),
            "EnrichmentFailure"
        );
        assert_eq!(StructdexError::Storage("disk".into()).kind(), "StorageFailure");
    }

    #[test]
    fn busy_is_transient() {
        let busy = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            Some("database is locked".into()),
        );
        assert!(StructdexError::from(busy).is_transient());
        assert!(!StructdexError::Storage("nope".into()).is_transient());
    }

    #[test]
    fn parse_error_display_includes_file() {
        let err = StructdexError::parse("src/Dog.java", "missing identifier");
        assert_eq!(err.to_string(), "Parse error in src/Dog.java: missing identifier");
    }
}

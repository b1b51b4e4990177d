//! structdex: structural, inheritance-aware indexing of Java codebases.
//!
//! Ingestion runs in two passes. The first scans every class into a
//! hierarchy map; the second splits public methods into chunks that carry
//! their class context and inherited API, enriches them with a summary and
//! keywords, and stores them for semantic retrieval.

pub mod config;
pub mod db;
pub mod error;
pub mod indexer;
pub mod observability;
pub mod types;

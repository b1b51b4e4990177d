//! Indexer: discover Java sources, scan the class hierarchy, split methods
//! into chunks, enrich them, and hand them to storage.

pub mod discovery;
pub mod embedder;
pub mod enricher;
pub mod hierarchy;
pub mod identity;
pub mod inheritance;
pub mod parser;
pub mod pipeline;
pub mod structure;

#[cfg(feature = "embedding")]
pub use embedder::EmbeddingEngine;
pub use embedder::{Embedder, EmbeddingTask};
pub use enricher::{build_enricher, Enricher, LlmEnricher, MockEnricher};
pub use hierarchy::HierarchyScanner;
pub use inheritance::HierarchyIndex;
pub use parser::CodeParser;
pub use pipeline::{IngestionPipeline, IngestionReport, PipelineState};
pub use structure::StructuralParser;

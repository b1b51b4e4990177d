//! Core domain types for structdex.
//!
//! The serde field names match the on-disk hierarchy file and the record
//! shape handed to the enrichment collaborator, so both stay readable by
//! other tools in the retrieval stack.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Synthetic method name given to constructors.
pub const CONSTRUCTOR_NAME: &str = "<Constructor>";

/// Package sentinel used when a file has no `package` declaration.
pub const NO_PACKAGE: &str = "None";

// ---------------------------------------------------------------------------
// Hierarchy
// ---------------------------------------------------------------------------

/// One declared class, as seen by the hierarchy scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassRecord {
    /// Raw `extends` type name with generic arguments stripped.
    pub parent: Option<String>,
    /// Declared (not inherited) public method names, declaration order,
    /// one entry per distinct name.
    #[serde(rename = "methods", default)]
    pub public_methods: Vec<String>,
    /// Class name without its package.
    pub simple_name: String,
}

/// Project-wide table of fully-qualified class name → [`ClassRecord`].
///
/// A `BTreeMap` keeps iteration (and therefore the persisted JSON and any
/// heuristic lookups) in a stable order.
pub type HierarchyMap = BTreeMap<String, ClassRecord>;

/// Build the hierarchy key for a class: `package.simpleName`, or just
/// `simpleName` when the file has no package.
pub fn qualified_name(package: &str, simple_name: &str) -> String {
    if package.is_empty() || package == NO_PACKAGE {
        simple_name.to_string()
    } else {
        format!("{package}.{simple_name}")
    }
}

/// Package part of a fully-qualified key (`NO_PACKAGE` if there is none).
pub fn package_of(qualified: &str) -> &str {
    match qualified.rfind('.') {
        Some(idx) => &qualified[..idx],
        None => NO_PACKAGE,
    }
}

// ---------------------------------------------------------------------------
// Chunks
// ---------------------------------------------------------------------------

/// One public method or constructor extracted with its resolved class context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodChunk {
    /// SHA-256 of `class_context::signature`, 64 hex chars.
    pub id: String,
    /// Method name, or [`CONSTRUCTOR_NAME`].
    pub method_name: String,
    /// Normalized `[modifiers] returnType name(Type a, Type b)` signature.
    #[serde(rename = "method_signature")]
    pub signature: String,
    /// Exact body text, braces included.
    #[serde(rename = "method_body")]
    pub body: String,
    /// `Package: P, Class: C, Fields: ...[, Extends: ...[, Inherited Methods: [...]]]`.
    pub class_context: String,
    /// Custom parameter types, first-seen order, de-duplicated.
    pub dependency_types: Vec<String>,
    /// Declaring package (`NO_PACKAGE` when absent).
    pub package: String,
    /// Declaring class simple name.
    pub class_name: String,
    /// Transitively inherited public method names.
    #[serde(default)]
    pub inherited_methods: Vec<String>,
    /// Source file; attached by the ingestion pipeline, not the parser.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
}

impl MethodChunk {
    pub fn is_constructor(&self) -> bool {
        self.method_name == CONSTRUCTOR_NAME
    }
}

/// Summary and keywords produced by the enrichment collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrichment {
    pub summary: String,
    /// At most five search keywords.
    pub keywords: Vec<String>,
}

/// A chunk together with its enrichment, ready for storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichedChunk {
    #[serde(flatten)]
    pub chunk: MethodChunk,
    pub summary: String,
    pub keywords: Vec<String>,
}

impl EnrichedChunk {
    pub fn new(chunk: MethodChunk, enrichment: Enrichment) -> Self {
        Self {
            chunk,
            summary: enrichment.summary,
            keywords: enrichment.keywords,
        }
    }

    /// Source file for error reporting (`"unknown"` when unset).
    pub fn file_path(&self) -> &str {
        self.chunk.file_path.as_deref().unwrap_or("unknown")
    }
}

// ---------------------------------------------------------------------------
// Run statistics
// ---------------------------------------------------------------------------

/// Counters for one ingestion run, owned by the pipeline's control flow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionStats {
    pub files_total: usize,
    pub files_processed: usize,
    pub files_failed: usize,
    pub chunks_indexed: usize,
}

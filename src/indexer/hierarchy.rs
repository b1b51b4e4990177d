//! Pass 1: project-wide class hierarchy scan.
//!
//! Every Java file is parsed once and reduced to per-class facts (parent
//! type, declared public method names). Files are parsed in parallel with
//! rayon, then merged sequentially in path order, so a class declared in
//! two files always resolves to the lexicographically later one.

use std::path::{Path, PathBuf};

use rayon::prelude::*;

use crate::error::{Result, StructdexError};
use crate::indexer::discovery::find_source_files;
use crate::indexer::parser::{self, CodeParser};
use crate::types::{qualified_name, ClassRecord, HierarchyMap};

/// Result of scanning a list of files.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    pub map: HierarchyMap,
    pub files_scanned: usize,
    /// Files skipped because they could not be read or parsed.
    pub failures: Vec<(PathBuf, StructdexError)>,
}

/// Builds the [`HierarchyMap`] for a source tree.
pub struct HierarchyScanner {
    parser: CodeParser,
}

impl HierarchyScanner {
    pub fn new() -> Self {
        Self {
            parser: CodeParser::new(),
        }
    }

    /// Scan every Java file under `root`.
    ///
    /// A missing root is fatal; per-file failures are logged and skipped.
    pub fn scan(&self, root: &Path) -> Result<HierarchyMap> {
        let files = find_source_files(root)?;
        Ok(self.scan_files(&files).map)
    }

    /// Scan an explicit file list, merging in the given order.
    pub fn scan_files(&self, files: &[PathBuf]) -> ScanOutcome {
        let extracted: Vec<(&PathBuf, Result<Vec<(String, ClassRecord)>>)> = files
            .par_iter()
            .map(|path| (path, self.extract_file(path)))
            .collect();

        let mut outcome = ScanOutcome {
            files_scanned: files.len(),
            ..ScanOutcome::default()
        };

        for (path, result) in extracted {
            match result {
                Ok(classes) => {
                    for (key, record) in classes {
                        if let Some(previous) = outcome.map.insert(key.clone(), record) {
                            tracing::warn!(
                                "class {key} redeclared in {}; replacing earlier entry (parent {:?})",
                                path.display(),
                                previous.parent
                            );
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!("hierarchy scan skipped {}: {e}", path.display());
                    outcome.failures.push((path.clone(), e));
                }
            }
        }

        tracing::info!(
            "hierarchy map built: {} classes from {} files ({} skipped)",
            outcome.map.len(),
            outcome.files_scanned,
            outcome.failures.len()
        );
        outcome
    }

    /// Extract class facts from one file on disk.
    pub fn extract_file(&self, path: &Path) -> Result<Vec<(String, ClassRecord)>> {
        let (source, tree) = self.parser.parse_file(path)?;
        if tree.root_node().has_error() {
            tracing::debug!("{} contains syntax errors; extracting what parses", path.display());
        }
        Ok(extract_classes(tree.root_node(), &source))
    }

    /// Extract class facts from in-memory source.
    pub fn extract_source(&self, path: &Path, source: &str) -> Result<Vec<(String, ClassRecord)>> {
        let tree = self.parser.parse(path, source)?;
        Ok(extract_classes(tree.root_node(), source))
    }
}

impl Default for HierarchyScanner {
    fn default() -> Self {
        Self::new()
    }
}

fn extract_classes(root: tree_sitter::Node<'_>, source: &str) -> Vec<(String, ClassRecord)> {
    let package = parser::package_name(root, source);

    parser::find_nodes_by_kind(root, "class_declaration")
        .into_iter()
        .filter_map(|class_node| {
            let simple_name = parser::class_name(class_node, source)?;
            let record = ClassRecord {
                parent: parser::parent_class(class_node, source),
                public_methods: public_method_names(class_node, source),
                simple_name: simple_name.clone(),
            };
            Some((qualified_name(&package, &simple_name), record))
        })
        .collect()
}

/// Declared public method names, declaration order, overloads collapsed.
fn public_method_names(class_node: tree_sitter::Node<'_>, source: &str) -> Vec<String> {
    let Some(body) = parser::class_body(class_node) else {
        return Vec::new();
    };

    let mut names: Vec<String> = Vec::new();
    let mut cursor = body.walk();
    for member in body.children(&mut cursor) {
        if member.kind() != "method_declaration" || !parser::has_modifier(member, "public") {
            continue;
        }
        let Some(name) = parser::field_text(member, "name", source) else {
            tracing::debug!("skipping method declaration without a name");
            continue;
        };
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

/// Write the map as pretty JSON, creating parent directories.
pub fn persist(map: &HierarchyMap, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(map)?;
    std::fs::write(path, json)?;
    tracing::info!("hierarchy map saved to {} ({} classes)", path.display(), map.len());
    Ok(())
}

/// Read a persisted map.
pub fn load(path: &Path) -> Result<HierarchyMap> {
    if !path.exists() {
        return Err(StructdexError::NotFound(path.to_path_buf()));
    }
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

/// Read a persisted map, falling back to an empty one (no inheritance
/// context) when the file is missing or unreadable.
pub fn load_or_empty(path: &Path) -> HierarchyMap {
    match load(path) {
        Ok(map) => {
            tracing::info!("loaded hierarchy map with {} classes", map.len());
            map
        }
        Err(e) => {
            tracing::warn!("hierarchy map unavailable ({e}); parsing without inheritance context");
            HierarchyMap::new()
        }
    }
}

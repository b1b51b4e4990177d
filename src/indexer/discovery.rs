//! Source file discovery.
//!
//! Both passes walk the same list, so the order is fixed here: every
//! `.java` file under the root, sorted lexicographically by path. That
//! makes last-file-wins merges in the hierarchy scan reproducible across
//! machines and filesystems.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{Result, StructdexError};
use crate::indexer::parser::CodeParser;

/// Collect every Java source under `root`, sorted by path.
///
/// Fails with [`StructdexError::NotFound`] when `root` does not exist;
/// unreadable entries below the root are logged and skipped.
pub fn find_source_files(root: &Path) -> Result<Vec<PathBuf>> {
    if !root.exists() {
        return Err(StructdexError::NotFound(root.to_path_buf()));
    }

    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(e) => Some(e),
            Err(e) => {
                tracing::warn!("skipping unreadable entry under {}: {e}", root.display());
                None
            }
        })
        .filter(|e| e.file_type().is_file() && CodeParser::is_supported(e.path()))
        .map(|e| e.into_path())
        .collect();

    files.sort();
    tracing::debug!("found {} Java files under {}", files.len(), root.display());
    Ok(files)
}

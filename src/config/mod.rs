//! Configuration loading.
//!
//! Sources, first match wins: an explicit `--config` path, `./structdex.yaml`,
//! then `structdex.yaml` in the user config directory. With none present
//! the defaults apply. CLI flags are layered on top by the binary.

pub mod schema;

use std::path::{Path, PathBuf};

pub use schema::{
    EnrichmentConfig, IngestionConfig, PathsConfig, StorageConfig, StructdexConfig,
    HIERARCHY_FILE_NAME,
};

use crate::error::{Result, StructdexError};

/// Config file name looked up in the working and user config directories.
pub const CONFIG_FILE_NAME: &str = "structdex.yaml";

/// Load and validate the configuration.
///
/// An explicit path that does not exist is an error; the implicit locations
/// are skipped when absent.
pub fn load_config(explicit: Option<&Path>) -> Result<StructdexConfig> {
    let config = match explicit {
        Some(path) => load_from_file(path)?,
        None => match candidate_paths().into_iter().find(|p| p.is_file()) {
            Some(path) => load_from_file(&path)?,
            None => {
                tracing::debug!("no config file found; using defaults");
                StructdexConfig::default()
            }
        },
    };
    config.validate()?;
    Ok(config)
}

/// Parse one YAML config file.
pub fn load_from_file(path: &Path) -> Result<StructdexConfig> {
    if !path.exists() {
        return Err(StructdexError::NotFound(path.to_path_buf()));
    }
    let contents = std::fs::read_to_string(path)?;
    let config: StructdexConfig = serde_yaml::from_str(&contents)
        .map_err(|e| StructdexError::Config(format!("{}: {e}", path.display())))?;
    tracing::info!("loaded config from {}", path.display());
    Ok(config)
}

/// Implicit config locations in priority order.
pub fn candidate_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(CONFIG_FILE_NAME)];
    if let Some(dirs) = directories::ProjectDirs::from("", "", "structdex") {
        paths.push(dirs.config_dir().join(CONFIG_FILE_NAME));
    }
    paths
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn explicit_file_is_loaded() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("custom.yaml");
        std::fs::write(&path, "ingestion:\n  max_concurrent: 2\n").unwrap();
        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.ingestion.max_concurrent, 2);
    }

    #[test]
    fn explicit_missing_file_is_not_found() {
        let err = load_config(Some(Path::new("/no/such/structdex.yaml"))).unwrap_err();
        assert!(matches!(err, StructdexError::NotFound(_)));
    }

    #[test]
    fn invalid_values_fail_validation() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.yaml");
        std::fs::write(&path, "ingestion:\n  write_multiple: 0\n").unwrap();
        let err = load_config(Some(&path)).unwrap_err();
        assert_eq!(err.kind(), "ConfigError");
    }

    #[test]
    fn malformed_yaml_is_config_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.yaml");
        std::fs::write(&path, "paths: [unclosed").unwrap();
        assert_eq!(load_from_file(&path).unwrap_err().kind(), "ConfigError");
    }

    #[test]
    fn working_directory_comes_first() {
        assert_eq!(candidate_paths()[0], PathBuf::from(CONFIG_FILE_NAME));
    }
}

//! Configuration loading
//!
//! Each setting resolves in priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! Command line and environment are handled by the service binary; this
//! module owns the TOML layer and the compiled defaults.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable naming an alternative config file
pub const CONFIG_PATH_ENV: &str = "PHD_CONFIG";

/// Default config file, relative to the working directory
pub const DEFAULT_CONFIG_FILE: &str = "phd.toml";

/// Optional settings read from the TOML config file
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TomlConfig {
    pub bind_addr: Option<String>,
    pub database_path: Option<PathBuf>,
    pub log_level: Option<String>,
    pub event_bus_capacity: Option<usize>,
    #[serde(default)]
    pub metadata: MetadataConfig,
}

/// External metadata services used by the enriched plate view
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MetadataConfig {
    pub plate_service_url: Option<String>,
    pub protocol_service_url: Option<String>,
    pub timeout_ms: Option<u64>,
}

/// Fallback values when no other source provides a setting
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledDefaults {
    pub bind_addr: String,
    pub database_path: PathBuf,
    pub log_level: String,
    pub event_bus_capacity: usize,
    pub metadata_timeout_ms: u64,
}

impl Default for CompiledDefaults {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:5740".to_string(),
            database_path: PathBuf::from("phd.db"),
            log_level: "info".to_string(),
            event_bus_capacity: 100,
            metadata_timeout_ms: 5000,
        }
    }
}

/// Load the TOML config file at `path`
///
/// A missing file is not an error: it logs a warning and returns `None` so the
/// caller falls back to defaults. An unreadable or malformed file is a
/// `Config` error.
pub fn load_toml_config(path: &Path) -> Result<Option<TomlConfig>> {
    if !path.exists() {
        warn!(
            "Config file {} not found, using defaults",
            path.display()
        );
        return Ok(None);
    }

    let content = std::fs::read_to_string(path)?;
    let config = toml::from_str::<TomlConfig>(&content)
        .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;

    debug!("Loaded config file {}", path.display());
    Ok(Some(config))
}

/// Config file location: explicit path, then `PHD_CONFIG`, then `phd.toml`
pub fn resolve_config_path(cli_path: Option<&Path>) -> PathBuf {
    if let Some(path) = cli_path {
        return path.to_path_buf();
    }
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        return PathBuf::from(path);
    }
    PathBuf::from(DEFAULT_CONFIG_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file_yields_none() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_toml_config(&dir.path().join("absent.toml")).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_partial_file_leaves_other_fields_unset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("phd.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "bind_addr = \"0.0.0.0:9000\"").unwrap();
        writeln!(file, "[metadata]").unwrap();
        writeln!(file, "plate_service_url = \"http://plates:8080\"").unwrap();

        let config = load_toml_config(&path).unwrap().unwrap();
        assert_eq!(config.bind_addr.as_deref(), Some("0.0.0.0:9000"));
        assert!(config.database_path.is_none());
        assert_eq!(
            config.metadata.plate_service_url.as_deref(),
            Some("http://plates:8080")
        );
        assert!(config.metadata.protocol_service_url.is_none());
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("phd.toml");
        std::fs::write(&path, "bind_addr = [unterminated").unwrap();

        match load_toml_config(&path) {
            Err(Error::Config(msg)) => assert!(msg.contains("phd.toml")),
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn test_compiled_defaults() {
        let defaults = CompiledDefaults::default();
        assert_eq!(defaults.bind_addr, "127.0.0.1:5740");
        assert_eq!(defaults.log_level, "info");
        assert_eq!(defaults.event_bus_capacity, 100);
    }
}

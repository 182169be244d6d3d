//! Service configuration for phd-rd
//!
//! Command line / environment (via clap) override the TOML file, which
//! overrides the compiled defaults.

use clap::Parser;
use phd_common::config::{load_toml_config, resolve_config_path, CompiledDefaults, TomlConfig};
use phd_common::{Error, Result};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

/// Command-line arguments for phd-rd
#[derive(Parser, Debug, Default)]
#[command(name = "phd-rd")]
#[command(about = "Result data service for plate measurements")]
#[command(version)]
pub struct Args {
    /// TOML config file (default: $PHD_CONFIG, then ./phd.toml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to listen on
    #[arg(short, long, env = "PHD_BIND_ADDR")]
    pub bind_addr: Option<String>,

    /// SQLite database file
    #[arg(short, long, env = "PHD_DATABASE")]
    pub database: Option<PathBuf>,

    /// Log level (RUST_LOG takes precedence)
    #[arg(long, env = "PHD_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Base URL of the plate metadata service
    #[arg(long, env = "PHD_PLATE_SERVICE_URL")]
    pub plate_service_url: Option<String>,

    /// Base URL of the protocol metadata service
    #[arg(long, env = "PHD_PROTOCOL_SERVICE_URL")]
    pub protocol_service_url: Option<String>,
}

/// Fully resolved settings
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub bind_addr: String,
    pub database_path: PathBuf,
    pub log_level: String,
    pub event_bus_capacity: usize,
    pub plate_service_url: Option<String>,
    pub protocol_service_url: Option<String>,
    pub metadata_timeout: Duration,
}

impl ServiceConfig {
    /// Resolve from arguments, the config file they point at, and defaults
    pub fn resolve(args: Args) -> Result<Self> {
        let path = resolve_config_path(args.config.as_deref());
        let toml = load_toml_config(&path)?.unwrap_or_default();
        Self::merge(args, toml, CompiledDefaults::default())
    }

    pub fn merge(args: Args, toml: TomlConfig, defaults: CompiledDefaults) -> Result<Self> {
        let event_bus_capacity = toml
            .event_bus_capacity
            .unwrap_or(defaults.event_bus_capacity);
        if event_bus_capacity == 0 {
            return Err(Error::Config(
                "event_bus_capacity must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            bind_addr: args
                .bind_addr
                .or(toml.bind_addr)
                .unwrap_or(defaults.bind_addr),
            database_path: args
                .database
                .or(toml.database_path)
                .unwrap_or(defaults.database_path),
            log_level: args
                .log_level
                .or(toml.log_level)
                .unwrap_or(defaults.log_level),
            event_bus_capacity,
            plate_service_url: args
                .plate_service_url
                .or(toml.metadata.plate_service_url),
            protocol_service_url: args
                .protocol_service_url
                .or(toml.metadata.protocol_service_url),
            metadata_timeout: Duration::from_millis(
                toml.metadata
                    .timeout_ms
                    .unwrap_or(defaults.metadata_timeout_ms),
            ),
        })
    }

    pub fn log_summary(&self) {
        info!("Bind address: {}", self.bind_addr);
        info!("Database path: {}", self.database_path.display());
        match (&self.plate_service_url, &self.protocol_service_url) {
            (Some(plates), Some(protocols)) => {
                info!("Metadata services: plates {} protocols {}", plates, protocols)
            }
            _ => info!("Metadata services not fully configured; /full view unavailable"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use phd_common::config::MetadataConfig;

    #[test]
    fn test_defaults_when_nothing_set() {
        let config =
            ServiceConfig::merge(Args::default(), TomlConfig::default(), CompiledDefaults::default())
                .unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:5740");
        assert_eq!(config.database_path, PathBuf::from("phd.db"));
        assert_eq!(config.metadata_timeout, Duration::from_millis(5000));
        assert!(config.plate_service_url.is_none());
    }

    #[test]
    fn test_args_override_toml() {
        let args = Args {
            bind_addr: Some("0.0.0.0:1".to_string()),
            ..Args::default()
        };
        let toml = TomlConfig {
            bind_addr: Some("0.0.0.0:2".to_string()),
            log_level: Some("debug".to_string()),
            metadata: MetadataConfig {
                protocol_service_url: Some("http://protocols".to_string()),
                timeout_ms: Some(250),
                ..MetadataConfig::default()
            },
            ..TomlConfig::default()
        };

        let config = ServiceConfig::merge(args, toml, CompiledDefaults::default()).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:1");
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.protocol_service_url.as_deref(), Some("http://protocols"));
        assert_eq!(config.metadata_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_zero_event_bus_capacity_is_rejected() {
        let toml = TomlConfig {
            event_bus_capacity: Some(0),
            ..TomlConfig::default()
        };

        let result = ServiceConfig::merge(Args::default(), toml, CompiledDefaults::default());
        assert!(matches!(result, Err(Error::Config(_))));

        let toml = TomlConfig {
            event_bus_capacity: Some(1),
            ..TomlConfig::default()
        };
        let config = ServiceConfig::merge(Args::default(), toml, CompiledDefaults::default()).unwrap();
        assert_eq!(config.event_bus_capacity, 1);
    }
}

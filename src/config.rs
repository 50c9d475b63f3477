//! Control center configuration.
//!
//! Read from a JSON file; every field is optional and falls back to the
//! defaults below.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::network::{AddressRange, PollerConfig};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlConfig {
    /// Addresses to poll, e.g. `192.168.22.0-20`
    #[serde(default = "default_ip_range")]
    pub ip_range: String,

    /// Seconds between discovery cycles
    #[serde(default = "default_delay_secs")]
    pub delay_secs: u64,

    /// Per-request timeout for probes and commands (milliseconds)
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    /// Path of the status endpoint on each PLU
    #[serde(default = "default_info_path")]
    pub info_path: String,

    /// Path of the command endpoint on each PLU
    #[serde(default = "default_config_path")]
    pub config_path: String,

    /// Probes in flight per cycle
    #[serde(default = "default_max_concurrent_probes")]
    pub max_concurrent_probes: usize,

    /// Consecutive missed cycles before a PLU is dropped
    #[serde(default = "default_eviction_misses")]
    pub eviction_misses: u32,

    /// Role catalog file
    #[serde(default = "default_role_store")]
    pub role_store: PathBuf,

    /// Directory imported role figures are copied into
    #[serde(default = "default_figure_dir")]
    pub figure_dir: PathBuf,

    /// Largest distance at which two adjacent PLUs are still linked
    #[serde(default = "default_max_link_distance")]
    pub max_link_distance: f64,

    /// Bind address of the status API
    #[serde(default = "default_status_addr")]
    pub status_addr: SocketAddr,
}

fn default_ip_range() -> String {
    "192.168.22.0-20".to_string()
}

fn default_delay_secs() -> u64 {
    3
}

fn default_probe_timeout_ms() -> u64 {
    800
}

fn default_info_path() -> String {
    "info".to_string()
}

fn default_config_path() -> String {
    "config".to_string()
}

fn default_max_concurrent_probes() -> usize {
    32
}

fn default_eviction_misses() -> u32 {
    1
}

fn default_role_store() -> PathBuf {
    PathBuf::from("roles.db")
}

fn default_figure_dir() -> PathBuf {
    PathBuf::from("material/figures")
}

fn default_max_link_distance() -> f64 {
    150.0
}

fn default_status_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            ip_range: default_ip_range(),
            delay_secs: default_delay_secs(),
            probe_timeout_ms: default_probe_timeout_ms(),
            info_path: default_info_path(),
            config_path: default_config_path(),
            max_concurrent_probes: default_max_concurrent_probes(),
            eviction_misses: default_eviction_misses(),
            role_store: default_role_store(),
            figure_dir: default_figure_dir(),
            max_link_distance: default_max_link_distance(),
            status_addr: default_status_addr(),
        }
    }
}

impl ControlConfig {
    /// Load and validate a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        let config: Self =
            serde_json::from_str(&data).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.address_range()?;
        if self.delay_secs == 0 {
            return Err(ConfigError::Invalid("delay_secs must be > 0".into()));
        }
        if self.probe_timeout_ms == 0 {
            return Err(ConfigError::Invalid("probe_timeout_ms must be > 0".into()));
        }
        if self.max_concurrent_probes == 0 {
            return Err(ConfigError::Invalid("max_concurrent_probes must be > 0".into()));
        }
        if self.eviction_misses == 0 {
            return Err(ConfigError::Invalid("eviction_misses must be > 0".into()));
        }
        if !(self.max_link_distance.is_finite() && self.max_link_distance >= 0.0) {
            return Err(ConfigError::Invalid(
                "max_link_distance must be a non-negative number".into(),
            ));
        }
        Ok(())
    }

    pub fn address_range(&self) -> Result<AddressRange, ConfigError> {
        AddressRange::parse(&self.ip_range).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn poller_config(&self) -> PollerConfig {
        PollerConfig {
            delay: Duration::from_secs(self.delay_secs),
            max_concurrent: self.max_concurrent_probes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ControlConfig::default();
        config.validate().unwrap();
        assert_eq!(config.address_range().unwrap().len(), 21);
        assert_eq!(config.poller_config().delay, Duration::from_secs(3));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("control.json");
        std::fs::write(&path, r#"{"ip_range": "10.0.0.5-9", "delay_secs": 1}"#).unwrap();

        let config = ControlConfig::load(&path).unwrap();
        assert_eq!(config.ip_range, "10.0.0.5-9");
        assert_eq!(config.delay_secs, 1);
        assert_eq!(config.info_path, "info");
        assert_eq!(config.eviction_misses, 1);
        assert_eq!(config.role_store, PathBuf::from("roles.db"));
    }

    #[test]
    fn test_malformed_range_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("control.json");
        std::fs::write(&path, r#"{"ip_range": "10.0.0.9-5"}"#).unwrap();

        assert!(matches!(ControlConfig::load(&path), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_zero_values_rejected() {
        let config = ControlConfig { delay_secs: 0, ..ControlConfig::default() };
        assert!(config.validate().is_err());

        let config = ControlConfig { eviction_misses: 0, ..ControlConfig::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_and_unparsable_files() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            ControlConfig::load(&dir.path().join("absent.json")),
            Err(ConfigError::Io(_))
        ));

        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{ nope").unwrap();
        assert!(matches!(ControlConfig::load(&path), Err(ConfigError::Parse(_))));
    }
}

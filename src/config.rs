use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,
    #[serde(default = "default_page_size")]
    pub default_page_size: u64,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub helpers: HelperConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NetworkConfig {
    #[serde(default = "default_wifi_interface")]
    pub wifi_interface: String,
    #[serde(default = "default_ethernet_interfaces")]
    pub ethernet_interfaces: Vec<String>,
    #[serde(default = "default_tailscale_bin")]
    pub tailscale_bin: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HelperConfig {
    #[serde(default = "default_temperature_helper")]
    pub temperature_helper: String,
    #[serde(default = "default_purge_helper")]
    pub purge_helper: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            command_timeout_ms: default_command_timeout_ms(),
            default_page_size: default_page_size(),
            network: NetworkConfig::default(),
            helpers: HelperConfig::default(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            wifi_interface: default_wifi_interface(),
            ethernet_interfaces: default_ethernet_interfaces(),
            tailscale_bin: default_tailscale_bin(),
        }
    }
}

impl Default for HelperConfig {
    fn default() -> Self {
        Self {
            temperature_helper: default_temperature_helper(),
            purge_helper: default_purge_helper(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse YAML in {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },
    #[error("invalid configuration: {0}")]
    Validation(String),
}

impl Config {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let path_display = path_ref.display().to_string();
        let text = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
            path: path_display.clone(),
            source,
        })?;

        let cfg: Config = serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path_display,
            source,
        })?;

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_secs < 1 {
            return Err(ConfigError::Validation(
                "interval_secs must be >= 1".to_string(),
            ));
        }
        if self.command_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "command_timeout_ms must be > 0".to_string(),
            ));
        }
        if self.default_page_size == 0 {
            return Err(ConfigError::Validation(
                "default_page_size must be > 0".to_string(),
            ));
        }

        validate_network(&self.network)?;
        validate_helpers(&self.helpers)?;

        Ok(())
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn example_yaml() -> &'static str {
        include_str!("../config.yaml.example")
    }
}

fn validate_network(cfg: &NetworkConfig) -> Result<(), ConfigError> {
    if !is_interface_name(&cfg.wifi_interface) {
        return Err(ConfigError::Validation(format!(
            "network.wifi_interface '{}' is not a valid interface name",
            cfg.wifi_interface
        )));
    }

    let mut names = HashSet::new();
    for iface in &cfg.ethernet_interfaces {
        if !is_interface_name(iface) {
            return Err(ConfigError::Validation(format!(
                "network.ethernet_interfaces entry '{iface}' is not a valid interface name"
            )));
        }
        if iface == &cfg.wifi_interface {
            return Err(ConfigError::Validation(format!(
                "network.ethernet_interfaces must not contain the wifi interface '{iface}'"
            )));
        }
        if !names.insert(iface.as_str()) {
            return Err(ConfigError::Validation(format!(
                "network.ethernet_interfaces entry '{iface}' is listed twice"
            )));
        }
    }

    if cfg.tailscale_bin.trim().is_empty() {
        return Err(ConfigError::Validation(
            "network.tailscale_bin must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_helpers(cfg: &HelperConfig) -> Result<(), ConfigError> {
    if cfg.temperature_helper.trim().is_empty() {
        return Err(ConfigError::Validation(
            "helpers.temperature_helper must not be empty".to_string(),
        ));
    }
    if !cfg.purge_helper.starts_with('/') {
        return Err(ConfigError::Validation(
            "helpers.purge_helper must be an absolute path".to_string(),
        ));
    }
    Ok(())
}

fn is_interface_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric())
}

const fn default_interval_secs() -> u64 {
    10
}

const fn default_command_timeout_ms() -> u64 {
    5000
}

const fn default_page_size() -> u64 {
    16384
}

fn default_wifi_interface() -> String {
    "en0".to_string()
}

fn default_ethernet_interfaces() -> Vec<String> {
    (1..=8).map(|i| format!("en{i}")).collect()
}

fn default_tailscale_bin() -> String {
    "tailscale".to_string()
}

fn default_temperature_helper() -> String {
    "osx-cpu-temp".to_string()
}

fn default_purge_helper() -> String {
    "/usr/sbin/purge".to_string()
}

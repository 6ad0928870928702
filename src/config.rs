// src/config.rs

//! Manages broker configuration: loading from TOML, resolving defaults, and
//! validation.

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;

/// Configuration for the Prometheus metrics exporter.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct MetricsConfig {
    /// If true, an HTTP server will be started to expose Prometheus metrics.
    #[serde(default)]
    pub enabled: bool,
    /// The port for the Prometheus metrics server.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

fn default_metrics_port() -> u16 {
    8878
}

/// A raw representation of the config file before validation.
#[derive(Deserialize)]
struct RawConfig {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default = "default_log_level")]
    log_level: String,
    #[serde(default = "default_max_agents")]
    max_agents: usize,
    #[serde(default = "default_max_clients")]
    max_clients: usize,
    #[serde(default = "default_reaper_interval_secs")]
    reaper_interval_secs: u64,
    #[serde(default)]
    metrics: MetricsConfig,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    1234
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_max_agents() -> usize {
    1000
}
fn default_max_clients() -> usize {
    1000
}
fn default_reaper_interval_secs() -> u64 {
    20
}

/// The final, validated broker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub max_agents: usize,
    pub max_clients: usize,
    pub reaper_interval_secs: u64,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            max_agents: default_max_agents(),
            max_clients: default_max_clients(),
            reaper_interval_secs: default_reaper_interval_secs(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Config {
    /// Creates a new `Config` by reading and parsing a TOML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at '{path}'"))?;
        let raw: RawConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse TOML from '{path}'"))?;

        let config = Config {
            host: raw.host,
            port: raw.port,
            log_level: raw.log_level,
            max_agents: raw.max_agents,
            max_clients: raw.max_clients,
            reaper_interval_secs: raw.reaper_interval_secs,
            metrics: raw.metrics,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates the resolved configuration for logical consistency.
    fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(anyhow!("port cannot be 0"));
        }
        if self.host.trim().is_empty() {
            return Err(anyhow!("host cannot be empty"));
        }
        if self.max_agents == 0 {
            return Err(anyhow!("max_agents cannot be 0"));
        }
        if self.max_clients == 0 {
            return Err(anyhow!("max_clients cannot be 0"));
        }
        if self.reaper_interval_secs == 0 {
            return Err(anyhow!("reaper_interval_secs cannot be 0"));
        }
        if self.metrics.enabled {
            if self.metrics.port == 0 {
                return Err(anyhow!("metrics.port cannot be 0"));
            }
            if self.metrics.port == self.port {
                return Err(anyhow!(
                    "metrics.port cannot be the same as the main broker port"
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_validate_cleanly() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn from_file_parses_a_minimal_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "port = 1234\nmax_agents = 10\nmax_clients = 10").unwrap();
        let config = Config::from_file(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.port, 1234);
        assert_eq!(config.reaper_interval_secs, 20);
    }

    #[test]
    fn rejects_metrics_port_colliding_with_broker_port() {
        let mut config = Config::default();
        config.metrics.enabled = true;
        config.metrics.port = config.port;
        assert!(config.validate().is_err());
    }
}

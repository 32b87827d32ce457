// src/config.rs

//! Server configuration: loading, resolving, and validation.
//!
//! Follows the teacher's `RawConfig` (deserialize-only, with serde defaults)
//! → `Config` (resolved, validated) split, trimmed to the fields this crate
//! actually has (see `SPEC_FULL.md` §10).

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    7878
}
fn default_data_dir() -> String {
    "bitserver_data".to_string()
}
fn default_max_file_size() -> u64 {
    64 * 1024 * 1024
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_client_idle_timeout_secs() -> u64 {
    2000
}
fn default_replication_tick_ms() -> u64 {
    1000
}
fn default_bsync_send_timeout_secs() -> u64 {
    5
}
fn default_master_dial_timeout_ms() -> u64 {
    1000
}
fn default_migration_connect_timeout_ms() -> u64 {
    1000
}
fn default_migration_pool_idle_secs() -> u64 {
    10
}

/// A raw representation of the config file before validation/resolution.
#[derive(Deserialize, Debug, Clone)]
struct RawConfig {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default = "default_data_dir")]
    data_dir: String,
    #[serde(default = "default_max_file_size")]
    max_file_size: u64,
    #[serde(default = "default_log_level")]
    log_level: String,
    #[serde(default = "default_client_idle_timeout_secs")]
    client_idle_timeout_secs: u64,
    #[serde(default = "default_replication_tick_ms")]
    replication_tick_ms: u64,
    #[serde(default = "default_bsync_send_timeout_secs")]
    bsync_send_timeout_secs: u64,
    #[serde(default = "default_master_dial_timeout_ms")]
    master_dial_timeout_ms: u64,
    #[serde(default = "default_migration_connect_timeout_ms")]
    migration_connect_timeout_ms: u64,
    #[serde(default = "default_migration_pool_idle_secs")]
    migration_pool_idle_secs: u64,
    /// Optional `host:port` of an upstream master to replicate from at
    /// startup, applied once the listener is bound (`DESIGN.md`'s Open
    /// Question on initial replication role).
    #[serde(default)]
    slaveof: Option<String>,
}

/// The final, validated, and resolved server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub data_dir: String,
    pub max_file_size: u64,
    pub log_level: String,
    pub client_idle_timeout_secs: u64,
    pub replication_tick_ms: u64,
    pub bsync_send_timeout_secs: u64,
    pub master_dial_timeout_ms: u64,
    pub migration_connect_timeout_ms: u64,
    pub migration_pool_idle_secs: u64,
    pub slaveof: Option<(String, u16)>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            data_dir: default_data_dir(),
            max_file_size: default_max_file_size(),
            log_level: default_log_level(),
            client_idle_timeout_secs: default_client_idle_timeout_secs(),
            replication_tick_ms: default_replication_tick_ms(),
            bsync_send_timeout_secs: default_bsync_send_timeout_secs(),
            master_dial_timeout_ms: default_master_dial_timeout_ms(),
            migration_connect_timeout_ms: default_migration_connect_timeout_ms(),
            migration_pool_idle_secs: default_migration_pool_idle_secs(),
            slaveof: None,
        }
    }
}

fn parse_slaveof(raw: &str) -> Result<(String, u16)> {
    let (host, port) = raw
        .rsplit_once(':')
        .ok_or_else(|| anyhow!("slaveof must be of the form 'host:port', got '{raw}'"))?;
    let port: u16 = port
        .parse()
        .with_context(|| format!("invalid port in slaveof '{raw}'"))?;
    Ok((host.to_string(), port))
}

impl Config {
    /// Loads configuration from a TOML file, falling back to defaults for
    /// any field the file doesn't set.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file at '{path}'"))?;
        Self::from_toml_str(&contents)
    }

    fn from_toml_str(contents: &str) -> Result<Self> {
        let raw: RawConfig =
            toml::from_str(contents).with_context(|| "failed to parse config TOML")?;
        let slaveof = raw.slaveof.as_deref().map(parse_slaveof).transpose()?;

        let config = Config {
            host: raw.host,
            port: raw.port,
            data_dir: raw.data_dir,
            max_file_size: raw.max_file_size,
            log_level: raw.log_level,
            client_idle_timeout_secs: raw.client_idle_timeout_secs,
            replication_tick_ms: raw.replication_tick_ms,
            bsync_send_timeout_secs: raw.bsync_send_timeout_secs,
            master_dial_timeout_ms: raw.master_dial_timeout_ms,
            migration_connect_timeout_ms: raw.migration_connect_timeout_ms,
            migration_pool_idle_secs: raw.migration_pool_idle_secs,
            slaveof,
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
        if self.data_dir.trim().is_empty() {
            return Err(anyhow!("data_dir cannot be empty"));
        }
        if self.max_file_size == 0 {
            return Err(anyhow!("max_file_size cannot be 0"));
        }
        if let Some((_, port)) = &self.slaveof
            && *port == 0
        {
            return Err(anyhow!("slaveof port cannot be 0"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn parses_minimal_toml() {
        let config = Config::from_toml_str("port = 9000\ndata_dir = \"/tmp/x\"\n").unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.data_dir, "/tmp/x");
        assert_eq!(config.host, default_host());
    }

    #[test]
    fn parses_slaveof() {
        let config = Config::from_toml_str("slaveof = \"10.0.0.1:7878\"\n").unwrap();
        assert_eq!(config.slaveof, Some(("10.0.0.1".to_string(), 7878)));
    }

    #[test]
    fn rejects_zero_port() {
        assert!(Config::from_toml_str("port = 0\n").is_err());
    }
}

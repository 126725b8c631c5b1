//! Runtime configuration
//!
//! Configuration is read from a YAML file named by `HIVE_CONFIG` when set,
//! otherwise defaults are used. A couple of environment variables override
//! the listening address for quick local runs.

use anyhow::Context;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub pool: PoolConfig,
}

/// Per-listener tunables shared by the gateway and every member.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface every listener binds to
    pub host: String,

    /// Upper bound on how long the accept loop waits before re-checking
    /// its running flag. Also bounds each socket read.
    pub select_timeout_secs: u64,

    /// Initial capacity of the routing table
    pub route_capacity: usize,

    /// Largest message (headers plus body) buffered for one request
    pub max_message_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            select_timeout_secs: 5,
            route_capacity: 10,
            max_message_size: 10240,
        }
    }
}

impl ServerConfig {
    pub fn select_timeout(&self) -> Duration {
        Duration::from_secs(self.select_timeout_secs)
    }
}

/// How member ports are derived from the gateway port.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortPolicy {
    /// Member `i` listens on `gateway + 1 + i`
    #[default]
    Sequential,
    /// Members listen on OS-assigned ports
    Ephemeral,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub gateway_port: u16,
    pub gateway_resource: String,
    pub members: usize,
    pub port_policy: PortPolicy,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            gateway_port: 8080,
            gateway_resource: "/".to_string(),
            members: 4,
            port_policy: PortPolicy::Sequential,
        }
    }
}

impl Config {
    /// Load configuration from `HIVE_CONFIG` (if set) and apply
    /// `LISTEN_HOST` / `GATEWAY_PORT` overrides.
    pub fn load() -> anyhow::Result<Self> {
        let mut cfg = match std::env::var("HIVE_CONFIG") {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::default(),
        };

        if let Ok(host) = std::env::var("LISTEN_HOST") {
            cfg.server.host = host;
        }
        if let Ok(port) = std::env::var("GATEWAY_PORT") {
            cfg.pool.gateway_port = port
                .parse()
                .with_context(|| format!("invalid GATEWAY_PORT '{}'", port))?;
        }

        Ok(cfg)
    }

    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_yaml(&raw)
    }

    pub fn from_yaml(raw: &str) -> anyhow::Result<Self> {
        serde_yaml::from_str(raw).context("failed to parse YAML config")
    }
}

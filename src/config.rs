//! Configuration management for WIPcoin

use crate::error::ChainError;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub node: NodeConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub miner: MinerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    /// Distinguishes snapshot files of nodes sharing a data directory.
    #[serde(default = "default_node_id")]
    pub id: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self { id: default_node_id() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_api_port")]
    pub api_port: u16,
    #[serde(default)]
    pub peers: Vec<String>,
    #[serde(default = "default_peer_timeout_ms")]
    pub peer_timeout_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            api_port: default_api_port(),
            peers: Vec::new(),
            peer_timeout_ms: default_peer_timeout_ms(),
        }
    }
}

impl NetworkConfig {
    pub fn peer_timeout(&self) -> Duration {
        Duration::from_millis(self.peer_timeout_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Sqlite,
    Json,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_backend")]
    pub backend: StorageBackend,
    #[serde(default = "default_data_dir")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            path: default_data_dir(),
        }
    }
}

impl DatabaseConfig {
    pub fn snapshot_path(&self, node_id: &str) -> PathBuf {
        let extension = match self.backend {
            StorageBackend::Sqlite => "db",
            StorageBackend::Json | StorageBackend::Memory => "txt",
        };
        Path::new(&self.path).join(format!("blockchain-{}.{}", node_id, extension))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MinerConfig {
    /// Hex secp256k1 secret key. Without one the node cannot mine or sign.
    #[serde(default)]
    pub secret_key: Option<String>,
}

/// Loads `path`, falling back to defaults when the file is absent.
pub fn load_config(path: &Path) -> Result<Config, ChainError> {
    let config: Config = if path.exists() {
        let config_str = fs::read_to_string(path)?;
        toml::from_str(&config_str)?
    } else {
        tracing::info!(path = %path.display(), "config file not found, using defaults");
        Config::default()
    };

    config.validate()?;
    Ok(config)
}

impl Config {
    pub fn validate(&self) -> Result<(), ChainError> {
        if self.network.api_port == 0 {
            return Err(ChainError::ConfigError("network.api_port must be non-zero".to_string()));
        }
        if self.network.peer_timeout_ms == 0 {
            return Err(ChainError::ConfigError(
                "network.peer_timeout_ms must be positive".to_string(),
            ));
        }
        if self.database.backend != StorageBackend::Memory && self.database.path.is_empty() {
            return Err(ChainError::ConfigError("database.path must be set".to_string()));
        }
        Ok(())
    }
}

fn default_node_id() -> String {
    "5000".to_string()
}

fn default_api_port() -> u16 {
    5000
}

fn default_peer_timeout_ms() -> u64 {
    3000
}

fn default_backend() -> StorageBackend {
    StorageBackend::Sqlite
}

fn default_data_dir() -> String {
    "./data".to_string()
}

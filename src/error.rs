//! Error types for WIPcoin

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ChainError {
    #[error("Rejected record: {0}")]
    RejectedRecord(String),
    #[error("Invalid block: {0}")]
    InvalidBlock(String),
    #[error("Invalid block linkage")]
    InvalidBlockLinkage,
    #[error("Invalid proof of work")]
    InvalidProofOfWork,
    #[error("Stale block: the chain advanced while the proof was being searched")]
    StaleBlock,
    #[error("Node has no identity to receive the mining reward")]
    MissingIdentity,
    #[error("Mining error: {0}")]
    MiningError(String),
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Cryptographic error: {0}")]
    CryptoError(String),
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Config error: {0}")]
    ConfigError(String),
    #[error("IO error: {0}")]
    IoError(String),
}

impl From<std::io::Error> for ChainError {
    fn from(err: std::io::Error) -> Self {
        ChainError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for ChainError {
    fn from(err: serde_json::Error) -> Self {
        ChainError::SerializationError(err.to_string())
    }
}

impl From<rusqlite::Error> for ChainError {
    fn from(err: rusqlite::Error) -> Self {
        ChainError::DatabaseError(err.to_string())
    }
}

impl From<reqwest::Error> for ChainError {
    fn from(err: reqwest::Error) -> Self {
        ChainError::NetworkError(err.to_string())
    }
}

impl From<toml::de::Error> for ChainError {
    fn from(err: toml::de::Error) -> Self {
        ChainError::ConfigError(err.to_string())
    }
}

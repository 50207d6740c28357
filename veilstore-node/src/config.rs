//! Configuration management for a Veilstore peer
//!
//! Supports loading from TOML files with per-field defaults; every
//! externally injected parameter (block size, sub-chunk size, key size,
//! retry counts, capacities, timeouts) lives here rather than in the
//! core crates.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use veilstore_network::TransportConfig;
use veilstore_store::StoreConfig;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Complete peer configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Node identity and listener address
    #[serde(default)]
    pub node: NodeIdentity,

    /// Share store settings
    #[serde(default)]
    pub storage: StorageSettings,

    /// Transport settings
    #[serde(default)]
    pub network: NetworkSettings,

    /// Keypair settings
    #[serde(default)]
    pub crypto: CryptoSettings,

    /// Upload/download workflow settings
    #[serde(default)]
    pub transfer: TransferSettings,

    /// Bootstrap peers merged into the directory at startup
    #[serde(default)]
    pub peers: Vec<BootstrapPeer>,
}

/// Node identity configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeIdentity {
    /// Unique peer identifier
    #[serde(default = "default_peer_id")]
    pub peer_id: String,
    /// Listener host
    #[serde(default = "default_host")]
    pub host: String,
    /// Listener port (0 picks an ephemeral port)
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for NodeIdentity {
    fn default() -> Self {
        Self {
            peer_id: default_peer_id(),
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Share store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Maximum number of shares held for other peers
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// Share block size in bytes
    #[serde(default = "default_block_size")]
    pub block_size: usize,
    /// Private-lookup sub-chunk size in bytes
    #[serde(default = "default_sub_chunk_size")]
    pub sub_chunk_size: usize,
    /// Whether uploads are accepted at startup
    #[serde(default = "default_true")]
    pub uploads_enabled: bool,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            block_size: default_block_size(),
            sub_chunk_size: default_sub_chunk_size(),
            uploads_enabled: true,
        }
    }
}

/// Transport settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkSettings {
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    #[serde(default = "default_max_frame_length")]
    pub max_frame_length: usize,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    #[serde(default = "default_upload_retries")]
    pub upload_retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_drain_timeout_ms")]
    pub drain_timeout_ms: u64,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            read_timeout_ms: default_read_timeout_ms(),
            max_frame_length: default_max_frame_length(),
            max_connections: default_max_connections(),
            upload_retries: default_upload_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            drain_timeout_ms: default_drain_timeout_ms(),
        }
    }
}

/// Keypair settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CryptoSettings {
    /// Paillier modulus size in bits
    #[serde(default = "default_key_bits")]
    pub key_bits: u64,
}

impl Default for CryptoSettings {
    fn default() -> Self {
        Self {
            key_bits: default_key_bits(),
        }
    }
}

/// Upload/download workflow settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferSettings {
    /// Share count as a multiple of the file's block count
    #[serde(default = "default_share_factor")]
    pub share_factor: f64,
    /// Require this many times `n` peers before uploading
    #[serde(default = "default_safety_margin")]
    pub safety_margin: usize,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            share_factor: default_share_factor(),
            safety_margin: default_safety_margin(),
        }
    }
}

/// A statically configured peer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapPeer {
    pub peer_id: String,
    pub host: String,
    pub port: u16,
}

impl NodeConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: NodeConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with fallback to defaults
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(error = %e, "failed to load config, using defaults");
                Self::default()
            }
        }
    }

    /// Check cross-field invariants
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.node.peer_id.is_empty() {
            return Err(ConfigError::ValidationError(
                "node.peer_id must not be empty".to_string(),
            ));
        }
        if self.storage.block_size == 0 || self.storage.sub_chunk_size == 0 {
            return Err(ConfigError::ValidationError(
                "storage.block_size and storage.sub_chunk_size must be > 0".to_string(),
            ));
        }
        if self.storage.block_size % self.storage.sub_chunk_size != 0 {
            return Err(ConfigError::ValidationError(format!(
                "storage.sub_chunk_size ({}) must divide storage.block_size ({})",
                self.storage.sub_chunk_size, self.storage.block_size
            )));
        }
        // A sub-chunk's integer value must stay below the Paillier modulus
        if (self.storage.sub_chunk_size as u64) * 8 >= self.crypto.key_bits {
            return Err(ConfigError::ValidationError(format!(
                "storage.sub_chunk_size ({} bytes) too large for a {}-bit key",
                self.storage.sub_chunk_size, self.crypto.key_bits
            )));
        }
        if self.transfer.share_factor <= 0.0 {
            return Err(ConfigError::ValidationError(
                "transfer.share_factor must be > 0".to_string(),
            ));
        }
        if self.transfer.safety_margin == 0 {
            return Err(ConfigError::ValidationError(
                "transfer.safety_margin must be >= 1".to_string(),
            ));
        }
        Ok(())
    }

    /// The listener bind address
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.node.host, self.node.port)
    }

    /// Derive the store configuration
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            capacity: self.storage.capacity,
            block_size: self.storage.block_size,
            sub_chunk_size: self.storage.sub_chunk_size,
            uploads_enabled: self.storage.uploads_enabled,
        }
    }

    /// Derive the transport configuration
    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            connect_timeout: Duration::from_millis(self.network.connect_timeout_ms),
            read_timeout: Duration::from_millis(self.network.read_timeout_ms),
            max_frame_length: self.network.max_frame_length,
            max_connections: self.network.max_connections,
            upload_retries: self.network.upload_retries,
            retry_backoff: Duration::from_millis(self.network.retry_backoff_ms),
            drain_timeout: Duration::from_millis(self.network.drain_timeout_ms),
            block_size: self.storage.block_size,
            sub_chunk_size: self.storage.sub_chunk_size,
        }
    }
}

fn default_peer_id() -> String {
    "local-node".to_string()
}
fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    5000
}
fn default_capacity() -> usize {
    1000
}
fn default_block_size() -> usize {
    veilstore_core::DEFAULT_BLOCK_SIZE
}
fn default_sub_chunk_size() -> usize {
    veilstore_core::DEFAULT_SUB_CHUNK_SIZE
}
fn default_true() -> bool {
    true
}
fn default_connect_timeout_ms() -> u64 {
    5_000
}
fn default_read_timeout_ms() -> u64 {
    10_000
}
fn default_max_frame_length() -> usize {
    32 * 1024 * 1024
}
fn default_max_connections() -> usize {
    64
}
fn default_upload_retries() -> u32 {
    veilstore_network::MAX_UPLOAD_TRIES
}
fn default_retry_backoff_ms() -> u64 {
    100
}
fn default_drain_timeout_ms() -> u64 {
    5_000
}
fn default_key_bits() -> u64 {
    veilstore_core::DEFAULT_KEY_BITS
}
fn default_share_factor() -> f64 {
    2.0
}
fn default_safety_margin() -> usize {
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        NodeConfig::default().validate().unwrap();
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: NodeConfig = toml::from_str(
            r#"
            [node]
            peer_id = "alpha"
            port = 7100

            [storage]
            capacity = 42

            [[peers]]
            peer_id = "beta"
            host = "10.0.0.2"
            port = 7101
            "#,
        )
        .unwrap();
        config.validate().unwrap();

        assert_eq!(config.node.peer_id, "alpha");
        assert_eq!(config.node.host, "127.0.0.1");
        assert_eq!(config.storage.capacity, 42);
        assert_eq!(config.storage.block_size, veilstore_core::DEFAULT_BLOCK_SIZE);
        assert_eq!(config.peers.len(), 1);
        assert_eq!(config.listen_address(), "127.0.0.1:7100");
    }

    #[test]
    fn test_invalid_sub_chunk_rejected() {
        let mut config = NodeConfig::default();
        config.storage.sub_chunk_size = 100; // does not divide 1024
        assert!(config.validate().is_err());

        config.storage.sub_chunk_size = 512;
        config.crypto.key_bits = 2048; // 512 * 8 >= 2048
        assert!(config.validate().is_err());
    }
}

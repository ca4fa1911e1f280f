use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::block::BlockSize;
use crate::error::{CiphError, CiphResult};

/// Top-level configuration (loaded from ciph.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CiphConfig {
    pub storage: StorageConfig,
    pub publish: PublishConfig,
    pub logging: LoggingConfig,
}

impl CiphConfig {
    /// Load from a TOML file, falling back to defaults if it does not exist.
    pub fn load(path: &Path) -> CiphResult<Self> {
        if !path.exists() {
            tracing::warn!(
                "config file not found: {}  (using defaults)",
                path.display()
            );
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
            .map_err(|e| CiphError::Config(format!("parsing config {}: {e}", path.display())))
    }

    pub fn from_toml(content: &str) -> CiphResult<Self> {
        toml::from_str(content).map_err(|e| CiphError::Config(e.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// In-process store (tests, local experiments)
    Memory,
    /// Any S3-compatible endpoint
    S3,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// S3 endpoint
    pub endpoint: String,
    /// S3 region (default: us-east-1)
    pub region: String,
    /// Bucket holding the block namespace
    pub bucket: String,
    /// Key prefix under which blocks are stored
    pub root: String,
    /// Attempts per block request before the error is surfaced
    pub max_retries: usize,
    /// Refuse plaintext HTTP endpoints
    pub enforce_tls: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            endpoint: "http://localhost:8333".into(),
            region: "us-east-1".into(),
            bucket: "ciph".into(),
            root: "/".into(),
            max_retries: 3,
            enforce_tls: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    /// Base URL for web links (`<api_url>/enter#<link>`)
    pub api_url: String,
    /// Maximum number of data blocks published concurrently
    pub fan_out: usize,
    /// Block size at which untargeted data is flushed mid-ingest
    pub flush_threshold: BlockSize,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            api_url: "https://ciph.io".into(),
            fan_out: 4,
            flush_threshold: BlockSize::MAX,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (default: info)
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: LogFormat::Text,
        }
    }
}

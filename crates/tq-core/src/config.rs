//! # Configuration
//!
//! Deserialized from TOML. Every key has a default, so a missing file or a
//! partial file is valid. Components receive the section they need at
//! construction time; nothing here is global.

use crate::error::{Result, TrafficError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub search: SearchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub credentials: Option<Credentials>,
    #[serde(default)]
    pub database: u32,
    #[serde(default = "default_index_name", alias = "indexName")]
    pub index_name: String,
    /// Key prefix for record hashes and lookup sets.
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub username: Option<String>,
    pub password: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            credentials: None,
            database: 0,
            index_name: default_index_name(),
            prefix: default_prefix(),
        }
    }
}

impl StoreConfig {
    /// Connection URL in the `redis://[user:pass@]host:port/db` form.
    pub fn connection_url(&self) -> String {
        let auth = match &self.credentials {
            Some(Credentials {
                username: Some(user),
                password,
            }) => format!("{}:{}@", user, password),
            Some(Credentials {
                username: None,
                password,
            }) => format!(":{}@", password),
            None => String::new(),
        };
        format!(
            "redis://{}{}:{}/{}",
            auth, self.host, self.port, self.database
        )
    }
}

/// What the bulk indexer does with a row that fails to parse.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseErrorPolicy {
    /// Count the row as skipped and continue with the chunk.
    #[default]
    Skip,
    /// Stop the job at the first bad row.
    Abort,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    #[serde(default = "default_chunk_size", alias = "chunkSize")]
    pub chunk_size: usize,
    /// Record count under the prefix at or above which chunks are skipped.
    #[serde(default = "default_ceiling")]
    pub ceiling: u64,
    #[serde(default)]
    pub on_parse_error: ParseErrorPolicy,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            ceiling: default_ceiling(),
            on_parse_error: ParseErrorPolicy::Skip,
        }
    }
}

/// Interchangeable store backends, selected per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverKind {
    /// Low-level blocking client, one connection per call.
    Sync,
    /// Multiplexed async connection manager.
    Pooled,
    /// In-process store.
    Memory,
}

impl DriverKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DriverKind::Sync => "sync",
            DriverKind::Pooled => "pooled",
            DriverKind::Memory => "memory",
        }
    }
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DriverKind {
    type Err = TrafficError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sync" => Ok(DriverKind::Sync),
            "pooled" => Ok(DriverKind::Pooled),
            "memory" => Ok(DriverKind::Memory),
            other => Err(TrafficError::Config(format!("unknown driver '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    /// Mirror of the store's maximum result window.
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_driver")]
    pub default_driver: DriverKind,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            max_results: default_max_results(),
            default_driver: default_driver(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    6379
}
fn default_index_name() -> String {
    "traffic-idx".into()
}
fn default_prefix() -> String {
    "traffic".into()
}
fn default_chunk_size() -> usize {
    1000
}
fn default_ceiling() -> u64 {
    1_000_000
}
fn default_limit() -> usize {
    10
}
fn default_max_results() -> usize {
    10_000
}
fn default_driver() -> DriverKind {
    DriverKind::Pooled
}

impl Config {
    /// Load from a TOML file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content).map_err(TrafficError::config)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.ingest.chunk_size == 0 {
            return Err(TrafficError::Config("ingest.chunk_size must be > 0".into()));
        }
        if self.store.port == 0 {
            return Err(TrafficError::Config("store.port must be > 0".into()));
        }
        if self.store.index_name.trim().is_empty() {
            return Err(TrafficError::Config("store.index_name is empty".into()));
        }
        if self.store.prefix.trim().is_empty() {
            return Err(TrafficError::Config("store.prefix is empty".into()));
        }
        Ok(())
    }
}

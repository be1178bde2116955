use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use k256::ecdsa::SigningKey;
use serde::Deserialize;
use thiserror::Error;

use crate::codec::{signing_key_from_hex, Enode};
use crate::domain::{DiscoveryConfig, NodeAddress};
use crate::ports::ConfigProvider;

// ============================================================================
// ConfigError
// ============================================================================

/// Errors that can occur while loading configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {error}")]
    Io { path: String, error: String },
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("invalid bootnode {url}: {reason}")]
    Bootnode { url: String, reason: String },
    #[error("invalid private key")]
    PrivateKey,
}

// ============================================================================
// NodeSettings - host-level settings file
// ============================================================================

/// Host settings: where to listen, what to advertise and whom to ask first.
///
/// # Config File Format
///
/// ```toml
/// listen_addr = "0.0.0.0:30303"
/// external_ip = "203.0.113.7"
/// tcp_port = 30303
/// private_key = "<64 hex chars>"   # optional, random when absent
/// node_db_path = "nodes.json"      # optional
/// bootnodes = [
///     "enode://<128 hex chars>@198.51.100.1:30303",
/// ]
///
/// [discovery]
/// bucket_size = 16
/// ping_timeout_ms = 1000
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct NodeSettings {
    pub listen_addr: SocketAddr,
    /// Advertised IP. Falls back to the listen IP.
    pub external_ip: Option<IpAddr>,
    /// Advertised TCP port. Falls back to the listen port.
    pub tcp_port: Option<u16>,
    pub private_key: Option<String>,
    pub bootnodes: Vec<String>,
    pub node_db_path: Option<PathBuf>,
    pub discovery: DiscoveryConfig,
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 30303),
            external_ip: None,
            tcp_port: None,
            private_key: None,
            bootnodes: Vec::new(),
            node_db_path: None,
            discovery: DiscoveryConfig::default(),
        }
    }
}

impl NodeSettings {
    /// Endpoint put into our pings and node record.
    pub fn advertised_address(&self) -> NodeAddress {
        let port = self.listen_addr.port();
        NodeAddress::new(
            self.external_ip.unwrap_or(self.listen_addr.ip()),
            port,
            self.tcp_port.unwrap_or(port),
        )
    }

    /// The configured identity key. `None` means a fresh key per run.
    pub fn signing_key(&self) -> Result<Option<SigningKey>, ConfigError> {
        match &self.private_key {
            None => Ok(None),
            Some(hex) => signing_key_from_hex(hex)
                .map(Some)
                .ok_or(ConfigError::PrivateKey),
        }
    }

    pub fn parsed_bootnodes(&self) -> Result<Vec<Enode>, ConfigError> {
        self.bootnodes
            .iter()
            .map(|url| {
                url.parse::<Enode>().map_err(|err| ConfigError::Bootnode {
                    url: url.clone(),
                    reason: err.to_string(),
                })
            })
            .collect()
    }
}

// ============================================================================
// StaticConfigProvider - Hardcoded config for testing/development
// ============================================================================

/// Configuration held in memory.
///
/// Useful for tests and embedding. For files, use `TomlConfigProvider`.
#[derive(Debug, Clone, Default)]
pub struct StaticConfigProvider {
    bootnodes: Vec<Enode>,
    config: DiscoveryConfig,
}

impl StaticConfigProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_bootnodes(mut self, bootnodes: Vec<Enode>) -> Self {
        self.bootnodes = bootnodes;
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: DiscoveryConfig) -> Self {
        self.config = config;
        self
    }
}

impl ConfigProvider for StaticConfigProvider {
    fn bootnodes(&self) -> Vec<Enode> {
        self.bootnodes.clone()
    }

    fn discovery_config(&self) -> DiscoveryConfig {
        self.config.clone()
    }
}

// ============================================================================
// TomlConfigProvider - settings file loading
// ============================================================================

/// Settings loaded from a TOML file or string.
///
/// Bootnode URLs are validated at load time; one bad URL fails the load.
#[derive(Debug, Clone)]
pub struct TomlConfigProvider {
    settings: NodeSettings,
    bootnodes: Vec<Enode>,
}

impl TomlConfigProvider {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            error: e.to_string(),
        })?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let settings: NodeSettings =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Self::from_settings(settings)
    }

    pub fn from_settings(settings: NodeSettings) -> Result<Self, ConfigError> {
        let bootnodes = settings.parsed_bootnodes()?;
        Ok(Self {
            settings,
            bootnodes,
        })
    }

    pub fn settings(&self) -> &NodeSettings {
        &self.settings
    }

    pub fn into_settings(self) -> NodeSettings {
        self.settings
    }
}

impl ConfigProvider for TomlConfigProvider {
    fn bootnodes(&self) -> Vec<Enode> {
        self.bootnodes.clone()
    }

    fn discovery_config(&self) -> DiscoveryConfig {
        self.settings.discovery.clone()
    }
}

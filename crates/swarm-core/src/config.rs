//! Configuration for swarmd.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $SWARMD_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/swarmd/config.toml
//!   3. ~/.config/swarmd/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::node::Node;

pub const DEFAULT_PORT: u16 = 51234;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SwarmConfig {
    pub network: NetworkConfig,
    pub security: SecurityConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address the UDP socket binds to.
    pub listen_address: String,
    /// UDP port for all swarm traffic.
    pub local_port: u16,
    /// Address peers should reach this node at. Empty = use the outbound IP.
    pub advertise_address: String,
    /// Node to send connection requests to. Empty = wait to be contacted.
    pub bootstrap_host: String,
    pub bootstrap_port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Every node in a swarm must share this passphrase.
    pub passphrase: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Holds the `share` and `parts` directories.
    pub base_path: PathBuf,
    /// Suffix the base path with the local port so several nodes can run
    /// on one machine.
    pub debug: bool,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_address: "0.0.0.0".into(),
            local_port: DEFAULT_PORT,
            advertise_address: String::new(),
            bootstrap_host: String::new(),
            bootstrap_port: DEFAULT_PORT,
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            passphrase: "swarm".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_path: data_dir(),
            debug: false,
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("swarmd")
}

fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".local").join("share"))
        .join("swarmd")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl SwarmConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            Self::from_file(&path)?
        } else {
            SwarmConfig::default()
        };
        config.apply_env_overrides(|name| std::env::var(name).ok());
        Ok(config)
    }

    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
        toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("SWARMD_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&SwarmConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply SWARMD_* overrides. `lookup` is `std::env::var` in production.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("SWARMD_NETWORK__LISTEN_ADDRESS") {
            self.network.listen_address = v;
        }
        if let Some(p) = lookup("SWARMD_NETWORK__LOCAL_PORT").and_then(|v| v.parse().ok()) {
            self.network.local_port = p;
        }
        if let Some(v) = lookup("SWARMD_NETWORK__ADVERTISE_ADDRESS") {
            self.network.advertise_address = v;
        }
        if let Some(v) = lookup("SWARMD_NETWORK__BOOTSTRAP_HOST") {
            self.network.bootstrap_host = v;
        }
        if let Some(p) = lookup("SWARMD_NETWORK__BOOTSTRAP_PORT").and_then(|v| v.parse().ok()) {
            self.network.bootstrap_port = p;
        }
        if let Some(v) = lookup("SWARMD_SECURITY__PASSPHRASE") {
            self.security.passphrase = v;
        }
        if let Some(v) = lookup("SWARMD_DEBUG") {
            self.storage.debug = v == "true" || v == "1";
        }
    }

    // ── Derived values ────────────────────────────────────────────────────────

    /// Base storage directory, port-suffixed in debug mode.
    pub fn base_dir(&self) -> PathBuf {
        if self.storage.debug {
            let mut name = self.storage.base_path.clone().into_os_string();
            name.push(format!("-{}", self.network.local_port));
            PathBuf::from(name)
        } else {
            self.storage.base_path.clone()
        }
    }

    /// Files offered to the swarm. Scanned recursively for the manifest.
    pub fn share_dir(&self) -> PathBuf {
        self.base_dir().join("share")
    }

    /// Transient per-file part directories.
    pub fn parts_dir(&self) -> PathBuf {
        self.base_dir().join("parts")
    }

    pub fn bootstrap_node(&self) -> Option<Node> {
        if self.network.bootstrap_host.is_empty() {
            return None;
        }
        Some(Node::new(
            self.network.bootstrap_host.clone(),
            self.network.bootstrap_port,
        ))
    }
}

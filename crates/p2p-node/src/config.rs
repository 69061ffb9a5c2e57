// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Node configuration.

use p2p_core::config::{DEFAULT_BROADCAST_PORT, DEFAULT_DOWNLOAD_DIR};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Node configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Display name advertised in heartbeats (default: node_<ip-octet>_<port>)
    #[serde(default)]
    pub name: Option<String>,

    /// TCP port this node listens on for incoming transfers. `None` means
    /// "pick the first free port starting at 12000"; an explicit value
    /// pins the port and fails fast if it's already taken.
    #[serde(default)]
    pub port: Option<u16>,

    /// UDP port the discovery plane broadcasts and listens on
    #[serde(default = "default_broadcast_port")]
    pub broadcast_port: u16,

    /// Directory received files are written to
    #[serde(default = "default_download_dir")]
    pub download_dir: String,

    /// Auto-accept every inbound file offer without prompting
    #[serde(default)]
    pub auto_accept: bool,
}

fn default_broadcast_port() -> u16 {
    DEFAULT_BROADCAST_PORT
}

fn default_download_dir() -> String {
    DEFAULT_DOWNLOAD_DIR.to_string()
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            name: None,
            port: None,
            broadcast_port: default_broadcast_port(),
            download_dir: default_download_dir(),
            auto_accept: false,
        }
    }
}

impl NodeConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;

        serde_json::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Save configuration to a JSON file.
    pub fn to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == Some(0) {
            return Err(ConfigError::InvalidValue("port cannot be 0".into()));
        }
        if self.broadcast_port == 0 {
            return Err(ConfigError::InvalidValue("broadcast_port cannot be 0".into()));
        }
        if self.port == Some(self.broadcast_port) {
            return Err(ConfigError::InvalidValue(
                "port and broadcast_port must differ".into(),
            ));
        }
        if self.download_dir.trim().is_empty() {
            return Err(ConfigError::InvalidValue("download_dir cannot be empty".into()));
        }
        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                return Err(ConfigError::InvalidValue("name cannot be blank".into()));
            }
        }
        Ok(())
    }
}

/// Configuration error types.
#[derive(Debug, Clone)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IoError(s) => write!(f, "I/O error: {}", s),
            Self::ParseError(s) => write!(f, "Parse error: {}", s),
            Self::SerializeError(s) => write!(f, "Serialize error: {}", s),
            Self::InvalidValue(s) => write!(f, "Invalid value: {}", s),
        }
    }
}

impl std::error::Error for ConfigError {}

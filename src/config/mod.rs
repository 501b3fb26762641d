// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/cid-relay

//! Configuration module

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

use crate::admission::AdmissionConfig;
use crate::core::HistoryConfig;
use crate::protocol::{CidRules, CODE_RANGE, MAX_ACCOUNT};
use crate::relay::RelayConfig;
use crate::server::ServerConfig;

/// Settings rejected by [`Config::validate`]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A size or capacity is zero
    #[error("{0} must be greater than zero")]
    ZeroCapacity(&'static str),

    /// `min_device_id` is above `max_device_id`
    #[error("device id range {min}..={max} is empty")]
    EmptyIdRange {
        /// Configured `min_device_id`
        min: u32,
        /// Configured `max_device_id`
        max: u32,
    },

    /// No frame prefix configured
    #[error("rules.required_prefix must not be empty")]
    EmptyPrefix,

    /// A code substitution changes the code width
    #[error("test code mapping '{0}' must map 4-character codes to 4-character codes")]
    BadCodeMapping(String),

    /// Initial reconnect delay above the cap
    #[error("relay.reconnect_initial_ms must not exceed relay.reconnect_max_ms")]
    BackoffOrder,

    /// Rewritten accounts could exceed four digits
    #[error("rules.acc_num_max + rules.acc_num_add = {sum} exceeds the 4-digit account field")]
    AccountOffsetTooLarge {
        /// Largest account the rewrite could produce
        sum: u64,
    },
}

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Application name
    pub app_name: String,

    /// Application version
    pub version: String,

    /// Log level, overridden by `RUST_LOG`
    pub log_level: String,

    /// Period of the stats log line; 0 disables it
    pub stats_interval_secs: u64,

    /// Device listener
    pub server: ServerConfig,

    /// Upstream relay
    pub relay: RelayConfig,

    /// Frame validation and rewrite rules
    pub rules: CidRules,

    /// Admission policy
    pub admission: AdmissionConfig,

    /// History capacities
    pub history: HistoryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_name: "CID Relay".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            log_level: "info".to_string(),
            stats_interval_secs: 60,
            server: ServerConfig::default(),
            relay: RelayConfig::default(),
            rules: CidRules::default(),
            admission: AdmissionConfig::default(),
            history: HistoryConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Load or create default configuration
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            let config = Self::default();

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            config.save(path)?;
            Ok(config)
        }
    }

    /// Get configuration directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("cid-relay"))
            .unwrap_or_else(|| PathBuf::from("./config"))
    }

    /// Get default configuration path
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Reject settings the server cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let capacities = [
            ("history.device_capacity", self.history.device_capacity),
            ("history.global_capacity", self.history.global_capacity),
            ("history.log_capacity", self.history.log_capacity),
            ("admission.max_sessions", self.admission.max_sessions),
            ("admission.max_devices", self.admission.max_devices),
            ("relay.buffer_size", self.relay.buffer_size),
            ("server.max_frame_len", self.server.max_frame_len),
        ];
        if let Some((name, _)) = capacities.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::ZeroCapacity(*name));
        }

        if self.admission.min_device_id > self.admission.max_device_id {
            return Err(ConfigError::EmptyIdRange {
                min: self.admission.min_device_id,
                max: self.admission.max_device_id,
            });
        }

        if self.rules.required_prefix.is_empty() {
            return Err(ConfigError::EmptyPrefix);
        }

        if self.rules.acc_num_min <= self.rules.acc_num_max {
            let sum = u64::from(self.rules.acc_num_max) + u64::from(self.rules.acc_num_add);
            if sum > MAX_ACCOUNT {
                return Err(ConfigError::AccountOffsetTooLarge { sum });
            }
        }

        let width = CODE_RANGE.len();
        if let Some((code, _)) = self
            .rules
            .test_code_map
            .iter()
            .find(|(code, replacement)| code.len() != width || replacement.len() != width)
        {
            return Err(ConfigError::BadCodeMapping(code.clone()));
        }

        if self.relay.reconnect_initial_ms > self.relay.reconnect_max_ms {
            return Err(ConfigError::BackoffOrder);
        }

        Ok(())
    }
}

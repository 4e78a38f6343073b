// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Host configuration, loaded from TOML. Every field has a default so an
// empty or absent file yields a working host.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::listener::ListenerConfig;
use crate::liveness::LivenessConfig;
use crate::naming::{ResourceNames, DEFAULT_CLIENT_LOCK, DEFAULT_PREFIX};

#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("configuration file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("failed to parse configuration: {0}")]
    ParseError(String),

    #[error("configuration validation failed: {0}")]
    ValidationError(String),
}

/// Lowercase in TOML.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_level(self) -> tracing::Level {
        match self {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamesConfig {
    /// Prefix of the region, signal and instance lock names.
    pub prefix: String,
    /// Lock the client holds while alive.
    pub client_lock: String,
}

impl Default for NamesConfig {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            client_lock: DEFAULT_CLIENT_LOCK.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub request_wait_ms: u64,
    pub error_backoff_ms: u64,
    pub client_open_attempts: u32,
    pub client_open_interval_ms: u64,
    pub client_poll_interval_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            request_wait_ms: 100,
            error_backoff_ms: 500,
            client_open_attempts: 100,
            client_open_interval_ms: 250,
            client_poll_interval_ms: 100,
        }
    }
}

/// Top-level `playback_host` configuration.
///
/// ```toml
/// log_level = "debug"
///
/// [names]
/// prefix = "PlaybackHost"
///
/// [timing]
/// client_poll_interval_ms = 50
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    pub log_level: LogLevel,
    pub names: NamesConfig,
    pub timing: TimingConfig,
}

impl HostConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.names.prefix.trim().is_empty() {
            return Err(ConfigError::ValidationError("names.prefix cannot be empty".into()));
        }
        if self.names.client_lock.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "names.client_lock cannot be empty".into(),
            ));
        }
        let t = &self.timing;
        for (field, value) in [
            ("request_wait_ms", t.request_wait_ms),
            ("client_open_interval_ms", t.client_open_interval_ms),
            ("client_poll_interval_ms", t.client_poll_interval_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "timing.{field} must be greater than 0"
                )));
            }
        }
        Ok(())
    }

    pub fn resource_names(&self) -> ResourceNames {
        ResourceNames::from_prefix(&self.names.prefix).with_client_lock(&self.names.client_lock)
    }

    pub fn listener_config(&self) -> ListenerConfig {
        ListenerConfig {
            request_wait: Duration::from_millis(self.timing.request_wait_ms),
            error_backoff: Duration::from_millis(self.timing.error_backoff_ms),
        }
    }

    pub fn liveness_config(&self) -> LivenessConfig {
        LivenessConfig {
            lock_name: self.names.client_lock.clone(),
            open_attempts: self.timing.client_open_attempts,
            open_interval: Duration::from_millis(self.timing.client_open_interval_ms),
            poll_interval: Duration::from_millis(self.timing.client_poll_interval_ms),
        }
    }
}

/// Load any deserializable configuration from a TOML file.
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound(path.to_path_buf())
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}

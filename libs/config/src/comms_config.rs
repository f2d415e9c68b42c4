//! Messaging Configuration Module
//!
//! Loads [`CommsConfig`] from an optional TOML file, then applies
//! environment-variable overrides. Every field has a default, so a service can
//! start with no file at all.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use config_crate::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::defaults;

/// Top-level messaging configuration
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct CommsConfig {
    pub name: String,
    pub log_level: String,
    pub listener: ListenerConfig,
    pub client: ClientConfig,
    pub transport: TransportConfig,
    pub hydrate: HydrateConfig,
}

/// Listening endpoint settings
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    pub bind_address: String,
    /// Close and forget a channel as soon as its transport disconnects
    pub transport_disconnect_removes_channel: bool,
    /// Refuse new clients beyond this many live connections; unset admits all
    pub max_connections: Option<usize>,
}

/// Outbound client channel settings
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    pub remote_address: String,
    pub connect_timeout_ms: u64,
    /// Handed to the reconnect machinery: negative retries forever, zero never
    pub max_reconnect_tries: i32,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct TransportConfig {
    pub max_frame_size: usize,
}

/// Hydration stage worker pool
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct HydrateConfig {
    pub workers: usize,
}

impl Default for CommsConfig {
    fn default() -> Self {
        Self {
            name: defaults::SERVICE_NAME.to_string(),
            log_level: defaults::LOG_LEVEL.to_string(),
            listener: ListenerConfig::default(),
            client: ClientConfig::default(),
            transport: TransportConfig::default(),
            hydrate: HydrateConfig::default(),
        }
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: defaults::BIND_ADDRESS.to_string(),
            transport_disconnect_removes_channel: defaults::TRANSPORT_DISCONNECT_REMOVES_CHANNEL,
            max_connections: None,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            remote_address: defaults::REMOTE_ADDRESS.to_string(),
            connect_timeout_ms: defaults::CONNECT_TIMEOUT_MS,
            max_reconnect_tries: defaults::MAX_RECONNECT_TRIES,
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_frame_size: defaults::MAX_FRAME_SIZE,
        }
    }
}

impl Default for HydrateConfig {
    fn default() -> Self {
        Self {
            workers: defaults::HYDRATE_WORKERS,
        }
    }
}

impl CommsConfig {
    /// Load from an optional file with `COMMS_` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_prefix(path, defaults::ENV_PREFIX)
    }

    /// Load with a custom environment prefix. Nested keys use `__`, so
    /// `<PREFIX>_HYDRATE__WORKERS=8` sets `hydrate.workers`.
    pub fn load_with_prefix(path: Option<&Path>, env_prefix: &str) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            info!("Loading messaging config: {:?}", path);
            builder = builder.add_source(File::from(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(env_prefix)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let mut config: CommsConfig = builder
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.expand_env_vars()?;
        config.validate()?;

        debug!(name = %config.name, bind = %config.listener.bind_address, "Messaging config loaded");
        Ok(config)
    }

    /// Expand `$VAR` references in endpoint strings
    pub fn expand_env_vars(&mut self) -> Result<()> {
        self.listener.bind_address = shellexpand::env(&self.listener.bind_address)
            .context("Failed to expand listener bind address")?
            .to_string();
        self.client.remote_address = shellexpand::env(&self.client.remote_address)
            .context("Failed to expand client remote address")?
            .to_string();
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.hydrate.workers == 0 {
            bail!("hydrate.workers must be at least 1");
        }
        if self.transport.max_frame_size == 0 {
            bail!("transport.max_frame_size must be non-zero");
        }
        if self.listener.max_connections == Some(0) {
            bail!("listener.max_connections must be at least 1 when set");
        }
        self.listener_address()?;
        self.remote_address()?;
        Ok(())
    }

    pub fn listener_address(&self) -> Result<SocketAddr> {
        self.listener
            .bind_address
            .parse()
            .with_context(|| format!("Invalid listener.bind_address {:?}", self.listener.bind_address))
    }

    pub fn remote_address(&self) -> Result<SocketAddr> {
        self.client
            .remote_address
            .parse()
            .with_context(|| format!("Invalid client.remote_address {:?}", self.client.remote_address))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.client.connect_timeout_ms)
    }
}

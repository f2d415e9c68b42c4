//! # Channel Messaging Configuration
//!
//! Typed configuration for services built on the messaging layer: listener and
//! client endpoints, disconnect policy, transport limits and hydration workers.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use comms_config::CommsConfig;
//!
//! // Defaults, overridden by COMMS_* environment variables
//! let config = CommsConfig::load(None).unwrap();
//! let bind = config.listener_address().unwrap();
//! ```

pub mod comms_config;
pub mod defaults;

pub use comms_config::{ClientConfig, CommsConfig, HydrateConfig, ListenerConfig, TransportConfig};

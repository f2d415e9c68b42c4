//! Error Types
//!
//! One enum per layer of the messaging stack:
//!
//! - [`TransportError`]: failures of the byte-stream layer beneath a channel
//! - [`FactoryError`]: message type registration and construction
//! - [`ChannelError`]: lifecycle misuse and send/receive failures on a channel
//! - [`RouteError`]: dispatch of received messages to sinks and stages
//! - [`CommsError`]: top-level wiring

use std::net::SocketAddr;

use codec::ProtocolError;
use thiserror::Error;
use types::{ChannelId, MessageType, RegistryError};

use crate::channel::ChannelLifecycle;

/// Byte-stream transport errors
#[derive(Error, Debug)]
pub enum TransportError {
    /// Network connectivity errors
    #[error("Network error: {message}")]
    Network {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Connection management errors
    #[error("Connection error: {message} (remote: {remote_addr:?})")]
    Connection {
        message: String,
        remote_addr: Option<SocketAddr>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Framing errors below the message header (length prefix, handshake)
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        field: Option<String>,
    },

    /// Transport timeout errors
    #[error("Timeout error: {operation} exceeded {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    /// Generic I/O errors
    #[error("I/O error: {message}")]
    Io {
        message: String,
        source: std::io::Error,
    },
}

/// Result type alias for transport operations
pub type Result<T> = std::result::Result<T, TransportError>;

impl TransportError {
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            source: None,
        }
    }

    pub fn network_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Network {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn connection(message: impl Into<String>, remote_addr: Option<SocketAddr>) -> Self {
        Self::Connection {
            message: message.into(),
            remote_addr,
            source: None,
        }
    }

    pub fn connection_with_source(
        message: impl Into<String>,
        remote_addr: Option<SocketAddr>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connection {
            message: message.into(),
            remote_addr,
            source: Some(Box::new(source)),
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>, field: Option<&str>) -> Self {
        Self::Configuration {
            message: message.into(),
            field: field.map(|s| s.to_string()),
        }
    }

    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Check if retrying on a fresh connection can help
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Network { .. } => true,
            TransportError::Connection { .. } => true,
            TransportError::Timeout { .. } => true,
            TransportError::Io { .. } => true,
            TransportError::Protocol { .. } => false,
            TransportError::Configuration { .. } => false,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            TransportError::Network { .. } => "network",
            TransportError::Connection { .. } => "connection",
            TransportError::Protocol { .. } => "protocol",
            TransportError::Configuration { .. } => "configuration",
            TransportError::Timeout { .. } => "timeout",
            TransportError::Io { .. } => "io",
        }
    }
}

impl From<std::io::Error> for TransportError {
    fn from(error: std::io::Error) -> Self {
        Self::Io {
            message: error.to_string(),
            source: error,
        }
    }
}

/// Message direction a factory strategy serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Outbound,
    Inbound,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Outbound => f.write_str("outbound"),
            Direction::Inbound => f.write_str("inbound"),
        }
    }
}

/// Message factory registration and construction errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FactoryError {
    #[error("{message_type} is already mapped")]
    AlreadyMapped { message_type: MessageType },

    /// A mapping must carry at least one construction strategy
    #[error("{message_type} mapping has neither an outbound nor an inbound constructor")]
    Unmappable { message_type: MessageType },

    #[error("No mapping registered for {message_type}")]
    NoMapping { message_type: MessageType },

    #[error("Unsupported operation: {message_type} cannot be built for {direction} use")]
    UnsupportedOperation {
        message_type: MessageType,
        direction: Direction,
    },
}

/// Channel lifecycle and messaging errors
#[derive(Error, Debug)]
pub enum ChannelError {
    /// Lifecycle misuse, such as opening a channel twice
    #[error("Illegal transition on {channel}: cannot {operation} from {state:?}")]
    IllegalTransition {
        channel: ChannelId,
        operation: &'static str,
        state: ChannelLifecycle,
    },

    #[error("{channel} is not open (state {state:?})")]
    NotOpen {
        channel: ChannelId,
        state: ChannelLifecycle,
    },

    #[error("{channel} is closed")]
    Closed { channel: ChannelId },

    /// Channels survived `close_all_channels`
    #[error("{count} channel(s) still registered after closing all channels")]
    ChannelsRemaining { count: usize },

    #[error(transparent)]
    Factory(#[from] FactoryError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl ChannelError {
    pub fn illegal_transition(
        channel: ChannelId,
        operation: &'static str,
        state: ChannelLifecycle,
    ) -> Self {
        Self::IllegalTransition {
            channel,
            operation,
            state,
        }
    }
}

/// Message dispatch errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouteError {
    /// No route exists for a valid message type
    #[error("Unsupported message type {message_type} received on {channel}")]
    UnsupportedMessageType {
        message_type: MessageType,
        channel: ChannelId,
    },

    /// The stage's workers have shut down
    #[error("Stage {stage} is closed")]
    StageClosed { stage: String },
}

/// Communications manager errors
#[derive(Error, Debug)]
pub enum CommsError {
    #[error("Communications manager is shut down")]
    ShutDown,

    /// The connection policy is full
    #[error("Connection from {peer} refused: {max_connections} connection(s) already admitted")]
    ConnectionRefused {
        peer: SocketAddr,
        max_connections: usize,
    },

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Factory(#[from] FactoryError),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        assert_eq!(TransportError::network("down").category(), "network");
        assert!(TransportError::timeout("connect", 10).is_retryable());
        assert!(!TransportError::protocol("bad prefix").is_retryable());
    }

    #[test]
    fn test_factory_error_messages() {
        let err = FactoryError::UnsupportedOperation {
            message_type: MessageType::Pong,
            direction: Direction::Outbound,
        };
        assert_eq!(
            err.to_string(),
            "Unsupported operation: PONG_MESSAGE cannot be built for outbound use"
        );
    }

    #[test]
    fn test_channel_error_wraps_protocol() {
        let err: ChannelError = ProtocolError::EmptyFrame.into();
        assert!(matches!(err, ChannelError::Protocol(ProtocolError::EmptyFrame)));
    }
}

//! Default values for messaging configuration

/// Environment variable prefix for overrides (`COMMS_LISTENER__BIND_ADDRESS`)
pub const ENV_PREFIX: &str = "COMMS";

pub const SERVICE_NAME: &str = "comms";
pub const LOG_LEVEL: &str = "info";

pub const BIND_ADDRESS: &str = "127.0.0.1:9510";
pub const REMOTE_ADDRESS: &str = "127.0.0.1:9510";

/// Servers usually discard a channel when its transport drops
pub const TRANSPORT_DISCONNECT_REMOVES_CHANNEL: bool = true;

pub const CONNECT_TIMEOUT_MS: u64 = 5_000;

/// Negative means retry forever, zero disables automatic reconnect
pub const MAX_RECONNECT_TRIES: i32 = -1;

/// 16MB
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

pub const HYDRATE_WORKERS: usize = 4;

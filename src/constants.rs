//! Protocol constants and configuration values

/// Default Asterisk HTTP port serving the ARI REST and WebSocket endpoints
pub const DEFAULT_ARI_PORT: u16 = 8088;

/// Maximum number of queued inbound events before the wire adapter is backpressured
pub const MAX_EVENT_QUEUE_SIZE: usize = 1000;

/// Stasis application name used when no configuration is supplied
pub const DEFAULT_APPLICATION: &str = "attendant";

use super::types::{CaptureConfig, ObserverConfig, TransportConfig};

pub const DEFAULT_RELAY_ADDRESS: &str = "ws://127.0.0.1:3927/ws";
pub const DEFAULT_HTTP_RELAY_ADDRESS: &str = "http://127.0.0.1:9527";

pub(super) fn default_enabled() -> bool {
    true
}

pub(super) fn default_relay_address() -> String {
    DEFAULT_RELAY_ADDRESS.to_string()
}

pub(super) fn default_base_delay_ms() -> u64 {
    1000
}

pub(super) fn default_max_delay_ms() -> u64 {
    30_000
}

pub(super) fn default_queue_capacity() -> usize {
    10_000
}

pub(super) fn default_connect_timeout_ms() -> u64 {
    10_000
}

pub(super) fn default_host() -> String {
    "127.0.0.1".to_string()
}

pub(super) fn default_relay_port() -> u16 {
    3927
}

pub(super) fn default_http_port() -> u16 {
    9527
}

pub(super) fn default_channel_capacity() -> usize {
    1024
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            relay_address: default_relay_address(),
            transport: TransportConfig::default(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            queue_capacity: default_queue_capacity(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            relay_port: default_relay_port(),
            http_port: default_http_port(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

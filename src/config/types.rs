use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::defaults::*;

/// Whole configuration file: producer and observer sections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    #[serde(default)]
    pub capture: CaptureConfig,

    #[serde(default)]
    pub observer: ObserverConfig,
}

/// Supplied by the host application when it constructs the SDK.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CaptureConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// `ws://` / `wss://` for the socket relay, `http://` / `https://` for
    /// one POST per envelope.
    #[serde(default = "default_relay_address")]
    pub relay_address: String,

    #[serde(default)]
    pub transport: TransportConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TransportConfig {
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Envelopes kept while the relay is unreachable. Oldest are evicted first.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl TransportConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ObserverConfig {
    #[serde(default = "default_host")]
    pub host: String,

    /// WebSocket relay port
    #[serde(default = "default_relay_port")]
    pub relay_port: u16,

    /// HTTP ingestion port
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Buffered events per named channel before slow subscribers lag
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

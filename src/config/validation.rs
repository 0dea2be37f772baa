use tracing::warn;

use super::defaults::DEFAULT_RELAY_ADDRESS;
use super::types::{CaptureConfig, Config, ObserverConfig, TransportConfig};

/// Repairs out-of-range values in place, warning about each one.
pub trait Validate {
    fn validate(&mut self);
}

impl Validate for TransportConfig {
    fn validate(&mut self) {
        if self.base_delay_ms == 0 {
            warn!("Invalid base_delay_ms: 0. Using default: 1000");
            self.base_delay_ms = 1000;
        }

        if self.max_delay_ms < self.base_delay_ms {
            let repaired = self.base_delay_ms.saturating_mul(30);
            warn!(
                "Invalid max_delay_ms: {} is below base_delay_ms {}. Using {}",
                self.max_delay_ms, self.base_delay_ms, repaired
            );
            self.max_delay_ms = repaired;
        }

        if self.queue_capacity == 0 {
            warn!("Invalid queue_capacity: 0. Using default: 10000");
            self.queue_capacity = 10_000;
        }

        if self.connect_timeout_ms == 0 {
            warn!("Invalid connect_timeout_ms: 0. Using default: 10000");
            self.connect_timeout_ms = 10_000;
        }
    }
}

impl Validate for CaptureConfig {
    fn validate(&mut self) {
        if self.relay_address.trim().is_empty() {
            warn!("Invalid relay_address: empty string. Using default: {}", DEFAULT_RELAY_ADDRESS);
            self.relay_address = DEFAULT_RELAY_ADDRESS.to_string();
        }

        self.transport.validate();
    }
}

impl Validate for ObserverConfig {
    fn validate(&mut self) {
        if self.host.trim().is_empty() {
            warn!("Invalid observer host: empty string. Using default: 127.0.0.1");
            self.host = "127.0.0.1".to_string();
        }

        if self.channel_capacity == 0 {
            warn!("Invalid channel_capacity: 0. Using default: 1024");
            self.channel_capacity = 1024;
        }
    }
}

impl Validate for Config {
    fn validate(&mut self) {
        self.capture.validate();
        self.observer.validate();
    }
}

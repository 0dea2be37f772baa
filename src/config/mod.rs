mod defaults;
mod loader;
mod types;
mod validation;

pub use defaults::{DEFAULT_HTTP_RELAY_ADDRESS, DEFAULT_RELAY_ADDRESS};
pub use loader::ConfigLoader;
pub use types::{CaptureConfig, Config, ObserverConfig, TransportConfig};
pub use validation::Validate;

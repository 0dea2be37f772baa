/// Failures on the relay path. Never surfaced to the instrumented application;
/// the transport logs them and retries.
#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("Connection to relay {address} failed: {reason}")]
    Connect { address: String, reason: String },

    #[error("Connection to relay {address} timed out")]
    ConnectTimeout { address: String },

    #[error("Relay connection closed")]
    Closed,

    #[error("Encoding error: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("HTTP relay error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Failures while building a capture pipeline from configuration.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Invalid relay address '{address}': {reason}")]
    InvalidRelayAddress { address: String, reason: String },

    #[error("Unsupported relay scheme '{scheme}' (expected ws, wss, http or https)")]
    UnsupportedScheme { scheme: String },

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Reasons an incoming relay frame could not be turned into an envelope.
#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    #[error("Malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Binary frames are not part of the relay protocol")]
    BinaryFrame,
}

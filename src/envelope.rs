//! Relay channel frames and the encoder that builds them.
//!
//! One JSON text frame carries exactly one [`Envelope`]. The `type` tag always
//! matches the payload shape because each variant owns its payload type.
//! Encoding never touches timestamps or ids: whatever the interceptor
//! captured is what goes on the wire.

use serde::{Deserialize, Serialize};

use crate::error::DecodeError;
use crate::types::{ConsoleLogRecord, RequestRecord, SocketUpdate};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Envelope {
    /// A new record: a finished outbound call, or a socket in `connecting`.
    #[serde(rename = "network")]
    Network {
        #[serde(alias = "payload")]
        data: RequestRecord,
    },

    #[serde(rename = "console")]
    Console {
        #[serde(alias = "payload")]
        data: ConsoleLogRecord,
    },

    /// Partial update for the socket record with id `ws_id`.
    #[serde(rename = "socket-update", alias = "websocket-update")]
    SocketUpdate {
        ws_id: String,
        #[serde(alias = "payload")]
        data: SocketUpdate,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeKind {
    Network,
    Console,
    SocketUpdate,
}

impl EnvelopeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EnvelopeKind::Network => "network",
            EnvelopeKind::Console => "console",
            EnvelopeKind::SocketUpdate => "socket-update",
        }
    }
}

impl Envelope {
    pub fn network(record: RequestRecord) -> Self {
        Envelope::Network { data: record }
    }

    pub fn console(record: ConsoleLogRecord) -> Self {
        Envelope::Console { data: record }
    }

    pub fn socket_update(ws_id: impl Into<String>, update: SocketUpdate) -> Self {
        Envelope::SocketUpdate {
            ws_id: ws_id.into(),
            data: update,
        }
    }

    pub fn kind(&self) -> EnvelopeKind {
        match self {
            Envelope::Network { .. } => EnvelopeKind::Network,
            Envelope::Console { .. } => EnvelopeKind::Console,
            Envelope::SocketUpdate { .. } => EnvelopeKind::SocketUpdate,
        }
    }

    /// Serialize to one relay text frame
    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse one relay text frame
    pub fn from_frame(frame: &str) -> Result<Self, DecodeError> {
        Ok(serde_json::from_str(frame)?)
    }

    /// Route used by the HTTP deployment variant, relative to the base URL.
    pub fn http_path(&self) -> String {
        match self {
            Envelope::Network { .. } => "/api/network".to_string(),
            Envelope::Console { .. } => "/api/console".to_string(),
            Envelope::SocketUpdate { ws_id, .. } => format!("/api/websocket/{}", ws_id),
        }
    }

    /// Payload alone, as POSTed by the HTTP variant.
    pub fn payload_json(&self) -> Result<String, serde_json::Error> {
        match self {
            Envelope::Network { data } => serde_json::to_string(data),
            Envelope::Console { data } => serde_json::to_string(data),
            Envelope::SocketUpdate { data, .. } => serde_json::to_string(data),
        }
    }
}

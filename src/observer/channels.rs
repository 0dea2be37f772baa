//! Named event channels for renderers.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::envelope::Envelope;
use crate::types::{ConsoleLogRecord, RequestRecord, SocketUpdate};

pub const NETWORK_LOG: &str = "network-log";
pub const CONSOLE_LOG: &str = "console-log";
pub const WEBSOCKET_UPDATE: &str = "websocket-update";

/// Payload of the `websocket-update` channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebSocketUpdateEvent {
    pub ws_id: String,
    pub update: SocketUpdate,
}

/// One broadcast channel per envelope kind. Publishing never blocks; a
/// subscriber that falls more than `capacity` events behind sees a lag error
/// and skips ahead.
#[derive(Debug, Clone)]
pub struct Channels {
    network: broadcast::Sender<RequestRecord>,
    console: broadcast::Sender<ConsoleLogRecord>,
    websocket: broadcast::Sender<WebSocketUpdateEvent>,
}

impl Channels {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (network, _) = broadcast::channel(capacity);
        let (console, _) = broadcast::channel(capacity);
        let (websocket, _) = broadcast::channel(capacity);
        Self {
            network,
            console,
            websocket,
        }
    }

    /// Publish the payload of `envelope` on its channel. Having no
    /// subscribers is not an error.
    pub fn publish(&self, envelope: &Envelope) {
        match envelope {
            Envelope::Network { data } => {
                let _ = self.network.send(data.clone());
            }
            Envelope::Console { data } => {
                let _ = self.console.send(data.clone());
            }
            Envelope::SocketUpdate { ws_id, data } => {
                let _ = self.websocket.send(WebSocketUpdateEvent {
                    ws_id: ws_id.clone(),
                    update: data.clone(),
                });
            }
        }
    }

    pub fn network_log(&self) -> broadcast::Receiver<RequestRecord> {
        self.network.subscribe()
    }

    pub fn console_log(&self) -> broadcast::Receiver<ConsoleLogRecord> {
        self.console.subscribe()
    }

    pub fn websocket_update(&self) -> broadcast::Receiver<WebSocketUpdateEvent> {
        self.websocket.subscribe()
    }
}

//! Observer side: receives the relay stream, rebuilds the record set and
//! republishes every payload on the named channels.

pub mod channels;
pub mod reconstructor;
pub mod server;
pub mod web;

pub use channels::{Channels, WebSocketUpdateEvent, CONSOLE_LOG, NETWORK_LOG, WEBSOCKET_UPDATE};
pub use reconstructor::{Applied, RecordSet};

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::config::ObserverConfig;
use crate::envelope::Envelope;
use crate::error::DecodeError;
use crate::types::{ConsoleLogRecord, RequestRecord};

/// Owner of the reconstructed state. Cloning shares it.
#[derive(Clone)]
pub struct Observer {
    records: Arc<RwLock<RecordSet>>,
    channels: Channels,
}

impl Observer {
    pub fn new(config: &ObserverConfig) -> Self {
        Self {
            records: Arc::new(RwLock::new(RecordSet::new())),
            channels: Channels::new(config.channel_capacity),
        }
    }

    pub fn channels(&self) -> &Channels {
        &self.channels
    }

    /// Publish then apply one envelope. The write lock is held across both so
    /// channel order matches merge order.
    pub async fn ingest(&self, envelope: Envelope) -> Applied {
        let mut records = self.records.write().await;
        self.channels.publish(&envelope);
        let kind = envelope.kind();
        let applied = records.apply(envelope);
        if applied == Applied::UnknownRecord {
            debug!("Dropped {} for an unknown record", kind.as_str());
        }
        applied
    }

    /// Decode and ingest one relay text frame.
    pub async fn ingest_frame(&self, frame: &str) -> Result<Applied, DecodeError> {
        let envelope = Envelope::from_frame(frame)?;
        Ok(self.ingest(envelope).await)
    }

    /// Copy of the records, most recent first
    pub async fn snapshot(&self) -> Vec<RequestRecord> {
        self.records.read().await.records().cloned().collect()
    }

    pub async fn record(&self, id: &str) -> Option<RequestRecord> {
        self.records.read().await.get(id).cloned()
    }

    pub async fn console_logs(&self) -> Vec<ConsoleLogRecord> {
        self.records.read().await.console_logs().to_vec()
    }

    /// Record and console-line counts
    pub async fn counts(&self) -> (usize, usize) {
        let records = self.records.read().await;
        (records.len(), records.console_logs().len())
    }

    pub async fn clear(&self) {
        self.records.write().await.clear();
        info!("Cleared observed records");
    }

    /// Bind both listeners and serve until the task is dropped.
    pub async fn run(&self, relay_addr: SocketAddr, http_addr: SocketAddr) -> Result<()> {
        let relay_listener = TcpListener::bind(relay_addr).await?;
        let http_listener = TcpListener::bind(http_addr).await?;
        info!("Relay listening on ws://{}", relay_addr);
        info!("HTTP ingestion listening on http://{}", http_addr);
        self.serve(relay_listener, http_listener).await
    }

    /// Serve on already bound listeners.
    pub async fn serve(&self, relay_listener: TcpListener, http_listener: TcpListener) -> Result<()> {
        tokio::spawn(server::serve_http(http_listener, self.clone()));
        server::serve_relay(relay_listener, self.clone()).await
    }
}

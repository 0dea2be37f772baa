use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use super::{Connector, RelayConnection};
use crate::envelope::Envelope;
use crate::error::TransportError;

/// Relay over one WebSocket, one JSON text frame per envelope.
pub struct WsConnector {
    address: String,
    connect_timeout: Duration,
}

impl WsConnector {
    pub fn new(address: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            address: address.into(),
            connect_timeout,
        }
    }
}

pub struct WsConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Connector for WsConnector {
    type Connection = WsConnection;

    fn address(&self) -> &str {
        &self.address
    }

    async fn connect(&mut self) -> Result<WsConnection, TransportError> {
        let (stream, _response) =
            tokio::time::timeout(self.connect_timeout, connect_async(self.address.as_str()))
                .await
                .map_err(|_| TransportError::ConnectTimeout {
                    address: self.address.clone(),
                })??;
        Ok(WsConnection { stream })
    }
}

#[async_trait]
impl RelayConnection for WsConnection {
    async fn send(&mut self, envelope: &Envelope) -> Result<(), TransportError> {
        let frame = envelope.to_frame()?;
        self.stream.send(Message::text(frame)).await?;
        Ok(())
    }

    async fn closed(&mut self) {
        // The observer never talks back; reading only services pings and
        // notices the close.
        while let Some(frame) = self.stream.next().await {
            match frame {
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    debug!("Relay read error: {}", e);
                    break;
                }
            }
        }
    }
}

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;

use super::{Connector, RelayConnection};
use crate::envelope::Envelope;
use crate::error::TransportError;

/// HTTP deployment variant: every envelope is one POST of its payload to
/// `/api/network`, `/api/console` or `/api/websocket/{id}` under the base
/// address. There is no session, so "connecting" always succeeds and
/// failures surface on send.
pub struct HttpRelayConnector {
    base: String,
    client: reqwest::Client,
}

impl HttpRelayConnector {
    pub fn new(base: &str, connect_timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()?;
        Ok(Self {
            base: base.trim_end_matches('/').to_string(),
            client,
        })
    }
}

pub struct HttpRelayConnection {
    base: String,
    client: reqwest::Client,
}

#[async_trait]
impl Connector for HttpRelayConnector {
    type Connection = HttpRelayConnection;

    fn address(&self) -> &str {
        &self.base
    }

    async fn connect(&mut self) -> Result<HttpRelayConnection, TransportError> {
        Ok(HttpRelayConnection {
            base: self.base.clone(),
            client: self.client.clone(),
        })
    }
}

#[async_trait]
impl RelayConnection for HttpRelayConnection {
    async fn send(&mut self, envelope: &Envelope) -> Result<(), TransportError> {
        let url = format!("{}{}", self.base, envelope.http_path());
        self.client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(envelope.payload_json()?)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn closed(&mut self) {
        std::future::pending::<()>().await
    }
}

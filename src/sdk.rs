use std::sync::Arc;
use tracing::info;
use url::Url;

use crate::capture::{Capture, EventSink, RelayFilter};
use crate::config::{CaptureConfig, Validate};
use crate::error::ConfigError;
use crate::intercept::{
    CaptureLayer, Console, HttpClient, InterceptedConsole, InterceptedHttp, InterceptedSockets,
    SocketConnector,
};
use crate::transport::{HttpRelayConnector, TransportClient, TransportState, WsConnector};

/// Capture client, constructed once by the host application and handed to
/// whatever needs an intercepted call surface.
///
/// ```no_run
/// # async fn demo() -> Result<(), devlens::error::ConfigError> {
/// use devlens::{config::CaptureConfig, intercept::{ReqwestClient, StdConsole}, sdk::DevLens};
///
/// let lens = DevLens::new(CaptureConfig::default())?;
/// let http = lens.http(ReqwestClient::default());
/// let console = lens.console(StdConsole);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct DevLens {
    capture: Capture,
    transport: Option<TransportClient>,
}

impl DevLens {
    /// Build the pipeline for `config`. When capture is enabled this spawns
    /// the transport, so it must run inside a Tokio runtime.
    pub fn new(mut config: CaptureConfig) -> Result<Self, ConfigError> {
        config.validate();
        if !config.enabled {
            info!("Capture disabled, interceptors will pass through");
            return Ok(Self::disabled());
        }

        let address = config.relay_address.clone();
        let url = Url::parse(&address).map_err(|e| ConfigError::InvalidRelayAddress {
            address: address.clone(),
            reason: e.to_string(),
        })?;

        let timeout = config.transport.connect_timeout();
        let transport = match url.scheme() {
            "ws" | "wss" => {
                TransportClient::spawn(WsConnector::new(address.clone(), timeout), &config.transport)
            }
            "http" | "https" => {
                let connector = HttpRelayConnector::new(&address, timeout).map_err(|e| {
                    ConfigError::InvalidRelayAddress {
                        address: address.clone(),
                        reason: e.to_string(),
                    }
                })?;
                TransportClient::spawn(connector, &config.transport)
            }
            other => {
                return Err(ConfigError::UnsupportedScheme {
                    scheme: other.to_string(),
                })
            }
        };

        info!("Capturing to relay {}", address);
        let capture = Capture::new(Arc::new(transport.clone()), RelayFilter::for_address(&address));
        Ok(Self {
            capture,
            transport: Some(transport),
        })
    }

    /// Deliver envelopes to `sink` instead of a relay. The relay address is
    /// still excluded from capture.
    pub fn with_sink(mut config: CaptureConfig, sink: Arc<dyn EventSink>) -> Self {
        config.validate();
        if !config.enabled {
            return Self::disabled();
        }
        Self {
            capture: Capture::new(sink, RelayFilter::for_address(&config.relay_address)),
            transport: None,
        }
    }

    pub fn disabled() -> Self {
        Self {
            capture: Capture::disabled(),
            transport: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.capture.is_enabled()
    }

    pub fn capture(&self) -> &Capture {
        &self.capture
    }

    /// Connect to the relay now rather than on the first envelope.
    pub fn start(&self) {
        if let Some(transport) = &self.transport {
            transport.start();
        }
    }

    /// `None` when there is no relay transport (disabled, or a custom sink)
    pub fn transport_state(&self) -> Option<TransportState> {
        self.transport.as_ref().map(TransportClient::state)
    }

    pub fn http<C: HttpClient>(&self, delegate: C) -> InterceptedHttp<C> {
        InterceptedHttp::new(delegate, self.capture.clone())
    }

    pub fn sockets<C: SocketConnector>(&self, delegate: C) -> InterceptedSockets<C> {
        InterceptedSockets::new(delegate, self.capture.clone())
    }

    pub fn console<C: Console>(&self, delegate: C) -> InterceptedConsole<C> {
        InterceptedConsole::new(delegate, self.capture.clone())
    }

    /// Layer forwarding `tracing` events as console records
    pub fn tracing_layer(&self) -> CaptureLayer {
        CaptureLayer::new(self.capture.clone())
    }
}

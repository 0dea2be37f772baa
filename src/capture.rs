use std::sync::{Arc, Mutex};
use url::Url;

use crate::envelope::Envelope;
use crate::types::{ConsoleLogRecord, RequestRecord, SocketUpdate};

/// Where interceptors hand their envelopes. Implementations must not block
/// and must not fail from the caller's point of view.
pub trait EventSink: Send + Sync {
    fn emit(&self, envelope: Envelope);
}

/// In-memory sink, for wiring a producer straight to an in-process observer
/// and for tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    envelopes: Mutex<Vec<Envelope>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain everything emitted so far, in emission order
    pub fn take(&self) -> Vec<Envelope> {
        match self.envelopes.lock() {
            Ok(mut envelopes) => std::mem::take(&mut *envelopes),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

impl EventSink for MemorySink {
    fn emit(&self, envelope: Envelope) {
        match self.envelopes.lock() {
            Ok(mut envelopes) => envelopes.push(envelope),
            Err(poisoned) => poisoned.into_inner().push(envelope),
        }
    }
}

/// Recognizes URLs that point at the relay itself, so the observability path
/// never observes its own traffic.
#[derive(Debug, Clone, Default)]
pub struct RelayFilter {
    authorities: Vec<(String, u16)>,
}

impl RelayFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_address(address: &str) -> Self {
        Self::new().with_address(address)
    }

    /// Exclude one more relay address. Unparseable addresses are ignored.
    pub fn with_address(mut self, address: &str) -> Self {
        if let Some(authority) = Url::parse(address).ok().as_ref().and_then(authority_of) {
            self.authorities.push(authority);
        }
        self
    }

    pub fn is_self_traffic(&self, url: &str) -> bool {
        match Url::parse(url) {
            Ok(parsed) => match authority_of(&parsed) {
                Some(authority) => self.authorities.contains(&authority),
                None => false,
            },
            // Fall back to a plain substring match on host:port
            Err(_) => self
                .authorities
                .iter()
                .any(|(host, port)| url.contains(&format!("{}:{}", host, port))),
        }
    }
}

fn authority_of(url: &Url) -> Option<(String, u16)> {
    let host = url.host_str()?.to_ascii_lowercase();
    let port = url.port_or_known_default()?;
    Some((host, port))
}

/// Handle shared by every interceptor: the sink plus the self-traffic filter.
/// A disabled capture drops everything and interceptors pass straight through.
#[derive(Clone)]
pub struct Capture {
    sink: Option<Arc<dyn EventSink>>,
    filter: RelayFilter,
}

impl Capture {
    pub fn new(sink: Arc<dyn EventSink>, filter: RelayFilter) -> Self {
        Self {
            sink: Some(sink),
            filter,
        }
    }

    pub fn disabled() -> Self {
        Self {
            sink: None,
            filter: RelayFilter::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.sink.is_some()
    }

    /// Whether a call to `url` should produce records at all
    pub fn observes(&self, url: &str) -> bool {
        self.is_enabled() && !self.filter.is_self_traffic(url)
    }

    pub fn network(&self, record: RequestRecord) {
        self.emit(Envelope::network(record));
    }

    pub fn console(&self, record: ConsoleLogRecord) {
        self.emit(Envelope::console(record));
    }

    pub fn socket_update(&self, ws_id: &str, update: SocketUpdate) {
        self.emit(Envelope::socket_update(ws_id, update));
    }

    fn emit(&self, envelope: Envelope) {
        if let Some(sink) = &self.sink {
            sink.emit(envelope);
        }
    }
}

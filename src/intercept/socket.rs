//! Persistent-socket interception.
//!
//! [`InterceptedSockets`] wraps a [`SocketConnector`]; every socket it hands
//! out is an [`ObservedSocket`], which implements the same `Stream` and `Sink`
//! as the raw socket and reports lifecycle and traffic as it passes through.

use async_trait::async_trait;
use futures_util::{Sink, Stream};
use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::debug;

use crate::capture::Capture;
use crate::types::{
    Direction, RequestRecord, SocketMessage, SocketUpdate, BINARY_PLACEHOLDER,
};
use crate::util::{current_timestamp, millis, new_record_id};

/// Status reported when the stream ends without a close frame
const ABNORMAL_CLOSURE: u16 = 1006;
/// Status reported for a close frame that carries no code
const NO_STATUS_RECEIVED: u16 = 1005;

/// Opens persistent sockets. The socket is a message stream and sink.
#[async_trait]
pub trait SocketConnector: Send + Sync {
    type Error: fmt::Display + Send;
    type Socket: Stream<Item = Result<Message, Self::Error>>
        + Sink<Message, Error = Self::Error>
        + Unpin
        + Send;

    async fn connect(&self, url: &str) -> Result<Self::Socket, Self::Error>;
}

/// Real sockets through `tokio-tungstenite`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteConnector;

#[async_trait]
impl SocketConnector for TungsteniteConnector {
    type Error = tungstenite::Error;
    type Socket = tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >;

    async fn connect(&self, url: &str) -> Result<Self::Socket, Self::Error> {
        let (stream, _response) = tokio_tungstenite::connect_async(url).await?;
        Ok(stream)
    }
}

pub struct InterceptedSockets<C> {
    inner: C,
    capture: Capture,
}

impl<C: SocketConnector> InterceptedSockets<C> {
    pub fn new(inner: C, capture: Capture) -> Self {
        Self { inner, capture }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }
}

#[async_trait]
impl<C: SocketConnector> SocketConnector for InterceptedSockets<C> {
    type Error = C::Error;
    type Socket = ObservedSocket<C::Socket>;

    async fn connect(&self, url: &str) -> Result<Self::Socket, Self::Error> {
        if !self.capture.observes(url) {
            return self.inner.connect(url).await.map(ObservedSocket::unobserved);
        }

        let mut tracker = SocketTracker::new(self.capture.clone(), url);
        match self.inner.connect(url).await {
            Ok(socket) => {
                tracker.opened();
                Ok(ObservedSocket {
                    inner: socket,
                    tracker: Some(tracker),
                })
            }
            Err(error) => {
                tracker.failed(&error);
                Err(error)
            }
        }
    }
}

/// Per-connection bookkeeping: id, start time, message counter and whether
/// a terminal update has already gone out.
struct SocketTracker {
    capture: Capture,
    id: String,
    started: Instant,
    next_seq: u64,
    closing: bool,
    terminated: bool,
}

impl SocketTracker {
    /// Emits the `connecting` creation record.
    fn new(capture: Capture, url: &str) -> Self {
        let id = new_record_id();
        capture.network(RequestRecord::socket_connecting(id.clone(), url.to_string()));
        Self {
            capture,
            id,
            started: Instant::now(),
            next_seq: 1,
            closing: false,
            terminated: false,
        }
    }

    fn elapsed_ms(&self) -> u64 {
        millis(self.started.elapsed())
    }

    fn opened(&mut self) {
        let update = SocketUpdate::opened(self.elapsed_ms());
        self.capture.socket_update(&self.id, update);
    }

    fn message(&mut self, direction: Direction, data: String) {
        if self.terminated {
            return;
        }
        let message = SocketMessage {
            id: format!("{}-{}", self.id, self.next_seq),
            direction,
            data,
            timestamp: current_timestamp(),
        };
        self.next_seq += 1;
        self.capture.socket_update(&self.id, SocketUpdate::message(message));
    }

    fn sent(&mut self, message: &Message) {
        match message {
            Message::Text(text) => self.message(Direction::Send, text.as_str().to_string()),
            Message::Binary(_) => self.message(Direction::Send, BINARY_PLACEHOLDER.to_string()),
            Message::Close(_) => self.closing(),
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
        }
    }

    fn received(&mut self, message: &Message) {
        match message {
            Message::Text(text) => self.message(Direction::Receive, text.as_str().to_string()),
            Message::Binary(_) => self.message(Direction::Receive, BINARY_PLACEHOLDER.to_string()),
            Message::Close(frame) => {
                let (code, reason) = match frame {
                    Some(frame) => (u16::from(frame.code), frame.reason.as_str().to_string()),
                    None => (NO_STATUS_RECEIVED, String::new()),
                };
                self.closed(code, &reason);
            }
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
        }
    }

    fn closing(&mut self) {
        if self.closing || self.terminated {
            return;
        }
        self.closing = true;
        self.capture.socket_update(&self.id, SocketUpdate::closing());
    }

    fn closed(&mut self, code: u16, reason: &str) {
        if self.terminated {
            return;
        }
        self.terminated = true;
        let update = SocketUpdate::closed(code, reason, self.elapsed_ms());
        self.capture.socket_update(&self.id, update);
    }

    fn failed(&mut self, error: &dyn fmt::Display) {
        if self.terminated {
            return;
        }
        self.terminated = true;
        debug!("Observed socket {} failed: {}", self.id, error);
        self.capture
            .socket_update(&self.id, SocketUpdate::failed(error.to_string()));
    }
}

impl Drop for SocketTracker {
    // A socket dropped before a close frame or stream end still finishes
    // its record.
    fn drop(&mut self) {
        self.closed(ABNORMAL_CLOSURE, "");
    }
}

/// A socket that reports what flows through it. Behaves exactly like the
/// wrapped socket; [`get_ref`](Self::get_ref), [`get_mut`](Self::get_mut) and
/// [`into_inner`](Self::into_inner) expose the inner socket.
pub struct ObservedSocket<S> {
    inner: S,
    tracker: Option<SocketTracker>,
}

impl<S> ObservedSocket<S> {
    fn unobserved(inner: S) -> Self {
        Self {
            inner,
            tracker: None,
        }
    }

    /// Record id shared by every update for this connection
    pub fn record_id(&self) -> Option<&str> {
        self.tracker.as_ref().map(|tracker| tracker.id.as_str())
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    /// Stop observing. Unless the socket already reached a terminal state,
    /// its record is finished as closed with status 1006.
    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S> fmt::Debug for ObservedSocket<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservedSocket")
            .field("record_id", &self.record_id())
            .finish()
    }
}

impl<S, E> Stream for ObservedSocket<S>
where
    S: Stream<Item = Result<Message, E>> + Unpin,
    E: fmt::Display,
{
    type Item = Result<Message, E>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = Pin::into_inner(self);
        let polled = Pin::new(&mut this.inner).poll_next(cx);
        if let Some(tracker) = this.tracker.as_mut() {
            match &polled {
                Poll::Ready(Some(Ok(message))) => tracker.received(message),
                Poll::Ready(Some(Err(error))) => tracker.failed(error),
                Poll::Ready(None) => tracker.closed(ABNORMAL_CLOSURE, ""),
                Poll::Pending => {}
            }
        }
        polled
    }
}

impl<S> Sink<Message> for ObservedSocket<S>
where
    S: Sink<Message> + Unpin,
{
    type Error = S::Error;

    fn poll_ready(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Pin::new(&mut Pin::into_inner(self).inner).poll_ready(cx)
    }

    fn start_send(self: Pin<&mut Self>, item: Message) -> Result<(), Self::Error> {
        let this = Pin::into_inner(self);
        if let Some(tracker) = this.tracker.as_mut() {
            tracker.sent(&item);
        }
        Pin::new(&mut this.inner).start_send(item)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Pin::new(&mut Pin::into_inner(self).inner).poll_flush(cx)
    }

    fn poll_close(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        let this = Pin::into_inner(self);
        if let Some(tracker) = this.tracker.as_mut() {
            tracker.closing();
        }
        Pin::new(&mut this.inner).poll_close(cx)
    }
}

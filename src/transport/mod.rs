//! Delivery of envelopes to the observer.
//!
//! A [`TransportClient`] is a cheap handle onto one background driver task
//! that owns the relay connection and the pending queue. Sending never blocks
//! and never fails: while the relay is unreachable envelopes wait in the
//! queue, and the driver keeps reconnecting with exponential backoff.

pub mod backoff;
pub mod http;
pub mod ws;

pub use self::backoff::Backoff;
pub use self::http::HttpRelayConnector;
pub use self::ws::WsConnector;

use async_trait::async_trait;
use std::collections::VecDeque;
use std::fmt;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::capture::EventSink;
use crate::config::TransportConfig;
use crate::envelope::Envelope;
use crate::error::TransportError;

tokio::task_local! {
    /// Set for the whole life of a driver task.
    pub(crate) static TRANSPORT_TASK: ();
}

/// Whether the caller runs inside a transport driver. Anything logged there
/// must not be captured again.
pub(crate) fn in_transport_task() -> bool {
    TRANSPORT_TASK.try_with(|_| ()).is_ok()
}

/// Connection state of the driver, as published to [`TransportClient::state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Idle,
    Connecting,
    Open,
    WaitingToRetry,
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportState::Idle => write!(f, "idle"),
            TransportState::Connecting => write!(f, "connecting"),
            TransportState::Open => write!(f, "open"),
            TransportState::WaitingToRetry => write!(f, "waiting-to-retry"),
        }
    }
}

/// Opens connections to one relay.
#[async_trait]
pub trait Connector: Send + 'static {
    type Connection: RelayConnection + 'static;

    /// Relay address, for logs
    fn address(&self) -> &str;

    async fn connect(&mut self) -> Result<Self::Connection, TransportError>;
}

/// One open relay connection.
#[async_trait]
pub trait RelayConnection: Send {
    async fn send(&mut self, envelope: &Envelope) -> Result<(), TransportError>;

    /// Resolves once the relay side has gone away. Must be cancel safe.
    async fn closed(&mut self);
}

#[derive(Debug)]
enum Command {
    Send(Envelope),
    Start,
}

/// Handle onto the transport driver. Clones share the same driver; once every
/// handle is dropped the driver stops and queued envelopes are abandoned.
#[derive(Clone)]
pub struct TransportClient {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<TransportState>,
}

impl TransportClient {
    /// Spawn the driver on the current Tokio runtime. It stays idle until the
    /// first send or [`start`](Self::start).
    pub fn spawn<C: Connector>(connector: C, config: &TransportConfig) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(TransportState::Idle);

        let driver = Driver {
            connector,
            commands: command_rx,
            pending: PendingQueue::new(config.queue_capacity),
            backoff: Backoff::new(config.base_delay(), config.max_delay()),
            state: state_tx,
        };
        tokio::spawn(TRANSPORT_TASK.scope((), driver.run()));

        Self {
            commands: command_tx,
            state: state_rx,
        }
    }

    /// Queue an envelope for delivery.
    pub fn send(&self, envelope: Envelope) {
        if self.commands.send(Command::Send(envelope)).is_err() {
            debug!("Transport driver has stopped, envelope dropped");
        }
    }

    /// Connect now instead of waiting for the first envelope.
    pub fn start(&self) {
        let _ = self.commands.send(Command::Start);
    }

    pub fn state(&self) -> TransportState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<TransportState> {
        self.state.clone()
    }
}

impl EventSink for TransportClient {
    fn emit(&self, envelope: Envelope) {
        self.send(envelope);
    }
}

/// FIFO of envelopes waiting for an open connection. When full the oldest
/// envelope is evicted.
struct PendingQueue {
    envelopes: VecDeque<Envelope>,
    capacity: usize,
    evicted: usize,
}

impl PendingQueue {
    fn new(capacity: usize) -> Self {
        Self {
            envelopes: VecDeque::new(),
            capacity: capacity.max(1),
            evicted: 0,
        }
    }

    fn push(&mut self, envelope: Envelope) {
        if self.envelopes.len() >= self.capacity {
            self.envelopes.pop_front();
            if self.evicted == 0 {
                warn!(
                    "Relay queue full ({} envelopes), dropping oldest until the relay is back",
                    self.capacity
                );
            }
            self.evicted += 1;
        }
        self.envelopes.push_back(envelope);
    }

    fn pop(&mut self) -> Option<Envelope> {
        self.envelopes.pop_front()
    }

    /// Put back an envelope that failed to send, ahead of everything else.
    fn requeue(&mut self, envelope: Envelope) {
        self.envelopes.push_front(envelope);
    }

    fn take_evicted(&mut self) -> usize {
        std::mem::take(&mut self.evicted)
    }
}

enum Outcome {
    Lost,
    Shutdown,
}

struct Driver<C: Connector> {
    connector: C,
    commands: mpsc::UnboundedReceiver<Command>,
    pending: PendingQueue,
    backoff: Backoff,
    state: watch::Sender<TransportState>,
}

impl<C: Connector> Driver<C> {
    async fn run(mut self) {
        match self.commands.recv().await {
            Some(command) => Self::accept(&mut self.pending, command),
            None => return,
        }

        loop {
            self.set_state(TransportState::Connecting);
            match self.connect().await {
                None => break,
                Some(Ok(connection)) => {
                    info!("Connected to relay {}", self.connector.address());
                    self.backoff.reset();
                    let evicted = self.pending.take_evicted();
                    if evicted > 0 {
                        debug!("{} envelopes were dropped while the relay was unreachable", evicted);
                    }
                    self.set_state(TransportState::Open);

                    if let Outcome::Shutdown = self.serve(connection).await {
                        break;
                    }
                }
                Some(Err(e)) => {
                    warn!("Relay {} unavailable: {}", self.connector.address(), e);
                }
            }

            self.set_state(TransportState::WaitingToRetry);
            if !self.wait_to_retry().await {
                break;
            }
        }

        debug!(
            "Transport driver stopped with {} envelopes undelivered",
            self.pending.envelopes.len()
        );
    }

    fn accept(pending: &mut PendingQueue, command: Command) {
        if let Command::Send(envelope) = command {
            pending.push(envelope);
        }
    }

    fn set_state(&self, state: TransportState) {
        debug!("Transport state: {}", state);
        self.state.send_replace(state);
    }

    /// Connect while still queueing. `None` once every handle is gone.
    async fn connect(&mut self) -> Option<Result<C::Connection, TransportError>> {
        let connect = self.connector.connect();
        tokio::pin!(connect);
        loop {
            tokio::select! {
                result = &mut connect => return Some(result),
                command = self.commands.recv() => match command {
                    Some(command) => Self::accept(&mut self.pending, command),
                    None => return None,
                },
            }
        }
    }

    /// Drain the queue, then forward live envelopes until the connection is
    /// lost or every handle is gone.
    async fn serve(&mut self, mut connection: C::Connection) -> Outcome {
        while let Some(envelope) = self.pending.pop() {
            if let Err(e) = connection.send(&envelope).await {
                warn!("Failed to deliver queued envelope: {}", e);
                self.pending.requeue(envelope);
                return Outcome::Lost;
            }
        }

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Send(envelope)) => {
                        if let Err(e) = connection.send(&envelope).await {
                            warn!("Failed to deliver envelope: {}", e);
                            self.pending.requeue(envelope);
                            return Outcome::Lost;
                        }
                    }
                    Some(Command::Start) => {}
                    None => return Outcome::Shutdown,
                },
                _ = connection.closed() => {
                    info!("Relay {} closed the connection", self.connector.address());
                    return Outcome::Lost;
                }
            }
        }
    }

    /// Sleep for the next backoff delay while still queueing. `false` once
    /// every handle is gone.
    async fn wait_to_retry(&mut self) -> bool {
        let delay = self.backoff.next_delay();
        debug!("Reconnecting to relay in {:?}", delay);
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => return true,
                command = self.commands.recv() => match command {
                    Some(command) => Self::accept(&mut self.pending, command),
                    None => return false,
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ConsoleLogRecord, LogArg, LogLevel};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::time::Instant;

    #[derive(Default)]
    struct RelayState {
        up: bool,
        delivered: Vec<Envelope>,
        attempts: Vec<Instant>,
        /// Successful sends left before the next one fails
        fail_after: Option<usize>,
        /// Whether each send ran inside a marked driver task
        marked: Vec<bool>,
    }

    #[derive(Clone, Default)]
    struct FakeRelay {
        state: Arc<Mutex<RelayState>>,
    }

    impl FakeRelay {
        fn set_up(&self, up: bool) {
            self.state.lock().unwrap().up = up;
        }

        fn fail_after(&self, sends: usize) {
            self.state.lock().unwrap().fail_after = Some(sends);
        }

        fn delivered(&self) -> Vec<Envelope> {
            self.state.lock().unwrap().delivered.clone()
        }

        fn attempts(&self) -> Vec<Instant> {
            self.state.lock().unwrap().attempts.clone()
        }
    }

    struct FakeConnector {
        relay: FakeRelay,
    }

    struct FakeConnection {
        relay: FakeRelay,
    }

    #[async_trait]
    impl Connector for FakeConnector {
        type Connection = FakeConnection;

        fn address(&self) -> &str {
            "fake://relay"
        }

        async fn connect(&mut self) -> Result<FakeConnection, TransportError> {
            let mut state = self.relay.state.lock().unwrap();
            state.attempts.push(Instant::now());
            if state.up {
                Ok(FakeConnection {
                    relay: self.relay.clone(),
                })
            } else {
                Err(TransportError::Connect {
                    address: "fake://relay".into(),
                    reason: "connection refused".into(),
                })
            }
        }
    }

    #[async_trait]
    impl RelayConnection for FakeConnection {
        async fn send(&mut self, envelope: &Envelope) -> Result<(), TransportError> {
            let mut state = self.relay.state.lock().unwrap();
            state.marked.push(in_transport_task());
            match state.fail_after {
                Some(0) => {
                    state.fail_after = None;
                    Err(TransportError::Closed)
                }
                Some(n) => {
                    state.fail_after = Some(n - 1);
                    state.delivered.push(envelope.clone());
                    Ok(())
                }
                None => {
                    state.delivered.push(envelope.clone());
                    Ok(())
                }
            }
        }

        async fn closed(&mut self) {
            std::future::pending::<()>().await
        }
    }

    fn config() -> TransportConfig {
        TransportConfig {
            base_delay_ms: 1000,
            max_delay_ms: 30000,
            queue_capacity: 100,
            connect_timeout_ms: 1000,
        }
    }

    fn numbered(i: i64) -> Envelope {
        Envelope::console(ConsoleLogRecord::new(LogLevel::Info, vec![LogArg::Int(i)]))
    }

    #[tokio::test(start_paused = true)]
    async fn test_queued_sends_delivered_in_order_once() {
        let relay = FakeRelay::default();
        let client = TransportClient::spawn(FakeConnector { relay: relay.clone() }, &config());

        for i in 0..5 {
            client.send(numbered(i));
        }
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(relay.delivered().is_empty());
        assert_eq!(client.state(), TransportState::WaitingToRetry);

        relay.set_up(true);
        tokio::time::sleep(Duration::from_millis(3000)).await;

        assert_eq!(client.state(), TransportState::Open);
        assert_eq!(relay.delivered(), (0..5).map(numbered).collect::<Vec<_>>());

        client.send(numbered(5));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(relay.delivered().len(), 6);
        assert_eq!(relay.delivered()[5], numbered(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_delays_follow_backoff() {
        let relay = FakeRelay::default();
        let client = TransportClient::spawn(FakeConnector { relay: relay.clone() }, &config());
        client.start();

        tokio::time::sleep(Duration::from_secs(70)).await;

        let attempts = relay.attempts();
        let gaps: Vec<u128> = attempts
            .windows(2)
            .map(|pair| (pair[1] - pair[0]).as_millis())
            .collect();
        assert_eq!(gaps, vec![1000, 2000, 4000, 8000, 16000, 30000]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_failure_requeues_at_front() {
        let relay = FakeRelay::default();
        let client = TransportClient::spawn(FakeConnector { relay: relay.clone() }, &config());

        for i in 0..5 {
            client.send(numbered(i));
        }
        tokio::time::sleep(Duration::from_millis(500)).await;

        relay.fail_after(2);
        relay.set_up(true);
        tokio::time::sleep(Duration::from_millis(800)).await;
        assert_eq!(relay.delivered().len(), 2);
        assert_eq!(client.state(), TransportState::WaitingToRetry);

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(relay.delivered(), (0..5).map(numbered).collect::<Vec<_>>());
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_queue_drops_oldest() {
        let relay = FakeRelay::default();
        let config = TransportConfig {
            queue_capacity: 3,
            ..config()
        };
        let client = TransportClient::spawn(FakeConnector { relay: relay.clone() }, &config);

        for i in 0..5 {
            client.send(numbered(i));
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        relay.set_up(true);
        tokio::time::sleep(Duration::from_millis(1500)).await;

        assert_eq!(relay.delivered(), (2..5).map(numbered).collect::<Vec<_>>());
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_until_first_use() {
        let relay = FakeRelay::default();
        relay.set_up(true);
        let client = TransportClient::spawn(FakeConnector { relay: relay.clone() }, &config());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(client.state(), TransportState::Idle);
        assert!(relay.attempts().is_empty());

        client.start();
        let mut state = client.subscribe_state();
        state
            .wait_for(|state| *state == TransportState::Open)
            .await
            .unwrap();
        assert_eq!(relay.attempts().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_driver_runs_marked_as_transport() {
        let relay = FakeRelay::default();
        relay.set_up(true);
        let client = TransportClient::spawn(FakeConnector { relay: relay.clone() }, &config());

        client.send(numbered(1));
        client.send(numbered(2));
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(relay.state.lock().unwrap().marked, vec![true, true]);
        assert!(!in_transport_task());
    }

    #[tokio::test]
    async fn test_dropping_handles_stops_driver() {
        let relay = FakeRelay::default();
        let client = TransportClient::spawn(FakeConnector { relay }, &config());
        let mut state = client.subscribe_state();
        drop(client);
        assert!(state.changed().await.is_err());
    }
}

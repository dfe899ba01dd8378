/// Alert gateway connection manager
///
/// Owns at most one live connection per session and hides reconnection from callers:
/// - Authenticated connect with the session's bearer token
/// - Heartbeat ping while connected
/// - Handshake deadline: a transport the server never accepts counts as a failed attempt
/// - Bounded reconnection with exponential backoff
/// - Acknowledgment publishing (dropped when not connected)
///
/// Each connection runs as one spawned task that multiplexes inbound frames,
/// the heartbeat ticker, queued outbound events and the shutdown signal.
use super::messages::{ClientEvent, ServerEvent};
use super::transport::{Connector, InboundFrame, Transport};
use crate::metrics;
use crate::models::{Alert, ConnectionState};
use futures_util::{SinkExt, StreamExt};
use resilience::{RetryBudget, RetryConfig};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Callbacks invoked from the connection task, in transport order.
///
/// Implementations must not block; they run on the connection task.
pub trait ConnectionListener: Send + Sync + 'static {
    /// Server accepted the handshake
    fn on_connect(&self, metadata: &Value);

    fn on_alert(&self, alert: Alert);

    /// A previously connected session dropped
    fn on_disconnect(&self, reason: &str);

    /// A connection attempt failed. `terminal` is set once reconnection has given up.
    fn on_connect_error(&self, _message: &str, _attempt: u32, _terminal: bool) {}
}

#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    /// Keepalive ping period while connected
    pub heartbeat_interval: Duration,
    /// How long an opened transport may wait for the server's `connected`
    pub handshake_timeout: Duration,
    pub retry: RetryConfig,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            handshake_timeout: Duration::from_secs(20),
            retry: RetryConfig::default(),
        }
    }
}

/// Result of a `connect` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// A live connection already existed and was kept
    AlreadyConnected,
    /// A new connection task was started
    Started,
}

/// Manages the single alert gateway connection of a session.
///
/// Cheap to clone; clones share the same connection.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

struct Inner {
    connector: Arc<dyn Connector>,
    options: ConnectionOptions,
    state: Arc<watch::Sender<ConnectionState>>,
    /// Serializes connect/disconnect so two callers never open two connections
    lifecycle: AsyncMutex<()>,
    session: parking_lot::Mutex<Option<Session>>,
    next_session_id: AtomicU64,
}

struct Session {
    id: u64,
    outbound: mpsc::UnboundedSender<ClientEvent>,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl ConnectionManager {
    pub fn new(connector: Arc<dyn Connector>, options: ConnectionOptions) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);

        Self {
            inner: Arc::new(Inner {
                connector,
                options,
                state: Arc::new(state),
                lifecycle: AsyncMutex::new(()),
                session: parking_lot::Mutex::new(None),
                next_session_id: AtomicU64::new(1),
            }),
        }
    }

    /// Connect with `token`, delivering events to `listener`.
    ///
    /// Keeps an existing live connection untouched. A connection that exists
    /// but is not live is shut down and replaced.
    pub async fn connect(
        &self,
        token: &str,
        listener: Arc<dyn ConnectionListener>,
    ) -> ConnectOutcome {
        let _guard = self.inner.lifecycle.lock().await;

        if self.is_connected() {
            let live = self
                .inner
                .session
                .lock()
                .as_ref()
                .map(|s| !s.task.is_finished())
                .unwrap_or(false);
            if live {
                debug!("Alert connection already live, reusing it");
                return ConnectOutcome::AlreadyConnected;
            }
        }

        let previous = self.inner.session.lock().take();
        if let Some(previous) = previous {
            debug!(session_id = previous.id, "Replacing stale alert connection");
            shutdown_session(previous).await;
        }

        let id = self.inner.next_session_id.fetch_add(1, Ordering::Relaxed);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let task = SessionTask {
            id,
            connector: self.inner.connector.clone(),
            token: token.to_string(),
            listener,
            heartbeat_interval: self.inner.options.heartbeat_interval,
            handshake_timeout: self.inner.options.handshake_timeout,
            reconnect_delay: self.inner.options.retry.initial_backoff,
            budget: RetryBudget::new(&self.inner.options.retry),
            state: self.inner.state.clone(),
            outbound: outbound_rx,
            shutdown: shutdown_rx,
            live: false,
            last_pong: None,
        };

        set_state(&self.inner.state, ConnectionState::Connecting);
        let handle = tokio::spawn(task.run());

        *self.inner.session.lock() = Some(Session {
            id,
            outbound: outbound_tx,
            shutdown: shutdown_tx,
            task: handle,
        });

        info!(session_id = id, "Alert connection started");
        ConnectOutcome::Started
    }

    /// Close the connection if there is one. No listener callback fires after this returns.
    pub async fn disconnect(&self) {
        let _guard = self.inner.lifecycle.lock().await;

        let session = self.inner.session.lock().take();
        match session {
            Some(session) => {
                let id = session.id;
                shutdown_session(session).await;
                info!(session_id = id, "Alert connection closed");
            }
            None => debug!("Disconnect requested with no alert connection"),
        }

        set_state(&self.inner.state, ConnectionState::Disconnected);
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Watch connection state transitions
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Tell the server an alert was seen.
    ///
    /// Returns whether the acknowledgment was queued; it is dropped without
    /// retry when not connected.
    pub fn acknowledge(&self, alert_type: &str, alert_id: &str) -> bool {
        if !self.is_connected() {
            debug!(alert_id, "Not connected, dropping acknowledgment");
            metrics::record_acknowledgment(false);
            return false;
        }

        let event = ClientEvent::acknowledge(alert_type, alert_id, chrono::Utc::now());
        let queued = self
            .inner
            .session
            .lock()
            .as_ref()
            .map(|s| s.outbound.send(event).is_ok())
            .unwrap_or(false);

        metrics::record_acknowledgment(queued);
        queued
    }
}

async fn shutdown_session(session: Session) {
    // The task may already have exited on its own
    let _ = session.shutdown.send(());
    if let Err(e) = session.task.await {
        if e.is_panic() {
            warn!(session_id = session.id, "Alert connection task panicked");
        }
    }
}

fn set_state(state: &watch::Sender<ConnectionState>, next: ConnectionState) {
    let changed = state.send_if_modified(|current| {
        if *current == next {
            return false;
        }
        *current = next;
        true
    });

    if changed {
        debug!(state = next.as_str(), "Alert connection state changed");
        metrics::set_connection_state(next);
    }
}

/// Why a single transport connection ended
#[derive(Debug)]
enum SessionExit {
    /// Local shutdown requested
    Shutdown,
    /// Peer or transport dropped the connection
    Dropped(String),
    /// Connection attempt was refused or failed
    Failed { message: String, retryable: bool },
}

struct SessionTask {
    id: u64,
    connector: Arc<dyn Connector>,
    token: String,
    listener: Arc<dyn ConnectionListener>,
    heartbeat_interval: Duration,
    handshake_timeout: Duration,
    reconnect_delay: Duration,
    budget: RetryBudget,
    state: Arc<watch::Sender<ConnectionState>>,
    outbound: mpsc::UnboundedReceiver<ClientEvent>,
    shutdown: oneshot::Receiver<()>,
    /// Server acknowledged the handshake on the current transport
    live: bool,
    last_pong: Option<Instant>,
}

impl SessionTask {
    async fn run(mut self) {
        loop {
            set_state(&self.state, ConnectionState::Connecting);

            let opened = tokio::select! {
                biased;
                _ = &mut self.shutdown => break,
                result = self.connector.open(&self.token) => result,
            };

            let exit = match opened {
                Ok(transport) => self.drive(transport).await,
                Err(e) => SessionExit::Failed {
                    message: e.to_string(),
                    retryable: e.is_retryable(),
                },
            };

            let was_live = std::mem::replace(&mut self.live, false);

            let delay = match exit {
                SessionExit::Shutdown => break,
                SessionExit::Dropped(reason) if was_live => {
                    set_state(&self.state, ConnectionState::Disconnected);
                    warn!(session_id = self.id, reason = %reason, "Alert connection dropped");
                    self.listener.on_disconnect(&reason);
                    self.reconnect_delay
                }
                // Closed before the server accepted us: same as a refused handshake
                SessionExit::Dropped(reason) => match self.record_failure(&reason, true) {
                    Some(delay) => delay,
                    None => break,
                },
                SessionExit::Failed { message, retryable } => {
                    if was_live {
                        set_state(&self.state, ConnectionState::Disconnected);
                        self.listener.on_disconnect(&message);
                    }
                    match self.record_failure(&message, retryable) {
                        Some(delay) => delay,
                        None => break,
                    }
                }
            };

            debug!(session_id = self.id, ?delay, "Reconnecting alert connection");
            set_state(&self.state, ConnectionState::Disconnected);

            tokio::select! {
                biased;
                _ = &mut self.shutdown => break,
                _ = time::sleep(delay) => {}
            }
        }

        set_state(&self.state, ConnectionState::Disconnected);
        debug!(session_id = self.id, "Alert connection task finished");
    }

    /// Count a failed attempt. `None` means reconnection is over.
    fn record_failure(&mut self, message: &str, retryable: bool) -> Option<Duration> {
        let next = if retryable {
            self.budget.record_failure()
        } else {
            None
        };
        let attempt = self.budget.failures();
        let terminal = next.is_none();

        metrics::record_connect_error(terminal);
        if terminal {
            warn!(
                session_id = self.id,
                attempt,
                error = %message,
                "Alert connection failed, giving up on reconnection"
            );
        } else {
            warn!(
                session_id = self.id,
                attempt,
                max = self.budget.max_retries(),
                error = %message,
                "Alert connection error"
            );
        }

        self.listener.on_connect_error(message, attempt, terminal);
        next
    }

    async fn drive(&mut self, transport: Transport) -> SessionExit {
        let Transport {
            mut sink,
            mut stream,
        } = transport;

        let period = self.heartbeat_interval;
        let mut heartbeat = time::interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let handshake = time::sleep(self.handshake_timeout);
        tokio::pin!(handshake);

        let exit = loop {
            tokio::select! {
                biased;

                _ = &mut self.shutdown => break SessionExit::Shutdown,

                frame = stream.next() => match frame {
                    Some(Ok(InboundFrame::Text(text))) => {
                        let event = match ServerEvent::from_json(&text) {
                            Ok(event) => event,
                            Err(e) => {
                                warn!(session_id = self.id, error = %e, "Skipping undecodable frame");
                                continue;
                            }
                        };

                        if matches!(event, ServerEvent::Connected(_)) {
                            heartbeat.reset();
                        }
                        if let Some(exit) = self.handle_event(event) {
                            break exit;
                        }
                    }
                    Some(Ok(InboundFrame::Closed(reason))) => {
                        break SessionExit::Dropped(
                            reason
                                .filter(|r| !r.is_empty())
                                .unwrap_or_else(|| "transport close".to_string()),
                        );
                    }
                    Some(Err(e)) => break SessionExit::Dropped(format!("transport error: {}", e)),
                    None => break SessionExit::Dropped("transport close".to_string()),
                },

                _ = &mut handshake, if !self.live => {
                    break SessionExit::Failed {
                        message: format!("no handshake within {:?}", self.handshake_timeout),
                        retryable: true,
                    };
                }

                _ = heartbeat.tick(), if self.live => {
                    if let Err(e) = send_event(&mut sink, &ClientEvent::Ping).await {
                        break SessionExit::Dropped(format!("ping failed: {}", e));
                    }
                    debug!(session_id = self.id, last_pong = ?self.last_pong.map(|at| at.elapsed()), "Heartbeat ping sent");
                }

                Some(event) = self.outbound.recv() => {
                    if let Err(e) = send_event(&mut sink, &event).await {
                        warn!(session_id = self.id, event = event.name(), error = %e, "Failed to send event");
                        break SessionExit::Dropped(format!("send failed: {}", e));
                    }
                }
            }
        };

        if let Err(e) = sink.close().await {
            debug!(session_id = self.id, error = %e, "Error closing alert transport");
        }

        // Events queued for this transport never outlive it
        let mut discarded = 0usize;
        while self.outbound.try_recv().is_ok() {
            discarded += 1;
        }
        if discarded > 0 {
            debug!(session_id = self.id, discarded, "Discarded unsent events");
        }

        exit
    }

    fn handle_event(&mut self, event: ServerEvent) -> Option<SessionExit> {
        match event {
            ServerEvent::Connected(metadata) => {
                self.live = true;
                self.budget.reset();
                set_state(&self.state, ConnectionState::Connected);
                info!(session_id = self.id, "Alert connection established");
                self.listener.on_connect(&metadata);
                None
            }
            ServerEvent::Alert(alert) => {
                debug!(
                    session_id = self.id,
                    alert_type = %alert.alert_type,
                    severity = %alert.severity,
                    "Alert received"
                );
                metrics::record_alert(alert.severity);
                self.listener.on_alert(alert);
                None
            }
            ServerEvent::Disconnect(reason) if reason.is_empty() => {
                Some(SessionExit::Dropped("server disconnect".to_string()))
            }
            ServerEvent::Disconnect(reason) => Some(SessionExit::Dropped(reason)),
            ServerEvent::ConnectError(payload) => Some(SessionExit::Failed {
                message: payload.message,
                retryable: true,
            }),
            ServerEvent::Pong => {
                self.last_pong = Some(Instant::now());
                debug!(session_id = self.id, "Heartbeat pong received");
                None
            }
        }
    }
}

async fn send_event(
    sink: &mut super::transport::FrameSink,
    event: &ClientEvent,
) -> crate::error::Result<()> {
    let json = event.to_json()?;
    sink.send(json).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AlertError;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU32;

    struct RefusingConnector {
        attempts: AtomicU32,
    }

    #[async_trait]
    impl Connector for RefusingConnector {
        async fn open(&self, _token: &str) -> crate::error::Result<Transport> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(AlertError::Transport("connection refused".into()))
        }
    }

    struct SilentListener;

    impl ConnectionListener for SilentListener {
        fn on_connect(&self, _metadata: &Value) {}
        fn on_alert(&self, _alert: Alert) {}
        fn on_disconnect(&self, _reason: &str) {}
    }

    fn quick_options() -> ConnectionOptions {
        ConnectionOptions {
            retry: RetryConfig {
                jitter: false,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_manager_starts_disconnected() {
        let connector = Arc::new(RefusingConnector {
            attempts: AtomicU32::new(0),
        });
        let manager = ConnectionManager::new(connector, ConnectionOptions::default());

        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(!manager.is_connected());
    }

    #[tokio::test]
    async fn test_disconnect_without_connection_is_noop() {
        let connector = Arc::new(RefusingConnector {
            attempts: AtomicU32::new(0),
        });
        let manager = ConnectionManager::new(connector.clone(), ConnectionOptions::default());

        manager.disconnect().await;
        manager.disconnect().await;

        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_acknowledge_dropped_when_disconnected() {
        let connector = Arc::new(RefusingConnector {
            attempts: AtomicU32::new(0),
        });
        let manager = ConnectionManager::new(connector, ConnectionOptions::default());

        assert!(!manager.acknowledge("MRL_VIOLATION", "MRL_VIOLATION_1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refused_connection_stops_at_ceiling() {
        let connector = Arc::new(RefusingConnector {
            attempts: AtomicU32::new(0),
        });
        let manager = ConnectionManager::new(connector.clone(), quick_options());

        let outcome = manager.connect("token", Arc::new(SilentListener)).await;
        assert_eq!(outcome, ConnectOutcome::Started);

        // 1s + 2s + 4s + 5s of backoff covers all five attempts
        time::sleep(Duration::from_secs(60)).await;

        assert_eq!(connector.attempts.load(Ordering::SeqCst), 5);
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }
}

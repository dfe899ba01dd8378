//! In-memory alert gateway shared by the integration tests.
#![allow(dead_code)]

use alert_client::error::{AlertError, Result};
use alert_client::models::{Alert, Severity};
use alert_client::websocket::{ClientEvent, ConnectionListener, Connector, InboundFrame, ServerEvent, Transport};
use async_trait::async_trait;
use futures_util::{sink, stream, StreamExt};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Server end of one accepted connection
pub struct ServerConnection {
    to_client: mpsc::UnboundedSender<Result<InboundFrame>>,
    from_client: mpsc::UnboundedReceiver<String>,
}

impl ServerConnection {
    pub fn send(&self, event: &ServerEvent) {
        self.send_raw(&event.to_json().unwrap());
    }

    pub fn send_raw(&self, text: &str) {
        // The client may already be gone
        let _ = self.to_client.send(Ok(InboundFrame::Text(text.to_string())));
    }

    /// Complete the handshake
    pub fn accept(&self) {
        self.send(&ServerEvent::Connected(json!({"socketId": "test-socket"})));
    }

    pub fn alert(&self, alert: Alert) {
        self.send(&ServerEvent::Alert(alert));
    }

    pub fn close(&self, reason: &str) {
        let _ = self
            .to_client
            .send(Ok(InboundFrame::Closed(Some(reason.to_string()))));
    }

    pub async fn recv(&mut self) -> Option<ClientEvent> {
        let text = tokio::time::timeout(Duration::from_secs(300), self.from_client.recv())
            .await
            .ok()??;
        Some(ClientEvent::from_json(&text).unwrap())
    }

    pub fn try_recv(&mut self) -> Option<ClientEvent> {
        self.from_client
            .try_recv()
            .ok()
            .map(|text| ClientEvent::from_json(&text).unwrap())
    }
}

/// Connector that hands every accepted connection to the test
pub struct MockConnector {
    opens: AtomicU32,
    refuse_next: AtomicU32,
    tokens: Mutex<Vec<String>>,
    accepted: mpsc::UnboundedSender<ServerConnection>,
}

impl MockConnector {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ServerConnection>) {
        let (accepted, connections) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            opens: AtomicU32::new(0),
            refuse_next: AtomicU32::new(0),
            tokens: Mutex::new(Vec::new()),
            accepted,
        });
        (connector, connections)
    }

    /// Refuse the next `n` open attempts
    pub fn refuse_next(&self, n: u32) {
        self.refuse_next.store(n, Ordering::SeqCst);
    }

    pub fn opens(&self) -> u32 {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn tokens(&self) -> Vec<String> {
        self.tokens.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn open(&self, token: &str) -> Result<Transport> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.tokens.lock().unwrap().push(token.to_string());

        let refused = self
            .refuse_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(AlertError::Transport("connection refused".into()));
        }

        let (to_client, inbound) = mpsc::unbounded_channel::<Result<InboundFrame>>();
        let (outbound, from_client) = mpsc::unbounded_channel::<String>();

        let sink = sink::unfold(outbound, |outbound, frame: String| async move {
            outbound.send(frame).map_err(|_| AlertError::Closed)?;
            Ok::<_, AlertError>(outbound)
        });
        let stream = stream::unfold(inbound, |mut inbound| async move {
            inbound.recv().await.map(|frame| (frame, inbound))
        });

        let _ = self.accepted.send(ServerConnection {
            to_client,
            from_client,
        });

        Ok(Transport::new(Box::pin(sink), stream.boxed()))
    }
}

pub async fn next_connection(
    connections: &mut mpsc::UnboundedReceiver<ServerConnection>,
) -> ServerConnection {
    tokio::time::timeout(Duration::from_secs(300), connections.recv())
        .await
        .expect("no connection opened")
        .expect("connector dropped")
}

#[derive(Debug, Clone, PartialEq)]
pub enum ListenerEvent {
    Connected(Value),
    Alert(Alert),
    Disconnected(String),
    ConnectError { attempt: u32, terminal: bool },
}

/// Listener that forwards every callback to a channel
pub struct RecordingListener {
    events: mpsc::UnboundedSender<ListenerEvent>,
}

impl RecordingListener {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ListenerEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { events }), rx)
    }
}

impl ConnectionListener for RecordingListener {
    fn on_connect(&self, metadata: &Value) {
        let _ = self.events.send(ListenerEvent::Connected(metadata.clone()));
    }

    fn on_alert(&self, alert: Alert) {
        let _ = self.events.send(ListenerEvent::Alert(alert));
    }

    fn on_disconnect(&self, reason: &str) {
        let _ = self.events.send(ListenerEvent::Disconnected(reason.to_string()));
    }

    fn on_connect_error(&self, _message: &str, attempt: u32, terminal: bool) {
        let _ = self
            .events
            .send(ListenerEvent::ConnectError { attempt, terminal });
    }
}

pub async fn next_event(events: &mut mpsc::UnboundedReceiver<ListenerEvent>) -> ListenerEvent {
    tokio::time::timeout(Duration::from_secs(300), events.recv())
        .await
        .expect("no listener event")
        .expect("listener dropped")
}

pub fn mrl_violation() -> Alert {
    Alert::new("MRL_VIOLATION", Severity::Critical, "X", "Y")
        .with_field("animalId", "TAG-0042")
}

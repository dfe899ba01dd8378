/// Client-side alert state for one signed-in session
///
/// Turns the connection manager's alert stream into:
/// 1. A bounded newest-first notification list
/// 2. An unread counter
/// 3. Severity-styled toasts
/// 4. Acknowledgments sent back through the connection manager
///
/// The unread counter is kept on its own. Evicting an unread notification
/// past the history limit does not lower it, so it can exceed the unread
/// entries still retained.
pub mod presentation;

pub use presentation::{Toast, ToastPosition, ToastStyle};

use crate::models::{Alert, Notification};
use crate::session::SessionStore;
use crate::websocket::{ConnectOutcome, ConnectionListener, ConnectionManager};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const TOAST_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Maximum notifications retained, oldest evicted first
    pub history_limit: usize,
    /// Delay between `start` and the actual connect, collapsing duplicate starts
    pub start_debounce: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            history_limit: 50,
            start_debounce: Duration::from_millis(100),
        }
    }
}

/// Lifecycle of the store's alert stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorePhase {
    Idle,
    Connecting,
    Live,
    Reconnecting,
    /// Reconnection gave up; only a new `start` recovers
    Failed,
}

#[derive(Clone)]
pub struct NotificationStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    connections: ConnectionManager,
    options: StoreOptions,
    state: Mutex<StoreState>,
    toasts: broadcast::Sender<Toast>,
    unread: watch::Sender<usize>,
    connected: watch::Sender<bool>,
    pending_start: Mutex<Option<JoinHandle<()>>>,
}

struct StoreState {
    notifications: VecDeque<Notification>,
    unread_count: usize,
    phase: StorePhase,
}

impl NotificationStore {
    pub fn new(connections: ConnectionManager, options: StoreOptions) -> Self {
        let (toasts, _) = broadcast::channel(TOAST_CHANNEL_CAPACITY);
        let (unread, _) = watch::channel(0);
        let (connected, _) = watch::channel(false);

        Self {
            inner: Arc::new(StoreInner {
                connections,
                state: Mutex::new(StoreState {
                    notifications: VecDeque::with_capacity(options.history_limit),
                    unread_count: 0,
                    phase: StorePhase::Idle,
                }),
                options,
                toasts,
                unread,
                connected,
                pending_start: Mutex::new(None),
            }),
        }
    }

    /// Begin streaming alerts for the signed-in user.
    ///
    /// Reads the token once. Without a token nothing is scheduled and `false`
    /// is returned. Otherwise the connect runs after the start debounce; a
    /// second `start` inside that window replaces the first.
    pub fn start(&self, session: &dyn SessionStore) -> bool {
        let Some(token) = session.token() else {
            debug!("No session token, alert stream not started");
            return false;
        };

        let connections = self.inner.connections.clone();
        let listener: Arc<dyn ConnectionListener> = Arc::new(StoreListener {
            store: Arc::downgrade(&self.inner),
        });
        let debounce = self.inner.options.start_debounce;

        let mut pending = self.inner.pending_start.lock();
        if let Some(previous) = pending.take() {
            debug!("Collapsing duplicate alert stream start");
            previous.abort();
        }

        if !connections.is_connected() {
            self.inner.set_phase(StorePhase::Connecting);
        }

        let store = Arc::downgrade(&self.inner);
        *pending = Some(tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            let outcome = connections.connect(&token, listener).await;

            // A live connection from an earlier start keeps its session
            if outcome == ConnectOutcome::AlreadyConnected {
                if let Some(store) = store.upgrade() {
                    store.set_phase(StorePhase::Live);
                    store.connected.send_replace(true);
                }
            }
        }));

        true
    }

    /// Tear the stream down. Safe to call on every exit path, repeatedly.
    pub async fn stop(&self) {
        let pending = self.inner.pending_start.lock().take();
        if let Some(pending) = pending {
            pending.abort();
            // Wait it out so a connect racing the abort cannot outlive this call
            let _ = pending.await;
        }

        self.inner.connections.disconnect().await;
        self.inner.set_phase(StorePhase::Idle);
        self.inner.connected.send_replace(false);
        debug!("Alert stream stopped");
    }

    /// Record an alert as a new unread notification and emit its toast.
    ///
    /// This is the listener entry point and the only way the unread count grows.
    /// Returns the new notification's id.
    pub fn on_alert_received(&self, alert: Alert) -> String {
        self.inner.on_alert_received(alert)
    }

    /// Mark one notification read and acknowledge it to the server.
    ///
    /// Unknown ids change nothing and send nothing. Returns whether the id was found.
    pub fn mark_as_read(&self, notification_id: &str) -> bool {
        let alert_type = {
            let mut guard = self.inner.state.lock();
            let StoreState {
                notifications,
                unread_count,
                ..
            } = &mut *guard;

            let Some(notification) = notifications.iter_mut().find(|n| n.id == notification_id)
            else {
                debug!(notification_id, "mark_as_read for unknown notification");
                return false;
            };

            notification.read = true;
            *unread_count = unread_count.saturating_sub(1);
            self.inner.unread.send_replace(*unread_count);
            notification.alert.alert_type.clone()
        };

        self.inner
            .connections
            .acknowledge(&alert_type, notification_id);
        true
    }

    /// Mark every retained notification read. Local only, no acknowledgments.
    pub fn mark_all_as_read(&self) {
        let mut state = self.inner.state.lock();
        for notification in state.notifications.iter_mut() {
            notification.read = true;
        }
        state.unread_count = 0;
        self.inner.unread.send_replace(0);
    }

    /// Drop all notifications. The server is not told.
    pub fn clear_all(&self) {
        let mut state = self.inner.state.lock();
        state.notifications.clear();
        state.unread_count = 0;
        self.inner.unread.send_replace(0);
    }

    /// Retained notifications, newest first
    pub fn notifications(&self) -> Vec<Notification> {
        self.inner.state.lock().notifications.iter().cloned().collect()
    }

    pub fn unread_count(&self) -> usize {
        self.inner.state.lock().unread_count
    }

    pub fn is_connected(&self) -> bool {
        *self.inner.connected.borrow()
    }

    pub fn phase(&self) -> StorePhase {
        self.inner.state.lock().phase
    }

    pub fn subscribe_toasts(&self) -> broadcast::Receiver<Toast> {
        self.inner.toasts.subscribe()
    }

    pub fn subscribe_unread(&self) -> watch::Receiver<usize> {
        self.inner.unread.subscribe()
    }

    pub fn subscribe_connected(&self) -> watch::Receiver<bool> {
        self.inner.connected.subscribe()
    }
}

impl StoreInner {
    fn set_phase(&self, phase: StorePhase) {
        let mut state = self.state.lock();
        if state.phase != phase {
            debug!(from = ?state.phase, to = ?phase, "Alert stream phase changed");
            state.phase = phase;
        }
    }

    fn on_alert_received(&self, alert: Alert) -> String {
        let received_at = Utc::now();

        let toast = {
            let mut state = self.state.lock();
            let id = state.next_id(&alert, received_at);
            let notification = Notification::new(id, alert, received_at);
            let toast = presentation::present(&notification);

            state.notifications.push_front(notification);
            state.notifications.truncate(self.options.history_limit);
            state.unread_count += 1;
            self.unread.send_replace(state.unread_count);
            toast
        };

        let id = toast.notification_id.clone();
        // No subscribers is fine: toasts are fire and forget
        let _ = self.toasts.send(toast);
        id
    }
}

impl StoreState {
    /// `{type}_{millis}`, suffixed when the same type already arrived in that millisecond
    fn next_id(&self, alert: &Alert, received_at: DateTime<Utc>) -> String {
        let base = Notification::base_id(alert, received_at);
        let taken = |id: &str| self.notifications.iter().any(|n| n.id == id);

        if !taken(&base) {
            return base;
        }

        let mut n = 1;
        loop {
            let candidate = format!("{}_{}", base, n);
            if !taken(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }
}

/// Routes connection callbacks into a store without keeping it alive
struct StoreListener {
    store: Weak<StoreInner>,
}

impl ConnectionListener for StoreListener {
    fn on_connect(&self, metadata: &Value) {
        let Some(store) = self.store.upgrade() else {
            return;
        };
        info!(metadata = %metadata, "Alert stream live");
        store.set_phase(StorePhase::Live);
        store.connected.send_replace(true);
    }

    fn on_alert(&self, alert: Alert) {
        if let Some(store) = self.store.upgrade() {
            store.on_alert_received(alert);
        }
    }

    fn on_disconnect(&self, reason: &str) {
        let Some(store) = self.store.upgrade() else {
            return;
        };
        warn!(reason, "Alert stream disconnected");
        store.set_phase(StorePhase::Reconnecting);
        store.connected.send_replace(false);
    }

    fn on_connect_error(&self, message: &str, attempt: u32, terminal: bool) {
        let Some(store) = self.store.upgrade() else {
            return;
        };
        if terminal {
            warn!(attempt, error = message, "Alert stream failed permanently");
            store.set_phase(StorePhase::Failed);
            store.connected.send_replace(false);
        } else if store.state.lock().phase == StorePhase::Live {
            store.set_phase(StorePhase::Reconnecting);
        }
    }
}

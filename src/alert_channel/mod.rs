//! AlertChannel - Real-time `admin_alert` delivery
//!
//! ## Responsibilities
//!
//! - Owning the push connection (explicit open/close, no process-wide
//!   singleton)
//! - Reconnecting after transport loss. A Socket.IO session reconnects by
//!   itself and only reports loss and recovery; other transports end their
//!   stream and the channel reconnects using the transport's policy
//! - Delivering each `admin_alert` to every active subscriber once, in
//!   emission order
//!
//! ## Delivery
//!
//! At-most-once, best-effort. Alerts emitted while disconnected are lost and
//! alerts carry no id, so nothing is replayed or deduplicated.
//!
//! ## Teardown
//!
//! A subscriber slot is locked for the duration of each handler call.
//! `Subscription::unsubscribe` deactivates the slot, then takes the same
//! lock, so it returns only after any in-flight call has finished, and no
//! call starts afterwards.

mod socketio;
mod sse;
mod transport;

pub use socketio::{SocketIoTransport, SESSION_LOST_EVENT, SESSION_RESTORED_EVENT};
pub use sse::{SseDecoder, DEFAULT_EVENT, MAX_LINE_BYTES};
pub use transport::{EventStreamTransport, FrameStream, PushFrame, PushTransport, ReconnectPolicy};

use crate::models::AlertEvent;
use futures::StreamExt;
use std::cell::Cell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Event name carrying operator alerts
pub const ADMIN_ALERT_EVENT: &str = "admin_alert";

/// Connection state of the push channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected,
    Closed,
}

type Handler = Box<dyn FnMut(&AlertEvent) + Send>;

thread_local! {
    /// Subscriber whose handler is running on this thread
    static DISPATCHING: Cell<Option<u64>> = const { Cell::new(None) };
}

struct SubscriberSlot {
    id: u64,
    active: AtomicBool,
    handler: Mutex<Option<Handler>>,
}

struct ChannelInner {
    subscribers: RwLock<Vec<Arc<SubscriberSlot>>>,
    next_id: AtomicU64,
    state_tx: watch::Sender<ConnectionState>,
}

impl ChannelInner {
    fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_replace(state);
    }

    fn handle_frame(&self, frame: PushFrame) {
        match frame.event.as_str() {
            ADMIN_ALERT_EVENT => {}
            SESSION_LOST_EVENT => {
                warn!("Alert session lost, transport is reconnecting");
                self.set_state(ConnectionState::Disconnected);
                return;
            }
            SESSION_RESTORED_EVENT => {
                self.set_state(ConnectionState::Connected);
                return;
            }
            other => {
                debug!(event = %other, "Ignoring non-alert frame");
                return;
            }
        }

        match serde_json::from_str::<AlertEvent>(&frame.data) {
            Ok(alert) => self.dispatch(&alert),
            Err(e) => warn!(error = %e, data = %frame.data, "Dropping undecodable admin_alert"),
        }
    }

    fn dispatch(&self, alert: &AlertEvent) {
        let slots: Vec<Arc<SubscriberSlot>> = self
            .subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();

        debug!(subscribers = slots.len(), "Dispatching admin_alert");

        for slot in slots {
            let mut handler = slot.handler.lock().unwrap_or_else(|e| e.into_inner());
            if !slot.active.load(Ordering::Acquire) {
                continue;
            }
            let Some(handler) = handler.as_mut() else {
                continue;
            };

            DISPATCHING.with(|d| d.set(Some(slot.id)));
            let result = catch_unwind(AssertUnwindSafe(|| handler(alert)));
            DISPATCHING.with(|d| d.set(None));

            if result.is_err() {
                slot.active.store(false, Ordering::Release);
                error!(subscription_id = slot.id, "Alert handler panicked, subscription deactivated");
            }
        }
    }

    fn remove(&self, id: u64) {
        let mut subscribers = self.subscribers.write().unwrap_or_else(|e| e.into_inner());
        subscribers.retain(|s| s.id != id);
    }
}

/// Handle to an active subscription
///
/// Dropping it unsubscribes.
pub struct Subscription {
    channel: Weak<ChannelInner>,
    slot: Arc<SubscriberSlot>,
}

impl Subscription {
    pub fn is_active(&self) -> bool {
        self.slot.active.load(Ordering::Acquire)
    }

    /// Stop delivery to this subscriber.
    ///
    /// When this returns, the handler is not running and will not run again.
    pub fn unsubscribe(self) {
        self.detach();
    }

    fn detach(&self) {
        let was_active = self.slot.active.swap(false, Ordering::AcqRel);
        if let Some(channel) = self.channel.upgrade() {
            channel.remove(self.slot.id);
        }

        let inside_own_handler = DISPATCHING.with(|d| d.get() == Some(self.slot.id));
        if inside_own_handler {
            // the running call is the caller itself; the flag stops later calls
            return;
        }

        let handler = self
            .slot
            .handler
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        drop(handler);

        if was_active {
            debug!(subscription_id = self.slot.id, "Alert subscription closed");
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach();
    }
}

/// AlertChannel instance
pub struct AlertChannel {
    inner: Arc<ChannelInner>,
    state_rx: watch::Receiver<ConnectionState>,
    shutdown_tx: watch::Sender<bool>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl AlertChannel {
    /// Open the channel over a transport and start receiving.
    ///
    /// Must be called within a tokio runtime.
    pub fn open(transport: Arc<dyn PushTransport>) -> Self {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let inner = Arc::new(ChannelInner {
            subscribers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            state_tx,
        });

        info!(endpoint = %transport.describe(), "Opening alert channel");
        let pump = tokio::spawn(run_pump(transport, inner.clone(), shutdown_rx));

        Self {
            inner,
            state_rx,
            shutdown_tx,
            pump: Mutex::new(Some(pump)),
        }
    }

    /// Register a handler for every subsequent `admin_alert`
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: FnMut(&AlertEvent) + Send + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let slot = Arc::new(SubscriberSlot {
            id,
            active: AtomicBool::new(true),
            handler: Mutex::new(Some(Box::new(handler))),
        });

        self.inner
            .subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(slot.clone());

        debug!(subscription_id = id, "Alert subscription opened");

        Subscription {
            channel: Arc::downgrade(&self.inner),
            slot,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Receiver observing connection state changes
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Stop receiving and reconnecting; waits for the pump to exit
    pub async fn close(&self) {
        self.shutdown_tx.send_replace(true);
        let pump = self.pump.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(pump) = pump {
            if let Err(e) = pump.await {
                error!(error = %e, "Alert pump terminated abnormally");
            }
        }
        self.inner.set_state(ConnectionState::Closed);
        info!("Alert channel closed");
    }
}

impl Drop for AlertChannel {
    fn drop(&mut self) {
        self.shutdown_tx.send_replace(true);
    }
}

async fn run_pump(
    transport: Arc<dyn PushTransport>,
    inner: Arc<ChannelInner>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let policy = transport.reconnect_policy();
    let mut attempt: u32 = 0;

    'outer: loop {
        if *shutdown_rx.borrow() {
            break;
        }

        inner.set_state(ConnectionState::Connecting);
        let connected = tokio::select! {
            _ = shutdown_rx.changed() => break 'outer,
            result = transport.connect() => result,
        };

        match connected {
            Ok(mut frames) => {
                attempt = 0;
                inner.set_state(ConnectionState::Connected);
                info!(endpoint = %transport.describe(), "Alert channel connected");

                loop {
                    let next = tokio::select! {
                        _ = shutdown_rx.changed() => break 'outer,
                        next = frames.next() => next,
                    };
                    match next {
                        Some(Ok(frame)) => inner.handle_frame(frame),
                        Some(Err(e)) => {
                            warn!(error = %e, "Alert stream broken");
                            break;
                        }
                        None => {
                            info!("Alert stream ended by server");
                            break;
                        }
                    }
                }
            }
            Err(e) => {
                warn!(endpoint = %transport.describe(), attempt = attempt, error = %e, "Alert channel connect failed");
            }
        }

        inner.set_state(ConnectionState::Disconnected);

        if policy.max_attempts.is_some_and(|max| attempt >= max) {
            error!(attempts = attempt, "Giving up on alert channel reconnection");
            break;
        }

        let delay = policy.delay(attempt);
        attempt = attempt.saturating_add(1);
        debug!(delay_ms = delay.as_millis() as u64, "Reconnecting alert channel");

        tokio::select! {
            _ = shutdown_rx.changed() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    inner.set_state(ConnectionState::Closed);
}

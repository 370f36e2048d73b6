//! Broker connection lifecycle with bounded, cancellable reconnection
//!
//! # Architecture
//!
//! Two tasks cooperate:
//! - a **worker** per attempt: connects, subscribes, then forwards inbound
//!   messages until the session ends or the attempt is cancelled;
//! - a **supervisor** (the retry timer): spawns a worker, awaits its
//!   `JoinHandle`, and only then decides whether to start the next attempt.
//!
//! Awaiting the handle is what guarantees two attempts never race on the same
//! client. Cancellation is a [`CancellationToken`] checked by both tasks at
//! their decision points.
//!
//! The retry counter, the should-retry flag and the reported state belong to
//! the manager; outside code only changes them through [`ConnectionManager::start`]
//! and [`ConnectionManager::cancel`].

pub mod mqtt;
pub mod transport;

pub use mqtt::MqttTransport;
pub use transport::{Transport, TransportEvent};

use crate::config::ConnectionConfig;
use crate::events::{ConnectionEvent, EventBus};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;

/// Reported connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Waiting out the retry interval after a failure
    Retrying,
    /// Retries exhausted; stays here until started again
    Failed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "Disconnected"),
            ConnectionState::Connecting => write!(f, "Connecting"),
            ConnectionState::Connected => write!(f, "Connected"),
            ConnectionState::Retrying => write!(f, "Retrying"),
            ConnectionState::Failed => write!(f, "Failed"),
        }
    }
}

/// How a single connection attempt ended
#[derive(Debug, Clone, PartialEq, Eq)]
enum AttemptOutcome {
    /// Clean disconnect; no retry
    Closed,
    /// Stopped by `cancel()`
    Cancelled,
    /// Connect failure or unexpected disconnect; goes down the retry path
    Failed(String),
}

/// Owns one logical broker connection
pub struct ConnectionManager<T: Transport> {
    shared: Arc<Shared<T>>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

struct Shared<T> {
    config: ConnectionConfig,
    transport: Mutex<T>,
    events: EventBus<ConnectionEvent>,
    should_retry: AtomicBool,
    retry_attempt: AtomicU32,
    state: watch::Sender<ConnectionState>,
    cancel: parking_lot::Mutex<CancellationToken>,
}

impl<T: Transport> ConnectionManager<T> {
    pub fn new(config: ConnectionConfig, transport: T) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            shared: Arc::new(Shared {
                config,
                transport: Mutex::new(transport),
                events: EventBus::new(),
                should_retry: AtomicBool::new(false),
                retry_attempt: AtomicU32::new(0),
                state,
                cancel: parking_lot::Mutex::new(CancellationToken::new()),
            }),
            supervisor: Mutex::new(None),
        }
    }

    /// Subscribe to connection events
    pub fn events(&self) -> mpsc::UnboundedReceiver<ConnectionEvent> {
        self.shared.events.subscribe()
    }

    /// Watch reported state transitions
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn retry_attempt(&self) -> u32 {
        self.shared.retry_attempt.load(Ordering::SeqCst)
    }

    pub fn retry_limit(&self) -> u32 {
        self.shared.config.retries_max
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.shared.config
    }

    /// Arm automatic retry and start connecting
    ///
    /// Also the re-arm operation after retries are exhausted. No-op while a
    /// previous start is still active.
    pub async fn start(&self) {
        let mut supervisor = self.supervisor.lock().await;
        if supervisor.as_ref().is_some_and(|handle| !handle.is_finished()) {
            log::debug!("Connection to {} already active", self.shared.config.endpoint());
            return;
        }
        if let Some(previous) = supervisor.take() {
            if let Err(err) = previous.await {
                log::warn!("Previous connection supervisor ended abnormally: {}", err);
            }
        }

        let token = CancellationToken::new();
        *self.shared.cancel.lock() = token.clone();
        self.shared.should_retry.store(true, Ordering::SeqCst);

        log::info!("Connecting to {}", self.shared.config.endpoint());
        *supervisor = Some(tokio::spawn(supervise(Arc::clone(&self.shared), token)));
    }

    /// User-initiated disconnect
    ///
    /// Disarms retry, resets the counter, stops the client loop and waits for
    /// both tasks to finish, so no pending retry can bring the connection back.
    pub async fn cancel(&self) {
        let mut supervisor = self.supervisor.lock().await;
        self.shared.should_retry.store(false, Ordering::SeqCst);
        self.shared.retry_attempt.store(0, Ordering::SeqCst);
        self.shared.cancel.lock().cancel();

        if let Some(handle) = supervisor.take() {
            if let Err(err) = handle.await {
                log::warn!("Connection supervisor ended abnormally: {}", err);
            }
        }

        self.shared.set_state(ConnectionState::Disconnected);
        log::info!("Connection to {} cancelled", self.shared.config.endpoint());
    }
}

impl<T: Transport> Drop for ConnectionManager<T> {
    fn drop(&mut self) {
        self.shared.should_retry.store(false, Ordering::SeqCst);
        self.shared.cancel.lock().cancel();
    }
}

impl<T> Shared<T> {
    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            log::debug!("Connection state: {} -> {}", previous, state);
        }
    }

    fn reset_retries(&self) {
        self.retry_attempt.store(0, Ordering::SeqCst);
    }

    fn connect_failed(&self, reason: String) -> AttemptOutcome {
        log::warn!("Connection to {} failed: {}", self.config.endpoint(), reason);
        self.set_state(ConnectionState::Disconnected);
        self.events.emit(ConnectionEvent::ConnectFailed {
            reason: reason.clone(),
        });
        AttemptOutcome::Failed(reason)
    }

    fn connection_lost(&self, reason_code: u8, reason: String) -> AttemptOutcome {
        log::warn!("Connection to {} lost: {}", self.config.endpoint(), reason);
        self.set_state(ConnectionState::Disconnected);
        self.events.emit(ConnectionEvent::Disconnected {
            reason_code,
            reason: reason.clone(),
        });
        AttemptOutcome::Failed(reason)
    }

    /// Count a failed attempt. Returns true if another attempt should follow.
    fn register_retry(&self) -> bool {
        if !self.should_retry.load(Ordering::SeqCst) {
            log::info!("Retry to {} cancelled", self.config.endpoint());
            self.reset_retries();
            return false;
        }

        let count = self.retry_attempt.fetch_add(1, Ordering::SeqCst) + 1;
        let limit = self.config.retries_max;
        self.events.emit(ConnectionEvent::RetriesProgress { count, limit });

        if count >= limit {
            log::error!(
                "Giving up on {} after {} failed attempts; start again to retry",
                self.config.endpoint(),
                count
            );
            self.reset_retries();
            self.set_state(ConnectionState::Failed);
            return false;
        }

        log::info!("Retrying {} ({}/{})", self.config.endpoint(), count, limit);
        self.set_state(ConnectionState::Retrying);
        true
    }
}

async fn supervise<T: Transport>(shared: Arc<Shared<T>>, token: CancellationToken) {
    loop {
        let worker = tokio::spawn(run_attempt(Arc::clone(&shared), token.clone()));
        let outcome = match worker.await {
            Ok(outcome) => outcome,
            Err(err) => AttemptOutcome::Failed(format!("connection worker aborted: {}", err)),
        };

        match outcome {
            AttemptOutcome::Closed => {
                shared.reset_retries();
                return;
            }
            AttemptOutcome::Cancelled => return,
            AttemptOutcome::Failed(_) => {
                if !shared.register_retry() {
                    return;
                }

                let cancelled = tokio::select! {
                    _ = token.cancelled() => true,
                    _ = time::sleep(shared.config.retry_interval()) => false,
                };
                if cancelled || !shared.should_retry.load(Ordering::SeqCst) {
                    shared.reset_retries();
                    return;
                }
            }
        }
    }
}

async fn run_attempt<T: Transport>(shared: Arc<Shared<T>>, token: CancellationToken) -> AttemptOutcome {
    let mut transport = shared.transport.lock().await;
    if token.is_cancelled() {
        return AttemptOutcome::Cancelled;
    }
    shared.set_state(ConnectionState::Connecting);

    let connected = tokio::select! {
        _ = token.cancelled() => None,
        result = transport.connect() => Some(result),
    };
    let info = match connected {
        None => {
            let _ = transport.disconnect().await;
            return AttemptOutcome::Cancelled;
        }
        Some(Err(err)) => return shared.connect_failed(err.to_string()),
        Some(Ok(info)) => info,
    };

    for topic in &shared.config.subscriptions {
        if let Err(err) = transport.subscribe(topic).await {
            let _ = transport.disconnect().await;
            return shared.connect_failed(err.to_string());
        }
        log::debug!("Subscribed to '{}'", topic);
    }

    shared.reset_retries();
    shared.set_state(ConnectionState::Connected);
    log::info!("Connected to {} as '{}'", info.endpoint, info.client_id);
    shared.events.emit(ConnectionEvent::Connected(info));

    loop {
        let next = tokio::select! {
            _ = token.cancelled() => None,
            next = transport.next_event() => Some(next),
        };

        match next {
            None => {
                if let Err(err) = transport.disconnect().await {
                    log::debug!("Disconnect after cancel failed: {}", err);
                }
                shared.set_state(ConnectionState::Disconnected);
                shared.events.emit(ConnectionEvent::Disconnected {
                    reason_code: 0,
                    reason: "cancelled".to_string(),
                });
                return AttemptOutcome::Cancelled;
            }
            Some(Ok(TransportEvent::Message { topic, payload })) => {
                log::trace!("Message on '{}' ({} bytes)", topic, payload.len());
                shared
                    .events
                    .emit(ConnectionEvent::MessageReceived { topic, payload });
            }
            Some(Ok(TransportEvent::Disconnected { reason_code: 0 })) => {
                log::info!("Disconnected from {}", shared.config.endpoint());
                shared.set_state(ConnectionState::Disconnected);
                shared.events.emit(ConnectionEvent::Disconnected {
                    reason_code: 0,
                    reason: "clean disconnect".to_string(),
                });
                return AttemptOutcome::Closed;
            }
            Some(Ok(TransportEvent::Disconnected { reason_code })) => {
                return shared.connection_lost(
                    reason_code,
                    format!("unexpected disconnect (reason code {})", reason_code),
                );
            }
            Some(Err(err)) => return shared.connection_lost(1, err.to_string()),
        }
    }
}

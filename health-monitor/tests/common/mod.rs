//! Scripted broker used by the integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use health_monitor::{
    ClientInfo, ConnectionConfig, ConnectionState, Transport, TransportError, TransportEvent,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// Upper bound for any single wait in a test
pub const WAIT: Duration = Duration::from_secs(120);

#[derive(Debug, Default)]
struct BrokerState {
    /// Outcome of each upcoming connect; refused once exhausted
    connects: VecDeque<bool>,
    connect_attempts: u32,
    disconnects: u32,
    subscriptions: Vec<String>,
}

/// Test-side handle to a [`FakeTransport`]
#[derive(Clone)]
pub struct FakeBroker {
    state: Arc<Mutex<BrokerState>>,
    inbound: mpsc::UnboundedSender<Result<TransportEvent, TransportError>>,
}

impl FakeBroker {
    /// Queue the outcome of the next connect attempts
    pub fn script_connects(&self, outcomes: &[bool]) {
        self.state.lock().connects.extend(outcomes.iter().copied());
    }

    pub fn publish(&self, topic: &str, payload: &[u8]) {
        self.send(Ok(TransportEvent::Message {
            topic: topic.to_string(),
            payload: payload.to_vec(),
        }));
    }

    pub fn drop_session(&self, reason_code: u8) {
        self.send(Ok(TransportEvent::Disconnected { reason_code }));
    }

    pub fn fail_session(&self, reason: &str) {
        self.send(Err(TransportError::ConnectionLost(reason.to_string())));
    }

    pub fn connect_attempts(&self) -> u32 {
        self.state.lock().connect_attempts
    }

    pub fn disconnects(&self) -> u32 {
        self.state.lock().disconnects
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.state.lock().subscriptions.clone()
    }

    fn send(&self, event: Result<TransportEvent, TransportError>) {
        let _ = self.inbound.send(event);
    }
}

pub struct FakeTransport {
    state: Arc<Mutex<BrokerState>>,
    inbound: mpsc::UnboundedReceiver<Result<TransportEvent, TransportError>>,
}

pub fn fake_broker() -> (FakeBroker, FakeTransport) {
    let state = Arc::new(Mutex::new(BrokerState::default()));
    let (tx, rx) = mpsc::unbounded_channel();
    (
        FakeBroker {
            state: Arc::clone(&state),
            inbound: tx,
        },
        FakeTransport { state, inbound: rx },
    )
}

#[async_trait]
impl Transport for FakeTransport {
    async fn connect(&mut self) -> Result<ClientInfo, TransportError> {
        let mut state = self.state.lock();
        state.connect_attempts += 1;
        if state.connects.pop_front().unwrap_or(false) {
            Ok(ClientInfo {
                client_id: "fake".to_string(),
                endpoint: "fake:1883".to_string(),
                connected_at: Utc::now(),
            })
        } else {
            Err(TransportError::ConnectionRefused {
                endpoint: "fake:1883".to_string(),
                reason: "refused".to_string(),
            })
        }
    }

    async fn subscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        self.state.lock().subscriptions.push(topic.to_string());
        Ok(())
    }

    async fn next_event(&mut self) -> Result<TransportEvent, TransportError> {
        match self.inbound.recv().await {
            Some(event) => event,
            None => std::future::pending().await,
        }
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        self.state.lock().disconnects += 1;
        Ok(())
    }
}

pub fn test_config(retries_max: u32) -> ConnectionConfig {
    ConnectionConfig::new()
        .with_endpoint("fake", 1883)
        .with_subscriptions(vec!["ppss/health".to_string()])
        .with_retries_max(retries_max)
        .with_retry_interval(Duration::from_secs(3))
}

/// Await `future`, failing the test if it takes longer than [`WAIT`]
pub async fn within<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(WAIT, future)
        .await
        .expect("timed out waiting in test")
}

pub async fn wait_for_state(states: &mut watch::Receiver<ConnectionState>, wanted: ConnectionState) {
    within(states.wait_for(|state| *state == wanted))
        .await
        .expect("state channel closed");
}

/// Receive events until one matches, returning everything seen on the way
pub async fn collect_until<E, P>(events: &mut mpsc::UnboundedReceiver<E>, mut done: P) -> Vec<E>
where
    P: FnMut(&E) -> bool,
{
    let mut seen = Vec::new();
    loop {
        let event = within(events.recv()).await.expect("event channel closed");
        let finished = done(&event);
        seen.push(event);
        if finished {
            return seen;
        }
    }
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

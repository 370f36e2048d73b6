//! Event types and the observer channel used to publish them
//!
//! Components never call into the view layer. They publish events on an
//! [`EventBus`]; each subscriber gets its own unbounded channel, receives
//! events in emission order, and can never block the emitter.

use crate::evaluator::StateSet;
use crate::seats::SeatEntry;
use crate::types::Timestamp;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Fan-out of events to any number of subscribers
///
/// Cloning a bus yields another handle to the same subscriber list.
/// Subscribers whose receiver has been dropped are pruned on the next emit.
pub struct EventBus<E> {
    subscribers: Arc<Mutex<Vec<mpsc::UnboundedSender<E>>>>,
}

impl<E: Clone> EventBus<E> {
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Register a new subscriber
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<E> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Deliver `event` to every live subscriber
    ///
    /// The subscriber lock is held for the whole fan-out, so concurrent
    /// emitters cannot interleave and every subscriber sees the same order.
    pub fn emit(&self, event: E) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

impl<E: Clone> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Clone for EventBus<E> {
    fn clone(&self) -> Self {
        Self {
            subscribers: Arc::clone(&self.subscribers),
        }
    }
}

impl<E> fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscribers.lock().len())
            .finish()
    }
}

/// Details of an established broker session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientInfo {
    pub client_id: String,
    /// `host:port` of the broker
    pub endpoint: String,
    pub connected_at: Timestamp,
}

/// Connection lifecycle and inbound traffic
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ConnectionEvent {
    Connected(ClientInfo),

    ConnectFailed { reason: String },

    /// `reason_code` 0 is a clean disconnect; anything else is unexpected
    Disconnected { reason_code: u8, reason: String },

    /// Raw inbound message, forwarded without interpretation
    MessageReceived { topic: String, payload: Vec<u8> },

    /// Retry counter after a failed attempt; `count == limit` means retries are exhausted
    RetriesProgress { count: u32, limit: u32 },
}

/// Heartbeat watchdog events
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HeartbeatEvent {
    Tick { heartbeat: String, elapsed: u32 },

    /// Terminal until the heartbeat is reset
    Timeout { heartbeat: String },
}

/// State changes produced by message dispatch
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HealthEvent {
    MonitorUpdated {
        monitor: String,
        states: BTreeMap<String, StateSet>,
    },

    SeatsUpdated { entries: Vec<SeatEntry> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_delivered_in_order_to_every_subscriber() {
        let bus: EventBus<u32> = EventBus::new();
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        for i in 0..5 {
            bus.emit(i);
        }

        for rx in [&mut first, &mut second] {
            let received: Vec<u32> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
            assert_eq!(received, vec![0, 1, 2, 3, 4]);
        }
    }

    #[test]
    fn test_dropped_subscribers_are_pruned() {
        let bus: EventBus<&'static str> = EventBus::new();
        let kept = bus.subscribe();
        drop(bus.subscribe());
        assert_eq!(bus.subscriber_count(), 2);

        bus.emit("ping");
        assert_eq!(bus.subscriber_count(), 1);
        drop(kept);
    }

    #[test]
    fn test_clones_share_subscribers() {
        let bus: EventBus<u8> = EventBus::new();
        let mut rx = bus.subscribe();
        bus.clone().emit(7);
        assert_eq!(rx.try_recv().unwrap(), 7);
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = HeartbeatEvent::Tick {
            heartbeat: "hb1".to_string(),
            elapsed: 3,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "tick");
        assert_eq!(json["elapsed"], 3);
    }
}

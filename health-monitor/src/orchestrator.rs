//! Health orchestrator: routes telemetry commands to monitors, heartbeats
//! and the seat decoder
//!
//! Dispatch is fan-out. A command is checked against the monitors, the
//! heartbeats and the seat decoder independently, and every match is
//! handled. Commands matching nothing are ignored.

use crate::config::{parse_int_literal, HealthConfig};
use crate::events::{ConnectionEvent, EventBus, HealthEvent, HeartbeatEvent};
use crate::evaluator::StateSet;
use crate::heartbeat::{Heartbeat, HeartbeatSnapshot};
use crate::monitor::{Monitor, MonitorSnapshot};
use crate::seats::{SeatDecoder, SeatEntry, SeatSnapshot};
use crate::types::{ConfigError, ParseError, Timestamp};
use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use tokio::sync::mpsc;

/// Inbound telemetry message: `{ "cmd": string, "value": integer | string }`
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Envelope {
    pub cmd: String,
    #[serde(default)]
    pub value: Value,
}

impl Envelope {
    pub fn new(cmd: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            cmd: cmd.into(),
            value: value.into(),
        }
    }

    /// Parse a UTF-8 JSON payload
    pub fn from_slice(payload: &[u8]) -> Result<Self, ParseError> {
        serde_json::from_slice(payload).map_err(|e| ParseError::InvalidEnvelope(e.to_string()))
    }

    /// The value as an integer; numeric strings use base-prefix detection
    pub fn int_value(&self) -> Result<i128, ParseError> {
        let invalid = |found: String| ParseError::InvalidValue {
            cmd: self.cmd.clone(),
            expected: "an integer",
            found,
        };

        match &self.value {
            Value::Number(n) => n
                .as_i64()
                .map(i128::from)
                .or_else(|| n.as_u64().map(i128::from))
                .ok_or_else(|| invalid(n.to_string())),
            Value::String(s) => parse_int_literal(s).map_err(|_| invalid(format!("{:?}", s))),
            other => Err(invalid(json_type(other).to_string())),
        }
    }

    /// The value as a string
    pub fn str_value(&self) -> Result<&str, ParseError> {
        self.value.as_str().ok_or_else(|| ParseError::InvalidValue {
            cmd: self.cmd.clone(),
            expected: "a string",
            found: json_type(&self.value).to_string(),
        })
    }
}

/// What a single message changed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dispatch {
    /// Entry states of the matched monitor
    pub monitor: Option<BTreeMap<String, StateSet>>,
    /// Whether the matched heartbeat accepted the ping
    pub heartbeat: Option<bool>,
    /// Freshly decoded seats
    pub seats: Option<Vec<SeatEntry>>,
}

impl Dispatch {
    /// True when the command matched nothing
    pub fn is_empty(&self) -> bool {
        self.monitor.is_none() && self.heartbeat.is_none() && self.seats.is_none()
    }
}

/// Aggregated state of every monitored subsystem
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthSnapshot {
    pub version: i64,
    pub taken_at: Timestamp,
    pub monitors: Vec<MonitorSnapshot>,
    pub heartbeats: Vec<HeartbeatSnapshot>,
    pub seats: SeatSnapshot,
}

/// Owns the configured monitors, heartbeats and seat decoder
pub struct HealthOrchestrator {
    version: i64,
    monitors: BTreeMap<String, RwLock<Monitor>>,
    heartbeats: BTreeMap<String, Heartbeat>,
    seats: RwLock<SeatDecoder>,
    updates: EventBus<HealthEvent>,
    heartbeat_events: EventBus<HeartbeatEvent>,
}

impl HealthOrchestrator {
    pub fn new(config: &HealthConfig) -> Self {
        let heartbeat_events = EventBus::new();

        let monitors = config
            .monitors
            .iter()
            .map(|(id, cfg)| (id.clone(), RwLock::new(Monitor::from_config(id.clone(), cfg))))
            .collect();

        let heartbeats = config
            .heartbeats
            .iter()
            .map(|(id, cfg)| (id.clone(), Heartbeat::new(id.clone(), cfg, heartbeat_events.clone())))
            .collect();

        Self {
            version: config.version,
            monitors,
            heartbeats,
            seats: RwLock::new(SeatDecoder::new(config.seats.clone())),
            updates: EventBus::new(),
            heartbeat_events,
        }
    }

    /// Load and validate a health document, then build the orchestrator
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        Ok(Self::new(&HealthConfig::from_path(path)?))
    }

    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        Ok(Self::new(&HealthConfig::from_json_str(content)?))
    }

    pub fn version(&self) -> i64 {
        self.version
    }

    /// Subscribe to monitor and seat updates
    pub fn updates(&self) -> mpsc::UnboundedReceiver<HealthEvent> {
        self.updates.subscribe()
    }

    /// Subscribe to heartbeat ticks and timeouts
    pub fn heartbeat_events(&self) -> mpsc::UnboundedReceiver<HeartbeatEvent> {
        self.heartbeat_events.subscribe()
    }

    pub fn monitor_ids(&self) -> impl Iterator<Item = &str> {
        self.monitors.keys().map(String::as_str)
    }

    pub fn heartbeat(&self, id: &str) -> Option<&Heartbeat> {
        self.heartbeats.get(id)
    }

    pub fn heartbeats(&self) -> impl Iterator<Item = &Heartbeat> {
        self.heartbeats.values()
    }

    /// Current entry states of one monitor
    pub fn monitor_states(&self, id: &str) -> Option<BTreeMap<String, StateSet>> {
        self.monitors.get(id).map(|monitor| monitor.read().states())
    }

    pub fn seat_entries(&self) -> Vec<SeatEntry> {
        self.seats.read().entries().to_vec()
    }

    /// Parse a raw payload and dispatch it
    pub fn process_payload(&self, payload: &[u8]) -> Result<Dispatch, ParseError> {
        let envelope = Envelope::from_slice(payload)?;
        self.process_message(&envelope)
    }

    /// Route one envelope to every handler whose name matches `cmd`
    ///
    /// Heartbeat pings restart the heartbeat's clock, so this must run inside
    /// a tokio runtime.
    pub fn process_message(&self, envelope: &Envelope) -> Result<Dispatch, ParseError> {
        let cmd = envelope.cmd.as_str();
        let mut dispatch = Dispatch::default();

        if let Some(monitor) = self.monitors.get(cmd) {
            // Only the low 64 bits can match a mask; negatives wrap to two's complement
            let value = envelope.int_value()? as u64;
            let states = monitor.write().process(value);
            log::debug!("Monitor '{}' <- 0x{:X}: {:?}", cmd, value, states);
            self.updates.emit(HealthEvent::MonitorUpdated {
                monitor: cmd.to_string(),
                states: states.clone(),
            });
            dispatch.monitor = Some(states);
        }

        if let Some(heartbeat) = self.heartbeats.get(cmd) {
            let raw = envelope.int_value()?;
            let ping = i64::try_from(raw).map_err(|_| ParseError::InvalidValue {
                cmd: cmd.to_string(),
                expected: "a 64-bit integer",
                found: raw.to_string(),
            })?;
            dispatch.heartbeat = Some(heartbeat.process(ping));
        }

        let mut seats = self.seats.write();
        if seats.accepts(cmd) {
            let bits = envelope.str_value()?;
            let entries = seats.decode(bits).to_vec();
            drop(seats);
            self.updates.emit(HealthEvent::SeatsUpdated {
                entries: entries.clone(),
            });
            dispatch.seats = Some(entries);
        }

        if dispatch.is_empty() {
            log::trace!("Ignoring unrecognized command '{}'", cmd);
        }
        Ok(dispatch)
    }

    /// React to one connection event
    ///
    /// Messages are dispatched (parse failures are logged and dropped). Losing
    /// the transport resets every heartbeat; connecting starts them.
    pub fn handle_connection_event(&self, event: &ConnectionEvent) {
        match event {
            ConnectionEvent::MessageReceived { topic, payload } => {
                if let Err(err) = self.process_payload(payload) {
                    log::warn!("Dropping message on '{}': {}", topic, err);
                }
            }
            ConnectionEvent::Connected(_) => self.start_heartbeats(),
            ConnectionEvent::Disconnected { .. } | ConnectionEvent::ConnectFailed { .. } => {
                self.reset_heartbeats()
            }
            ConnectionEvent::RetriesProgress { .. } => {}
        }
    }

    /// Consume connection events until the channel closes
    pub async fn run(&self, mut events: mpsc::UnboundedReceiver<ConnectionEvent>) {
        while let Some(event) = events.recv().await {
            self.handle_connection_event(&event);
        }
        log::debug!("Connection event channel closed");
    }

    pub fn start_heartbeats(&self) {
        for heartbeat in self.heartbeats.values() {
            heartbeat.start();
        }
    }

    pub fn reset_heartbeats(&self) {
        for heartbeat in self.heartbeats.values() {
            heartbeat.reset();
        }
    }

    /// Consistent view of all state; each monitor is read under its own lock
    pub fn snapshot(&self) -> HealthSnapshot {
        HealthSnapshot {
            version: self.version,
            taken_at: Utc::now(),
            monitors: self.monitors.values().map(|m| m.read().snapshot()).collect(),
            heartbeats: self.heartbeats.values().map(Heartbeat::snapshot).collect(),
            seats: self.seats.read().snapshot(),
        }
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

//! Health Monitor Library
//!
//! Watches the health of a remote system over MQTT. Subsystems publish
//! `{"cmd": ..., "value": ...}` telemetry messages; the library turns them
//! into semantic states for a presentation layer.
//!
//! # Architecture
//!
//! - [`ConnectionManager`] owns the broker session and retries a bounded
//!   number of times at a fixed interval, with user-initiated cancellation.
//! - [`HealthOrchestrator`] routes each command to the matching monitors,
//!   heartbeats and the seat decoder.
//! - [`Monitor`]s evaluate telemetry words against bitmask tables.
//! - [`Heartbeat`]s detect silent subsystems with a tick/retry timeout.
//! - [`SeatDecoder`] turns a seat bit string into per-seat talk states.
//!
//! Every component reports through an [`EventBus`]; subscribers receive
//! owned events on unbounded channels.
//!
//! The library does NOT render anything or read application settings. That
//! lives in the application layer (health-monitor-cli).
//!
//! # Example Usage
//!
//! ```no_run
//! use health_monitor::{ConnectionConfig, ConnectionManager, HealthOrchestrator, MqttTransport};
//! use std::path::Path;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let health = HealthOrchestrator::from_path(Path::new("health.json"))?;
//!
//! let config = ConnectionConfig::new().with_endpoint("broker.local", 1883);
//! let manager = ConnectionManager::new(config.clone(), MqttTransport::new(&config));
//!
//! let events = manager.events();
//! manager.start().await;
//! health.run(events).await;
//! # Ok(())
//! # }
//! ```

// Public modules
pub mod config;
pub mod connection;
pub mod evaluator;
pub mod events;
pub mod heartbeat;
pub mod monitor;
pub mod orchestrator;
pub mod seats;
pub mod types;

// Re-export main types for convenience
pub use config::{
    parse_int_literal, ConnectionConfig, HealthConfig, HeartbeatConfig, MonitorConfig, SeatConfig,
};
pub use connection::{ConnectionManager, ConnectionState, MqttTransport, Transport, TransportEvent};
pub use evaluator::{Entry, MaskTable, StateSet};
pub use events::{ClientInfo, ConnectionEvent, EventBus, HealthEvent, HeartbeatEvent};
pub use heartbeat::{Heartbeat, HeartbeatSnapshot, HeartbeatState, HeartbeatStatus};
pub use monitor::{Monitor, MonitorSnapshot};
pub use orchestrator::{Dispatch, Envelope, HealthOrchestrator, HealthSnapshot};
pub use seats::{decode_seats, SeatDecoder, SeatEntry, SeatSnapshot};
pub use types::{
    ConfigError, HealthError, ParseError, Result, StateValue, Timestamp, TransportError,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_basics() {
        // Smoke test: an empty document yields an empty orchestrator
        let health =
            HealthOrchestrator::from_json_str(r#"{"version": 1, "monitors": {}, "heartbeats": {}, "wdlms": {}}"#)
                .unwrap();
        assert_eq!(health.version(), 1);
        assert_eq!(health.monitor_ids().count(), 0);
    }
}

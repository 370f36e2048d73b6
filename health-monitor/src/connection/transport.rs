//! Broker transport seam
//!
//! The connection manager drives any [`Transport`]. The production
//! implementation is [`super::mqtt::MqttTransport`]; tests plug in scripted
//! fakes.

use crate::events::ClientInfo;
use crate::types::TransportError;
use async_trait::async_trait;

/// Something that happened on an established session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Inbound publish on a subscribed topic
    Message { topic: String, payload: Vec<u8> },
    /// Session ended; 0 is a clean disconnect, anything else is unexpected
    Disconnected { reason_code: u8 },
}

/// A publish/subscribe client handle
///
/// Calls are never issued concurrently: the connection manager serializes
/// every attempt on one worker at a time.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Open a session. Errors are treated as a failed attempt.
    async fn connect(&mut self) -> Result<ClientInfo, TransportError>;

    /// Subscribe to `topic` on the current session
    async fn subscribe(&mut self, topic: &str) -> Result<(), TransportError>;

    /// Wait for the next inbound message or the end of the session
    ///
    /// An error means the session was lost unexpectedly.
    async fn next_event(&mut self) -> Result<TransportEvent, TransportError>;

    /// Close the current session, if any
    async fn disconnect(&mut self) -> Result<(), TransportError>;
}

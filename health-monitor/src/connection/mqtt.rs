//! MQTT transport built on rumqttc
//!
//! Only what the health monitor needs: username/password auth over
//! host:port, keep-alive, and QoS 0 subscriptions. Every `connect` builds a
//! fresh client/event-loop pair so a failed session never leaks into the next
//! attempt.

use super::transport::{Transport, TransportEvent};
use crate::config::ConnectionConfig;
use crate::events::ClientInfo;
use crate::types::TransportError;
use async_trait::async_trait;
use chrono::Utc;
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use std::time::Duration;

/// Capacity of the request channel between client and event loop
const REQUEST_CAPACITY: usize = 64;

/// Upper bound on flushing a DISCONNECT packet
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(2);

pub struct MqttTransport {
    options: MqttOptions,
    client_id: String,
    endpoint: String,
    session: Option<(AsyncClient, EventLoop)>,
}

impl MqttTransport {
    pub fn new(config: &ConnectionConfig) -> Self {
        let mut options = MqttOptions::new(config.client_id.clone(), config.host.clone(), config.port);
        options.set_keep_alive(config.keep_alive());
        if !config.username.is_empty() {
            options.set_credentials(config.username.clone(), config.password.clone());
        }

        Self {
            options,
            client_id: config.client_id.clone(),
            endpoint: config.endpoint(),
            session: None,
        }
    }

    fn refused(&self, reason: impl Into<String>) -> TransportError {
        TransportError::ConnectionRefused {
            endpoint: self.endpoint.clone(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Transport for MqttTransport {
    async fn connect(&mut self) -> Result<ClientInfo, TransportError> {
        self.session = None;
        let (client, mut eventloop) = AsyncClient::new(self.options.clone(), REQUEST_CAPACITY);

        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    if ack.code != ConnectReturnCode::Success {
                        return Err(self.refused(format!("{:?}", ack.code)));
                    }
                    break;
                }
                Ok(event) => log::trace!("MQTT event before CONNACK: {:?}", event),
                Err(err) => return Err(self.refused(err.to_string())),
            }
        }

        self.session = Some((client, eventloop));
        Ok(ClientInfo {
            client_id: self.client_id.clone(),
            endpoint: self.endpoint.clone(),
            connected_at: Utc::now(),
        })
    }

    async fn subscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        let (client, _) = self.session.as_ref().ok_or(TransportError::NotConnected)?;
        client
            .subscribe(topic, QoS::AtMostOnce)
            .await
            .map_err(|e| TransportError::SubscribeFailed {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
    }

    async fn next_event(&mut self) -> Result<TransportEvent, TransportError> {
        let (_, eventloop) = self.session.as_mut().ok_or(TransportError::NotConnected)?;

        let event = loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    break Ok(TransportEvent::Message {
                        topic: publish.topic,
                        payload: publish.payload.to_vec(),
                    });
                }
                Ok(Event::Incoming(Packet::Disconnect)) | Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                    break Ok(TransportEvent::Disconnected { reason_code: 0 });
                }
                Ok(event) => log::trace!("MQTT event: {:?}", event),
                Err(err) => break Err(TransportError::ConnectionLost(err.to_string())),
            }
        };

        if !matches!(event, Ok(TransportEvent::Message { .. })) {
            self.session = None;
        }
        event
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        let Some((client, mut eventloop)) = self.session.take() else {
            return Ok(());
        };

        client
            .disconnect()
            .await
            .map_err(|e| TransportError::ConnectionLost(e.to_string()))?;

        // The request is only written once the event loop is polled
        let flush = async {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
        };
        if tokio::time::timeout(DISCONNECT_TIMEOUT, flush).await.is_err() {
            log::debug!("Timed out flushing DISCONNECT to {}", self.endpoint);
        }
        Ok(())
    }
}

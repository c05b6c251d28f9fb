//! MQTT implementation of the control plane
//!
//! `rumqttc` splits a connection into a cloneable [`AsyncClient`] used for
//! publishing and an [`EventLoop`] that must be polled to make progress.
//! The client is shared by all sessions; the event loop runs in its own task
//! and reconnects with backoff whenever the broker goes away.

use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use gw_core::config::{BackoffConfig, BrokerConfig};
use gw_core::error::ControlError;
use gw_protocol::ControlMessage;

use super::backoff::ExponentialBackoff;
use super::ControlPublisher;

/// Capacity of the request queue between the client and its event loop.
///
/// Publishes wait for a free slot, so a full queue (broker unreachable for a
/// while) surfaces as a publish timeout rather than unbounded buffering.
const REQUEST_CHANNEL_CAPACITY: usize = 64;

/// Publish-only MQTT client shared across sessions
#[derive(Clone)]
pub struct MqttControl {
    client: AsyncClient,
    publish_timeout: Duration,
}

impl MqttControl {
    /// Create the client and the event loop that drives it.
    ///
    /// Nothing touches the network until [`MqttEventLoop::run`] is polled.
    pub fn new(config: &BrokerConfig) -> (Self, MqttEventLoop) {
        let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
        options.set_keep_alive(config.keep_alive);

        let (client, eventloop) = AsyncClient::new(options, REQUEST_CHANNEL_CAPACITY);

        let control = Self {
            client,
            publish_timeout: config.publish_timeout,
        };
        let event_loop = MqttEventLoop {
            eventloop,
            broker: config.address(),
            backoff: config.backoff.clone(),
        };

        (control, event_loop)
    }

    /// Send an MQTT DISCONNECT so the broker drops the session cleanly
    pub async fn shutdown(&self) {
        if let Err(e) = self.client.disconnect().await {
            tracing::debug!("Broker disconnect failed: {}", e);
        }
    }
}

#[async_trait]
impl ControlPublisher for MqttControl {
    async fn publish(&self, message: &ControlMessage) -> Result<(), ControlError> {
        let topic = message.topic();

        // QoS 0, not retained: a stale connect must never be replayed to an
        // agent that subscribes later.
        let publish = self
            .client
            .publish(topic.clone(), QoS::AtMostOnce, false, message.payload());

        match tokio::time::timeout(self.publish_timeout, publish).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(ControlError::PublishFailed {
                topic,
                reason: e.to_string(),
            }),
            Err(_) => Err(ControlError::Timeout {
                topic,
                timeout: self.publish_timeout,
            }),
        }
    }
}

/// Drives the MQTT connection
pub struct MqttEventLoop {
    eventloop: EventLoop,
    broker: String,
    backoff: BackoffConfig,
}

impl MqttEventLoop {
    /// Poll the connection until cancelled or until [`MqttControl::shutdown`]
    /// has been sent.
    ///
    /// `connected` is set to `true` on every CONNACK and back to `false`
    /// whenever the connection fails, so callers can wait for the first
    /// successful connect before accepting sessions.
    pub async fn run(mut self, connected: watch::Sender<bool>, cancel: CancellationToken) {
        let mut backoff = ExponentialBackoff::from_config(&self.backoff);

        tracing::info!("Connecting to broker at {}", self.broker);

        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                event = self.eventloop.poll() => event,
            };

            match event {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    tracing::info!("Connected to broker at {} ({:?})", self.broker, ack.code);
                    backoff.reset();
                    connected.send_replace(true);
                }
                Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                    // Requests are sent in order, so queued publishes went out first
                    tracing::info!("Disconnected from broker at {}", self.broker);
                    connected.send_replace(false);
                    break;
                }
                Ok(Event::Incoming(Packet::Disconnect)) => {
                    tracing::warn!("Broker at {} sent DISCONNECT", self.broker);
                    connected.send_replace(false);
                }
                Ok(event) => {
                    tracing::trace!("Broker event: {:?}", event);
                }
                Err(e) => {
                    connected.send_replace(false);
                    let delay = backoff.next_delay();
                    tracing::warn!(
                        "Broker connection to {} failed: {}. Retrying in {:?}",
                        self.broker,
                        e,
                        delay
                    );

                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        tracing::info!("Broker event loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gw_protocol::TunnelLease;

    fn unreachable_broker() -> BrokerConfig {
        BrokerConfig {
            host: "127.0.0.1".into(),
            // Reserved port, nothing listens there
            port: 1,
            publish_timeout: Duration::from_millis(200),
            ..BrokerConfig::default()
        }
    }

    #[tokio::test]
    async fn test_publish_is_queued_without_connection() {
        let (control, _event_loop) = MqttControl::new(&unreachable_broker());
        let message = ControlMessage::connect(TunnelLease::new("device42", 54321));

        // The request queue has room, so the publish is accepted locally
        // even though the event loop has never run.
        assert!(control.publish(&message).await.is_ok());
    }

    #[tokio::test]
    async fn test_publish_times_out_when_queue_is_full() {
        let (control, _event_loop) = MqttControl::new(&unreachable_broker());
        let message = ControlMessage::connect(TunnelLease::new("device42", 54321));

        for _ in 0..REQUEST_CHANNEL_CAPACITY {
            control.publish(&message).await.unwrap();
        }

        let err = control.publish(&message).await.unwrap_err();
        assert!(matches!(err, ControlError::Timeout { ref topic, .. } if topic == "connect/device42"));
    }

    #[tokio::test]
    async fn test_event_loop_reports_disconnected_and_stops_on_cancel() {
        let mut config = unreachable_broker();
        config.backoff = BackoffConfig {
            initial: Duration::from_millis(10),
            max: Duration::from_millis(10),
            multiplier: 1.0,
            jitter: 0.0,
        };
        let (_control, event_loop) = MqttControl::new(&config);

        let (connected_tx, connected_rx) = watch::channel(false);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(event_loop.run(connected_tx, cancel.clone()));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!*connected_rx.borrow());

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("event loop did not stop")
            .unwrap();
    }
}

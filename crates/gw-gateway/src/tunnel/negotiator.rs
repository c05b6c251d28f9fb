//! Tunnel connect/disconnect signalling
//!
//! Both messages are fire-and-forget. A failed publish is logged and the
//! session carries on; if the agent never saw the connect message the
//! failure shows up later as a dial error.

use std::sync::Arc;

use gw_protocol::{ControlMessage, TunnelLease};

use crate::control::ControlPublisher;

/// Publishes tunnel requests on the shared control plane
#[derive(Clone)]
pub struct TunnelNegotiator {
    publisher: Arc<dyn ControlPublisher>,
}

impl TunnelNegotiator {
    /// Create a negotiator on top of the process-wide publisher
    pub fn new(publisher: Arc<dyn ControlPublisher>) -> Self {
        Self { publisher }
    }

    /// Ask the agent for `lease.host` to forward to `lease.local_port`
    pub async fn connect(&self, lease: &TunnelLease) {
        self.send(ControlMessage::connect(lease.clone())).await;
    }

    /// Tell the agent the tunnel for `lease` is no longer needed
    pub async fn disconnect(&self, lease: &TunnelLease) {
        self.send(ControlMessage::disconnect(lease.clone())).await;
    }

    async fn send(&self, message: ControlMessage) {
        tracing::info!("PUBLISH {}", message);

        if let Err(e) = self.publisher.publish(&message).await {
            tracing::error!("{}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use gw_core::error::ControlError;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<ControlMessage>>,
        fail: bool,
    }

    #[async_trait]
    impl ControlPublisher for Recorder {
        async fn publish(&self, message: &ControlMessage) -> Result<(), ControlError> {
            self.sent.lock().unwrap().push(message.clone());
            if self.fail {
                return Err(ControlError::PublishFailed {
                    topic: message.topic(),
                    reason: "broker down".into(),
                });
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_connect_then_disconnect_share_lease() {
        let recorder = Arc::new(Recorder::default());
        let negotiator = TunnelNegotiator::new(recorder.clone());
        let lease = TunnelLease::new("device42", 54321);

        negotiator.connect(&lease).await;
        negotiator.disconnect(&lease).await;

        let sent = recorder.sent.lock().unwrap();
        let topics: Vec<_> = sent.iter().map(|m| (m.topic(), m.payload())).collect();
        assert_eq!(
            topics,
            vec![
                ("connect/device42".to_string(), "54321".to_string()),
                ("disconnect/device42".to_string(), "54321".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_publish_failure_is_not_fatal() {
        let recorder = Arc::new(Recorder {
            fail: true,
            ..Recorder::default()
        });
        let negotiator = TunnelNegotiator::new(recorder.clone());

        negotiator.connect(&TunnelLease::new("device42", 1)).await;
        assert_eq!(recorder.sent.lock().unwrap().len(), 1);
    }
}

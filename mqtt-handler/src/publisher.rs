use async_trait::async_trait;
use rumqttc::{AsyncClient, QoS};
use tokio::sync::watch;

use crate::status::ConnectionStatus;

#[derive(thiserror::Error, Debug)]
pub enum PublishError {
    #[error("Not connected to MQTT broker {broker} (connection status: {status})")]
    NotConnected {
        broker: String,
        status: ConnectionStatus,
    },
    #[error("MQTT message too large: {size} bytes, the limit is {max} bytes")]
    PayloadTooLarge { size: usize, max: usize },
    #[error("MQTT client rejected the publish: {0}")]
    Client(#[from] rumqttc::ClientError),
}

#[async_trait]
pub trait MqttPublisher: Send + Sync {
    /// Publish `payload` on `topic` with at-least-once delivery
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), PublishError>;

    fn connection_status(&self) -> ConnectionStatus;
}

/// Publisher backed by the process-wide rumqttc client. Cloning is cheap and all
/// clones share the same connection.
#[derive(Clone)]
pub struct MqttClientPublisher {
    client: AsyncClient,
    status: watch::Receiver<ConnectionStatus>,
    broker: String,
    max_packet_size: usize,
}

impl MqttClientPublisher {
    pub(crate) fn new(
        client: AsyncClient,
        status: watch::Receiver<ConnectionStatus>,
        broker: String,
        max_packet_size: usize,
    ) -> Self {
        Self {
            client,
            status,
            broker,
            max_packet_size,
        }
    }
}

/// Size on the wire of a QoS 1 PUBLISH packet: fixed header, topic, packet id, payload
fn publish_packet_size(topic: &str, payload_len: usize) -> usize {
    let remaining = 2 + topic.len() + 2 + payload_len;
    let remaining_length_bytes = match remaining {
        0..128 => 1,
        128..16_384 => 2,
        16_384..2_097_152 => 3,
        _ => 4,
    };
    1 + remaining_length_bytes + remaining
}

#[async_trait]
impl MqttPublisher for MqttClientPublisher {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), PublishError> {
        let status = self.connection_status();
        if !status.is_connected() {
            return Err(PublishError::NotConnected {
                broker: self.broker.clone(),
                status,
            });
        }

        // rumqttc only checks the size once the message is dequeued, and then drops
        // the connection along with the message
        let size = publish_packet_size(topic, payload.len());
        if size > self.max_packet_size {
            return Err(PublishError::PayloadTooLarge {
                size,
                max: self.max_packet_size,
            });
        }

        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await?;

        Ok(())
    }

    fn connection_status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }
}

use async_trait::async_trait;
use mqtt_handler::{
    publisher::{MqttPublisher, PublishError},
    status::ConnectionStatus,
};

#[must_use]
pub fn make_mqtt_publisher_mock() -> MockMqttPublisher {
    MockMqttPublisher::new()
}

mockall::mock! {
    pub MqttPublisher {}

    #[async_trait]
    impl MqttPublisher for MqttPublisher {
        async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), PublishError>;
        fn connection_status(&self) -> ConnectionStatus;
    }
}

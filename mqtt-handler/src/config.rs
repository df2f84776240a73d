#[must_use]
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MqttHandlerConfig {
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_keep_alive_seconds: u64,
    pub mqtt_username: Option<String>,
    pub mqtt_password: Option<String>,
    pub mqtt_client_id: String,
    /// Largest MQTT packet sent or accepted, in bytes
    pub mqtt_max_packet_size: usize,
}

impl MqttHandlerConfig {
    #[must_use]
    pub fn broker_address(&self) -> String {
        format!("{}:{}", self.mqtt_host, self.mqtt_port)
    }
}

pub mod mqtt_publisher;

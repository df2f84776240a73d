pub mod asserts;
pub mod files;
pub mod mqtt_broker;

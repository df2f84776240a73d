pub mod start_options;

use clap::Parser;

/// Bridge HTTP requests to MQTT publishes.
#[derive(Parser, Clone, Debug, Default)]
#[clap(name = "http-mqtt-bridge", version)]
pub struct RunOptions {
    #[clap(flatten)]
    pub start: start_options::StartOptions,
}

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Clone, Debug, Default)]
pub struct StartOptions {
    /// The path to the config file
    /// If not provided, `HTTP_TO_MQTT_CONFIG`, /etc/http_to_mqtt/config.yaml
    /// and ./config.yaml are tried in that order
    #[clap(long("config"), short('c'))]
    pub config_file_path: Option<PathBuf>,
}

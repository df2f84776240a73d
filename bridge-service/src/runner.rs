use crate::{
    config::{BridgeConfig, resolve_config},
    service::{BridgeContext, make_router},
};
use anyhow::Context;
use logging::init_logging;
use mqtt_handler::{MqttHandler, config::MqttHandlerConfig};
use options::run_options::start_options::StartOptions;
use utils::time_getter::TimeGetter;

impl From<&BridgeConfig> for MqttHandlerConfig {
    fn from(config: &BridgeConfig) -> Self {
        MqttHandlerConfig {
            mqtt_host: config.mqtt_broker().to_string(),
            mqtt_port: config.mqtt_port(),
            mqtt_keep_alive_seconds: config.mqtt_keep_alive_seconds(),
            mqtt_username: config.mqtt_username().map(ToOwned::to_owned),
            mqtt_password: config.mqtt_password().map(ToOwned::to_owned),
            mqtt_client_id: config.mqtt_client_id().to_string(),
            mqtt_max_packet_size: config.mqtt_max_packet_size(),
        }
    }
}

pub async fn run(options: StartOptions) -> anyhow::Result<()> {
    let (config_path, config) = resolve_config(options.config_file_path.as_deref())?;

    init_logging(config.log_file_settings().as_ref())?;

    tracing::info!("Loaded config from {}", config_path.display());

    let (stop_sender, mut stop_receiver) = tokio::sync::mpsc::unbounded_channel();

    ctrlc::set_handler(move || {
        tracing::info!("Sending a terminate (Ctrl+C) signal");
        // Nothing is listening anymore once the server has already shut down
        let _ = stop_sender.send(());
    })
    .context("Error setting Ctrl+C handler")?;

    let mut mqtt_handler = MqttHandler::new(&MqttHandlerConfig::from(&config))?;

    let context = BridgeContext::new(mqtt_handler.publisher(), TimeGetter::default());

    let serve_result: anyhow::Result<()> = async {
        let listener = tokio::net::TcpListener::bind((config.http_host(), config.http_port()))
            .await
            .with_context(|| {
                format!(
                    "Binding the HTTP listener to {}:{} failed",
                    config.http_host(),
                    config.http_port()
                )
            })?;

        tracing::info!("Listening for HTTP requests on {}", listener.local_addr()?);

        axum::serve(listener, make_router(context, config.mqtt_max_packet_size()))
            .with_graceful_shutdown(async move {
                stop_receiver.recv().await;
            })
            .await
            .context("HTTP server failed")
    }
    .await;

    mqtt_handler.stop();
    mqtt_handler.wait().await;

    serve_result
}

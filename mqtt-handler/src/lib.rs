use std::{sync::Arc, time::Duration};

use config::MqttHandlerConfig;
use logging::spawn_in_current_span;
use publisher::{MqttClientPublisher, MqttPublisher};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet};
use status::ConnectionStatus;
use tokio::sync::{oneshot, watch};

pub mod config;
pub mod publisher;
pub mod status;

/// Bound of the client's request queue; publishes wait for room once it is full
const REQUEST_CHANNEL_CAPACITY: usize = 100;
const MIN_KEEP_ALIVE_SECONDS: u64 = 5;
const RECONNECT_DELAY: Duration = Duration::from_secs(1);
/// How long a stop waits for queued publishes and the DISCONNECT to be written
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Owns the broker connection: the client handle that publishers share and the
/// background task that drives the event loop.
pub struct MqttHandler {
    publisher: MqttClientPublisher,
    status_receiver: watch::Receiver<ConnectionStatus>,
    task_handle: Option<tokio::task::JoinHandle<()>>,
    stop_sender: Option<oneshot::Sender<()>>,
}

impl MqttHandler {
    /// Must be called from within a tokio runtime
    pub fn new(config: &MqttHandlerConfig) -> anyhow::Result<Self> {
        let mqtt_options: MqttOptions = config.try_into()?;

        tracing::info!(
            "Connecting to mqtt server: {}:{}",
            mqtt_options.broker_address().0,
            mqtt_options.broker_address().1,
        );

        let (client, eventloop) = AsyncClient::new(mqtt_options, REQUEST_CHANNEL_CAPACITY);
        let (status_sender, status_receiver) = watch::channel(ConnectionStatus::Connecting);
        let (stop_sender, stop_receiver) = oneshot::channel();

        let task_handle = spawn_in_current_span(launch_eventloop(
            client.clone(),
            eventloop,
            status_sender,
            stop_receiver,
        ));

        Ok(Self {
            publisher: MqttClientPublisher::new(
                client,
                status_receiver.clone(),
                config.broker_address(),
                config.mqtt_max_packet_size,
            ),
            status_receiver,
            task_handle: Some(task_handle),
            stop_sender: Some(stop_sender),
        })
    }

    #[must_use]
    pub fn publisher(&self) -> Arc<dyn MqttPublisher> {
        Arc::new(self.publisher.clone())
    }

    /// Observe connection status changes
    #[must_use]
    pub fn status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_receiver.clone()
    }

    /// Asks the event loop to flush what is queued, disconnect and exit
    pub fn stop(&mut self) {
        if let Some(stop_sender) = self.stop_sender.take() {
            // The task may already be gone, in which case there is nothing to stop
            let _ = stop_sender.send(());
        }
    }

    pub async fn wait(&mut self) {
        if let Some(task_handle) = self.task_handle.take() {
            if let Err(e) = task_handle.await {
                tracing::error!("MQTT event loop task failed: {e}");
            }
        }
    }
}

async fn launch_eventloop(
    client: AsyncClient,
    mut eventloop: EventLoop,
    status_sender: watch::Sender<ConnectionStatus>,
    mut stop_receiver: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = &mut stop_receiver => {
                tracing::info!("Stopping MQTT event loop");
                let connected = status_sender.borrow().is_connected();
                if connected {
                    disconnect(&client, &mut eventloop).await;
                }
                status_sender.send_replace(ConnectionStatus::Disconnected);
                break;
            }
            event = eventloop.poll() => match event {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    tracing::info!("Connected to MQTT broker with result code {:?}", ack.code);
                    status_sender.send_replace(ConnectionStatus::Connected);
                }
                Ok(Event::Incoming(Packet::Disconnect)) => {
                    tracing::warn!("Disconnected from MQTT broker by the broker");
                    status_sender.send_replace(ConnectionStatus::Disconnected);
                }
                Ok(Event::Incoming(Packet::PubAck(ack))) => {
                    tracing::debug!("Broker acknowledged publish with packet id {}", ack.pkid);
                }
                Ok(Event::Incoming(_) | Event::Outgoing(_)) => (),
                Err(e) => {
                    let previous = status_sender.send_replace(ConnectionStatus::Disconnected);
                    if previous == ConnectionStatus::Disconnected {
                        tracing::debug!("Reconnecting to MQTT broker failed: {e}");
                    } else {
                        tracing::warn!("Disconnected from MQTT broker: {e}");
                    }
                    // rumqttc reconnects on the next poll
                    tokio::time::sleep(RECONNECT_DELAY).await;
                }
            }
        }
    }
}

/// Queues a DISCONNECT behind any pending publishes and polls until it is written
async fn disconnect(client: &AsyncClient, eventloop: &mut EventLoop) {
    if let Err(e) = client.try_disconnect() {
        tracing::warn!("Could not queue MQTT disconnect: {e}");
        return;
    }

    let drained = tokio::time::timeout(DISCONNECT_TIMEOUT, async {
        loop {
            match eventloop.poll().await {
                Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                    tracing::info!("Disconnected from MQTT broker");
                    break;
                }
                Ok(_) => (),
                Err(e) => {
                    tracing::warn!("MQTT connection failed while disconnecting: {e}");
                    break;
                }
            }
        }
    })
    .await;

    if drained.is_err() {
        tracing::warn!(
            "Timed out after {}s waiting for queued MQTT messages to be sent",
            DISCONNECT_TIMEOUT.as_secs()
        );
    }
}

fn set_credentials(
    config: &MqttHandlerConfig,
    mqtt_options: &mut MqttOptions,
) -> anyhow::Result<()> {
    match (&config.mqtt_username, &config.mqtt_password) {
        (Some(u), Some(p)) => {
            tracing::info!("Setting username and password for mqtt connection");
            mqtt_options.set_credentials(u, p);
        }
        (None, None) => {
            tracing::info!("No username and password used for mqtt connection");
        }
        (_, _) => {
            return Err(anyhow::anyhow!(
                "Username and password must be either both specified or both unspecified"
            ));
        }
    }

    Ok(())
}

impl TryFrom<&MqttHandlerConfig> for MqttOptions {
    type Error = anyhow::Error;

    fn try_from(config: &MqttHandlerConfig) -> Result<Self, Self::Error> {
        if config.mqtt_client_id.is_empty() || config.mqtt_client_id.starts_with(' ') {
            return Err(anyhow::anyhow!(
                "Invalid mqtt client id: `{}`",
                config.mqtt_client_id
            ));
        }
        if config.mqtt_keep_alive_seconds < MIN_KEEP_ALIVE_SECONDS {
            return Err(anyhow::anyhow!(
                "Mqtt keep alive must be at least {MIN_KEEP_ALIVE_SECONDS} seconds, got {}",
                config.mqtt_keep_alive_seconds
            ));
        }
        if config.mqtt_max_packet_size == 0 {
            return Err(anyhow::anyhow!("Mqtt max packet size cannot be 0"));
        }

        let mut mqtt_options =
            MqttOptions::new(&config.mqtt_client_id, &config.mqtt_host, config.mqtt_port);
        mqtt_options.set_keep_alive(Duration::from_secs(config.mqtt_keep_alive_seconds));
        mqtt_options.set_max_packet_size(
            config.mqtt_max_packet_size,
            config.mqtt_max_packet_size,
        );

        set_credentials(config, &mut mqtt_options)?;

        Ok(mqtt_options)
    }
}

use logging::LogFileSettings;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use utils::env::{GetFromEnvError, get_from_env};

/// Points at a config file to use when none is given on the command line
pub const CONFIG_PATH_ENV_VAR: &str = "HTTP_TO_MQTT_CONFIG";
pub const SYSTEM_CONFIG_PATH: &str = "/etc/http_to_mqtt/config.yaml";
pub const LOCAL_CONFIG_FILE_NAME: &str = "config.yaml";

const DEFAULT_HTTP_HOST: &str = "0.0.0.0";
const DEFAULT_HTTP_PORT: u16 = 8080;
const DEFAULT_MQTT_PORT: u16 = 1883;
const DEFAULT_MQTT_KEEP_ALIVE_SECONDS: u64 = 60;
const DEFAULT_MQTT_CLIENT_ID: &str = "http-mqtt-bridge";
const DEFAULT_MQTT_MAX_PACKET_SIZE: usize = 1 << 24;
const DEFAULT_LOG_PATH: &str = "/var/log/http_to_mqtt.log";
const DEFAULT_LOG_MAX_SIZE: u64 = 100_000;
const DEFAULT_LOG_BACKUP_COUNT: usize = 3;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Config file doesn't exist in the provided path: {0}")]
    ConfigFileDoesNotExist(PathBuf),
    #[error("File exists but it could not be read to a string for parsing: {0}")]
    FileExistsButCannotBeReadToString(std::io::Error),
    #[error("Could not parse file to config; either invalid yaml or missing config: {0}")]
    FileFormatCouldNotBeParsed(serde_yml::Error),
    #[error("Invalid config value: {0}")]
    InvalidValue(String),
    #[error("Reading the config path from the environment failed: {0}")]
    EnvVar(#[from] GetFromEnvError),
    #[error("The current directory could not be determined: {0}")]
    CurrentDirUnavailable(std::io::Error),
    #[error("No valid config file found (tried: {0})")]
    NoValidConfigFound(String),
}

#[must_use]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    #[serde(default)]
    http: HttpConfig,
    mqtt: MqttConfig,
    #[serde(default)]
    logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct HttpConfig {
    host: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
struct MqttConfig {
    broker: String,
    port: Option<u16>,
    username: Option<String>,
    password: Option<String>,
    keep_alive_seconds: Option<u64>,
    client_id: Option<String>,
    max_packet_size: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct LoggingConfig {
    enabled: Option<bool>,
    path: Option<PathBuf>,
    max_size: Option<u64>,
    backup_count: Option<usize>,
}

impl BridgeConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<BridgeConfig, ConfigError> {
        if !path.as_ref().exists() {
            return Err(ConfigError::ConfigFileDoesNotExist(
                path.as_ref().to_path_buf(),
            ));
        }

        let config_file_data = std::fs::read_to_string(path)
            .map_err(ConfigError::FileExistsButCannotBeReadToString)?;

        Self::from_yaml_str(&config_file_data)
    }

    pub fn from_yaml_str(data: &str) -> Result<BridgeConfig, ConfigError> {
        let config: BridgeConfig =
            serde_yml::from_str(data).map_err(ConfigError::FileFormatCouldNotBeParsed)?;

        if config.mqtt.broker.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "mqtt.broker cannot be empty".to_string(),
            ));
        }
        if config.mqtt.max_packet_size == Some(0) {
            return Err(ConfigError::InvalidValue(
                "mqtt.max_packet_size cannot be 0".to_string(),
            ));
        }

        Ok(config)
    }

    #[must_use]
    pub fn http_host(&self) -> &str {
        self.http.host.as_deref().unwrap_or(DEFAULT_HTTP_HOST)
    }

    #[must_use]
    pub fn http_port(&self) -> u16 {
        self.http.port.unwrap_or(DEFAULT_HTTP_PORT)
    }

    #[must_use]
    pub fn mqtt_broker(&self) -> &str {
        &self.mqtt.broker
    }

    #[must_use]
    pub fn mqtt_port(&self) -> u16 {
        self.mqtt.port.unwrap_or(DEFAULT_MQTT_PORT)
    }

    #[must_use]
    pub fn mqtt_username(&self) -> Option<&str> {
        self.mqtt.username.as_deref()
    }

    #[must_use]
    pub fn mqtt_password(&self) -> Option<&str> {
        self.mqtt.password.as_deref()
    }

    #[must_use]
    pub fn mqtt_keep_alive_seconds(&self) -> u64 {
        self.mqtt
            .keep_alive_seconds
            .unwrap_or(DEFAULT_MQTT_KEEP_ALIVE_SECONDS)
    }

    #[must_use]
    pub fn mqtt_client_id(&self) -> &str {
        self.mqtt
            .client_id
            .as_deref()
            .unwrap_or(DEFAULT_MQTT_CLIENT_ID)
    }

    /// Largest MQTT packet in bytes. Request bodies are capped at the same size.
    #[must_use]
    pub fn mqtt_max_packet_size(&self) -> usize {
        self.mqtt
            .max_packet_size
            .unwrap_or(DEFAULT_MQTT_MAX_PACKET_SIZE)
    }

    #[must_use]
    pub fn logging_enabled(&self) -> bool {
        self.logging.enabled.unwrap_or(false)
    }

    /// The log file to write to, or `None` if file logging is disabled
    pub fn log_file_settings(&self) -> Option<LogFileSettings> {
        if !self.logging_enabled() {
            return None;
        }

        Some(LogFileSettings {
            path: self
                .logging
                .path
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_PATH)),
            max_size: self.logging.max_size.unwrap_or(DEFAULT_LOG_MAX_SIZE),
            backup_count: self
                .logging
                .backup_count
                .unwrap_or(DEFAULT_LOG_BACKUP_COUNT),
        })
    }
}

/// The places a config file is looked for, most preferred first
#[must_use]
pub fn config_candidates(
    explicit: Option<&Path>,
    env_override: Option<&str>,
    system_path: &Path,
    cwd: &Path,
) -> Vec<PathBuf> {
    let mut candidates = Vec::with_capacity(4);

    if let Some(path) = explicit {
        candidates.push(path.to_path_buf());
    }
    if let Some(path) = env_override.filter(|p| !p.is_empty()) {
        candidates.push(PathBuf::from(path));
    }
    candidates.push(system_path.to_path_buf());
    candidates.push(cwd.join(LOCAL_CONFIG_FILE_NAME));

    candidates
}

/// Returns the first candidate that exists and parses. Candidates that exist but
/// fail to load are reported on standard error and skipped.
pub fn load_first_valid<I>(candidates: I) -> Result<(PathBuf, BridgeConfig), ConfigError>
where
    I: IntoIterator<Item = PathBuf>,
{
    let mut tried = Vec::new();

    for path in candidates {
        if !path.exists() {
            tried.push(path.display().to_string());
            continue;
        }

        match BridgeConfig::from_file(&path) {
            Ok(config) => {
                eprintln!("Using config file: {}", path.display());
                return Ok((path, config));
            }
            Err(e) => {
                eprintln!("Error loading config from {}: {e}", path.display());
                tried.push(path.display().to_string());
            }
        }
    }

    Err(ConfigError::NoValidConfigFound(tried.join(", ")))
}

/// Resolves the config from the command line path, `HTTP_TO_MQTT_CONFIG`, the
/// system-wide file and finally `./config.yaml`
pub fn resolve_config(explicit: Option<&Path>) -> Result<(PathBuf, BridgeConfig), ConfigError> {
    let env_override = get_from_env(CONFIG_PATH_ENV_VAR)?;
    let cwd = std::env::current_dir().map_err(ConfigError::CurrentDirUnavailable)?;

    load_first_valid(config_candidates(
        explicit,
        env_override.as_deref(),
        Path::new(SYSTEM_CONFIG_PATH),
        &cwd,
    ))
}

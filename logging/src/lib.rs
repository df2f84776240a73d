pub mod log_style;
pub mod rotating_file;
pub mod tracing_utils;

use std::{
    io::IsTerminal,
    path::{Path, PathBuf},
    sync::Mutex,
};

use log_style::{LOG_STYLE_ENV_VAR, LogStyle, LogStyleParseError, get_log_style_from_env};
use rotating_file::RotatingFile;
use thiserror::Error;
use tracing_subscriber::{EnvFilter, Layer, Registry, layer::SubscriberExt, util::SubscriberInitExt};

pub use tracing_utils::spawn_in_current_span;

const DEFAULT_LOG_FILTER: &str = "info";

/// Where, besides standard error, log lines should be written
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFileSettings {
    pub path: PathBuf,
    pub max_size: u64,
    pub backup_count: usize,
}

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Invalid log style: {0}")]
    LogStyle(#[from] LogStyleParseError),
    #[error("Cannot create log directory {0}. Please check permissions: {1}")]
    CannotCreateLogDirectory(PathBuf, std::io::Error),
    #[error("Cannot write to log file {0}. Please check permissions: {1}")]
    CannotOpenLogFile(PathBuf, std::io::Error),
    #[error("A global logger was already installed: {0}")]
    AlreadyInitialized(#[from] tracing_subscriber::util::TryInitError),
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Installs the global subscriber: a console layer on standard error (styled via
/// `LOG_STYLE`, filtered via `RUST_LOG`) and, if given, a size-rotating log file.
pub fn init_logging(log_file: Option<&LogFileSettings>) -> Result<(), LoggingError> {
    let log_style = get_log_style_from_env(LOG_STYLE_ENV_VAR)?.unwrap_or_default();

    let mut layers: Vec<BoxedLayer> = vec![console_layer(log_style)];
    if let Some(settings) = log_file {
        layers.push(file_layer(open_log_file(settings)?));
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter())
        .try_init()?;

    if let Some(settings) = log_file {
        tracing::info!("Logging to file: {}", settings.path.display());
    }

    Ok(())
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

fn console_layer(log_style: LogStyle) -> BoxedLayer {
    match log_style {
        LogStyle::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed(),
        LogStyle::Text(coloring) => tracing_subscriber::fmt::layer()
            .with_ansi(coloring.use_ansi(std::io::stderr().is_terminal()))
            .with_writer(std::io::stderr)
            .boxed(),
    }
}

fn file_layer(file: RotatingFile) -> BoxedLayer {
    tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .boxed()
}

/// Creates the log directory if needed and opens the log file for appending
pub fn open_log_file(settings: &LogFileSettings) -> Result<RotatingFile, LoggingError> {
    if let Some(dir) = settings.path.parent().filter(|d| !d.as_os_str().is_empty()) {
        create_log_dir(dir)?;
    }

    RotatingFile::open(&settings.path, settings.max_size, settings.backup_count)
        .map_err(|e| LoggingError::CannotOpenLogFile(settings.path.clone(), e))
}

fn create_log_dir(dir: &Path) -> Result<(), LoggingError> {
    std::fs::create_dir_all(dir)
        .map_err(|e| LoggingError::CannotCreateLogDirectory(dir.to_path_buf(), e))
}

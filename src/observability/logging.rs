//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber from configuration
//! - Bootstrap the log directory and its files
//! - Route access events to their own file
//!
//! # Design Decisions
//! - `RUST_LOG` overrides the configured level
//! - JSON format for production, pretty format for development
//! - Access events use the [`ACCESS_TARGET`] target

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

use crate::config::{LogFormat, ObservabilityConfig};

/// Target used for request access events.
pub const ACCESS_TARGET: &str = "access";

/// File receiving every event when a log directory is configured.
pub const EVENT_LOG_FILE: &str = "balancer.log";

/// File receiving access events only.
pub const ACCESS_LOG_FILE: &str = "access.log";

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("failed to create log directory {path:?}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("failed to open log file {path:?}: {source}")]
    OpenFile { path: PathBuf, source: io::Error },

    #[error("failed to install subscriber: {0}")]
    Init(#[from] TryInitError),
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn env_filter(config: &ObservabilityConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level))
}

fn open_append(path: PathBuf) -> Result<File, LoggingError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|source| LoggingError::OpenFile { path, source })
}

/// Create the log directory if needed and open both log files.
pub fn bootstrap_log_dir(dir: &Path) -> Result<(File, File), LoggingError> {
    fs::create_dir_all(dir).map_err(|source| LoggingError::CreateDir {
        path: dir.to_path_buf(),
        source,
    })?;
    let events = open_append(dir.join(EVENT_LOG_FILE))?;
    let access = open_append(dir.join(ACCESS_LOG_FILE))?;
    Ok((events, access))
}

/// Install the global subscriber.
pub fn init_logging(config: &ObservabilityConfig) -> Result<(), LoggingError> {
    let mut layers: Vec<BoxedLayer> = Vec::new();

    let console = match config.log_format {
        LogFormat::Json => fmt::layer().json().with_filter(env_filter(config)).boxed(),
        LogFormat::Pretty => fmt::layer().with_filter(env_filter(config)).boxed(),
    };
    layers.push(console);

    if let Some(dir) = &config.log_dir {
        let (events, access) = bootstrap_log_dir(dir)?;
        layers.push(
            fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(events))
                .with_filter(env_filter(config))
                .boxed(),
        );
        layers.push(
            fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(access))
                .with_filter(filter_fn(|meta| meta.target() == ACCESS_TARGET))
                .boxed(),
        );
    }

    tracing_subscriber::registry().with(layers).try_init()?;

    if let Some(dir) = &config.log_dir {
        tracing::info!(dir = %dir.display(), "Writing log files");
    }
    Ok(())
}

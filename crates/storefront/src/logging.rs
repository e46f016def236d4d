use std::fs;

use color_eyre::Result;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_error::ErrorLayer;
use tracing_subscriber::{filter::LevelFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::Config;

pub const LOG_FILE: &str = concat!(env!("CARGO_PKG_NAME"), ".log");

#[cfg(debug_assertions)]
const DEFAULT_LEVEL: LevelFilter = LevelFilter::INFO;
#[cfg(not(debug_assertions))]
const DEFAULT_LEVEL: LevelFilter = LevelFilter::WARN;

fn env_filter() -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(DEFAULT_LEVEL.into())
        .from_env_lossy()
}

/// File log in `<data_dir>/logs` plus a console layer on stderr.
///
/// The guard must outlive every log call; dropping it flushes the file.
pub fn init(config: &Config) -> Result<WorkerGuard> {
    let log_dir = config.config.data_dir.join("logs");
    fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::never(&log_dir, LOG_FILE);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::Layer::default()
        .with_target(false)
        .with_ansi(false)
        .with_writer(non_blocking)
        .with_filter(env_filter());

    // stdout carries command output
    let console_layer = fmt::Layer::default()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(env_filter());

    tracing_subscriber::registry()
        .with(file_layer)
        .with(console_layer)
        .with(ErrorLayer::default())
        .try_init()?;

    Ok(guard)
}

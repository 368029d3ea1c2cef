//! Tracing setup for the agent binary

use std::path::PathBuf;

use anyhow::{Context, Result};
use mxagent_core::config::LoggingConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default directory for file logs: `{data_local_dir}/mxagent/logs`.
pub fn default_logs_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mxagent")
        .join("logs")
}

/// Filter from `RUST_LOG`, else `config.level` with our crates at the same level.
pub fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let mut filter = EnvFilter::new(&config.level);
        for directive in [
            format!("mxagent_core={}", config.level),
            format!("mxagent_gateway={}", config.level),
            "tower_http=info".to_string(),
            "hyper=warn".to_string(),
        ] {
            if let Ok(directive) = directive.parse() {
                filter = filter.add_directive(directive);
            }
        }
        filter
    })
}

/// Install the global subscriber: compact coloured console output plus a
/// daily-rolling file under `config.directory` (or [`default_logs_dir`]).
///
/// Keep the returned guard alive for the lifetime of the process. Dropping
/// it flushes the file writer.
pub fn init_logging(config: &LoggingConfig) -> Result<WorkerGuard> {
    let directory = config.directory.clone().unwrap_or_else(default_logs_dir);
    let console_layer = fmt::layer()
        .with_ansi(true)
        .compact()
        .with_thread_names(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true);

    std::fs::create_dir_all(&directory)
        .with_context(|| format!("Failed to create logs directory {}", directory.display()))?;

    // e.g. mxagent.2026-10-14.log
    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(&config.file_prefix)
        .filename_suffix("log")
        .build(&directory)
        .context("Failed to create log file appender")?;
    let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_file(true)
        .with_target(true);

    tracing_subscriber::registry()
        .with(env_filter(config))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    tracing::info!(directory = %directory.display(), "[Logging] File logging enabled");
    Ok(guard)
}

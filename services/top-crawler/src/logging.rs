//!
//! src/logging.rs  Andrew Belles  Sept 13th, 2025
//!
//! Initializes logger so each pipeline run leaves an informative,
//! structured trail on stdout
//!
//!

use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use tracing_error::ErrorLayer;
use tracing_appender::non_blocking;

use crate::config::{LogFormat, LoggingConfig};

/// Flushes buffered events when dropped; hold it for the life of `main`
pub struct LoggingGuard(tracing_appender::non_blocking::WorkerGuard);

fn filter_for(cfg: &LoggingConfig) -> EnvFilter {
    std::env::var("RUST_LOG")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(EnvFilter::new)
        .unwrap_or_else(|| EnvFilter::new(cfg.filter_directives.clone()))
}

pub fn init_logging(cfg: &LoggingConfig) ->
    Result<LoggingGuard, crate::errors::CrawlerError> {

    let (writer, guard) = non_blocking(std::io::stdout());
    let time = fmt::time::UtcTime::rfc_3339();

    let json_layer = (cfg.format == LogFormat::Json).then(|| {
        fmt::layer()
            .with_writer(writer.clone())
            .with_timer(time.clone())
            .with_target(cfg.include_target)
            .with_file(cfg.include_file_line)
            .with_line_number(cfg.include_file_line)
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_span_list(true)
    });

    let pretty_layer = (cfg.format == LogFormat::Pretty).then(|| {
        fmt::layer()
            .with_writer(writer)
            .with_timer(time)
            .with_ansi(cfg.with_ansi)
            .with_target(cfg.include_target)
            .with_file(cfg.include_file_line)
            .with_line_number(cfg.include_file_line)
            .pretty()
    });

    tracing_subscriber::registry()
        .with(filter_for(cfg))
        .with(json_layer)
        .with(pretty_layer)
        .with(ErrorLayer::default())
        .try_init()
        .map_err(|e| crate::errors::CrawlerError::Config(
            format!("logging already initialized: {e}")
        ))?;

    Ok( LoggingGuard(guard) )
}

//! Structured logging setup: env-filtered `tracing-subscriber`, JSON or
//! pretty format, optional file rotation via `tracing-appender`.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::domain::models::config::LogFormat;
use crate::domain::models::SwarmConfig;

/// Holds the non-blocking file writer guard; dropping this flushes and
/// stops the background writer thread, so the caller must keep it alive
/// for the process lifetime.
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

pub fn init(config: &SwarmConfig) -> Result<LoggingGuard, String> {
    let env_filter = EnvFilter::builder().with_default_directive(config.logging.level.parse().map_err(|_| format!("invalid log level: {}", config.logging.level))?).from_env_lossy();

    let stdout_layer: Box<dyn tracing_subscriber::Layer<tracing_subscriber::Registry> + Send + Sync> = match config.logging.format {
        LogFormat::Json => tracing_subscriber::fmt::layer().json().with_target(true).with_current_span(true).boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer().pretty().with_target(true).with_span_events(FmtSpan::CLOSE).boxed(),
    };

    let (file_layer, file_guard) = match &config.logging.file_path {
        Some(path) => {
            let dir = std::path::Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| std::path::Path::new("."));
            let file_name = std::path::Path::new(path).file_name().and_then(|n| n.to_str()).unwrap_or("swarm.log");
            let appender = tracing_appender::rolling::never(dir, file_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer().json().with_writer(non_blocking).with_ansi(false).boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry().with(env_filter).with(stdout_layer).with(file_layer).init();

    Ok(LoggingGuard { _file_guard: file_guard })
}

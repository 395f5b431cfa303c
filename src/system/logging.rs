//! Logging initialization
//!
//! Builds the tracing subscriber from the `[logging]` configuration
//! section: console or file output, optional daily rotation, text or JSON
//! formatting. Writes go through a non-blocking worker thread.

use tracing_appender::rolling;
use tracing_subscriber;

use crate::config::LoggingConfig;

/// Install the global tracing subscriber.
///
/// Call once at process startup, after configuration is loaded.
///
/// # Returns
/// * `WorkerGuard` - Must be kept alive for the duration of the program;
///   dropping it early loses buffered log lines
///
/// # Panics
/// * If the log file or appender cannot be created
/// * If a global subscriber is already installed
pub fn init_logging(config: &LoggingConfig) -> tracing_appender::non_blocking::WorkerGuard {
    let to_console = config.file.as_ref().is_none_or(|f| f.is_empty());
    let (writer, guard) = tracing_appender::non_blocking(make_writer(config));

    let builder = tracing_subscriber::fmt()
        .with_writer(writer)
        .with_env_filter(tracing_subscriber::EnvFilter::new(config.level.clone()))
        .with_level(true)
        // ANSI escapes only belong on a terminal
        .with_ansi(to_console);

    if config.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }

    guard
}

fn make_writer(config: &LoggingConfig) -> Box<dyn std::io::Write + Send + Sync> {
    let log_file = match config.file.as_deref() {
        Some(path) if !path.is_empty() => path,
        _ => return Box::new(std::io::stdout()),
    };

    if config.enable_rotation {
        // Daily rolling files next to the configured path
        let path = std::path::Path::new(log_file);
        let dir = path.parent().unwrap_or(std::path::Path::new("."));
        let prefix = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("linkshard.log")
            .trim_end_matches(".log");
        let appender = rolling::Builder::new()
            .rotation(rolling::Rotation::DAILY)
            .filename_prefix(prefix)
            .filename_suffix("log")
            .max_log_files(config.max_backups as usize)
            .build(dir)
            .expect("Failed to create rolling log appender");
        Box::new(appender)
    } else {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file)
            .expect("Failed to open log file");
        Box::new(file)
    }
}

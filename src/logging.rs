use std::fs;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;

/// Installs the global subscriber: a console layer and an optional JSON file
/// layer with daily rotation. `RUST_LOG` overrides the configured level.
///
/// Hold the returned guard until exit so buffered file logs are flushed.
pub fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("factbook_scraper={},info", config.level))
    });

    let (file_layer, guard) = if config.log_to_file {
        match fs::create_dir_all(&config.directory) {
            Ok(()) => {
                let file_appender =
                    tracing_appender::rolling::daily(&config.directory, "factbook_scraper.log");
                let (writer, guard) = tracing_appender::non_blocking(file_appender);
                (Some(fmt::layer().json().with_writer(writer)), Some(guard))
            }
            Err(e) => {
                eprintln!(
                    "Cannot create log directory {}: {}; file logging disabled",
                    config.directory.display(),
                    e
                );
                (None, None)
            }
        }
    } else {
        (None, None)
    };

    let console_layer = config
        .log_to_console
        .then(|| fmt::layer().with_writer(std::io::stderr));

    // a second init (e.g. from tests) keeps the first subscriber
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .try_init();

    guard
}

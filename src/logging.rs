use std::env;
use std::path::PathBuf;

use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const LOG_DIR: &str = ".intellidoc";
const LOG_FILE: &str = "chat.log";

/// Send logs to `.intellidoc/chat.log` so they don't interleave with the conversation
///
/// Returns the path of the log file.
pub fn setup_logging() -> anyhow::Result<PathBuf> {
    let log_dir = env::current_dir()?.join(LOG_DIR);
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = RollingFileAppender::new(Rotation::NEVER, &log_dir, LOG_FILE);

    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .with_target(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(file_layer)
        .init();

    Ok(log_dir.join(LOG_FILE))
}

//! Log output for the server binary
//!
//! Everything goes to stderr (stdout carries the JSON-RPC stream) and to
//! `logs/map_server.log`, which is truncated at start-up so each session
//! starts with a fresh file.

use std::fs;
use std::io;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

pub const DEFAULT_LOG_DIR: &str = "logs";
pub const DEFAULT_LOG_FILE: &str = "map_server.log";

/// Keeps the file writer alive; dropping it flushes the log
pub struct LoggingGuard {
    _file_guard: WorkerGuard,
}

/// Install the global subscriber; filter from `RUST_LOG`, default `info`
pub fn init_logging(log_dir: &Path, log_file: &str) -> io::Result<LoggingGuard> {
    truncate_log(log_dir, log_file)?;

    let appender = tracing_appender::rolling::never(log_dir, log_file);
    let (file_writer, file_guard) = tracing_appender::non_blocking(appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false);
    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(io::stderr);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .init();

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}

fn truncate_log(log_dir: &Path, log_file: &str) -> io::Result<()> {
    fs::create_dir_all(log_dir)?;
    fs::write(log_dir.join(log_file), "")
}

#[cfg(test)]
mod tests {
    use super::*;

    // The global subscriber can only be installed once per process, so only
    // the file preparation is tested here.
    #[test]
    fn test_truncate_creates_and_clears() {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("logs");

        truncate_log(&logs, DEFAULT_LOG_FILE).unwrap();
        let path = logs.join(DEFAULT_LOG_FILE);
        assert_eq!(fs::read_to_string(&path).unwrap(), "");

        fs::write(&path, "previous session").unwrap();
        truncate_log(&logs, DEFAULT_LOG_FILE).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "");
    }
}

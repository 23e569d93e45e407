use std::path::Path;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const LOG_PREFIX: &str = "podarc.log";

/// Log to stderr and to a daily file under `logs_dir`.
///
/// `RUST_LOG` wins when set; otherwise `-v` raises the level from `INFO`.
/// Keep the guard alive for as long as the file should be written to.
pub fn init(logs_dir: &Path, verbosity: u8) -> WorkerGuard {
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::default().add_directive(level.into()));

    let file = tracing_appender::rolling::daily(logs_dir, LOG_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false).compact().with_filter(filter()))
        .with(fmt::layer().with_writer(writer).with_ansi(false).with_filter(filter()))
        .init();
    guard
}

use std::fs;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Where log output goes. Stdout is reserved for the conversation itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    Stderr { verbose: bool },
    File(PathBuf),
}

impl LogTarget {
    #[must_use]
    pub fn from_args(verbose: bool, log_file: Option<PathBuf>) -> Self {
        log_file.map_or(Self::Stderr { verbose }, Self::File)
    }

    const fn default_directive(&self) -> &'static str {
        match self {
            Self::Stderr { verbose: false } => "warn",
            Self::Stderr { verbose: true } => "info",
            Self::File(_) => "debug",
        }
    }
}

/// Installs the global subscriber. Keep the guard alive until exit so
/// buffered lines are flushed.
pub fn init(target: &LogTarget) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(target.default_directive()));

    let (result, guard) = match target {
        LogTarget::File(path) => {
            let file = match fs::OpenOptions::new().create(true).append(true).open(path) {
                Ok(f) => f,
                Err(e) => {
                    eprintln!("Failed to open log file {}: {e}", path.display());
                    return None;
                }
            };
            let (writer, guard) = tracing_appender::non_blocking(file);
            let subscriber = tracing_subscriber::registry().with(filter).with(
                fmt::layer()
                    .json()
                    .with_writer(writer)
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true),
            );
            (tracing::subscriber::set_global_default(subscriber), guard)
        }
        LogTarget::Stderr { .. } => {
            let (writer, guard) = tracing_appender::non_blocking(std::io::stderr());
            let subscriber = tracing_subscriber::registry().with(filter).with(
                fmt::layer()
                    .compact()
                    .with_writer(writer)
                    .with_target(false),
            );
            (tracing::subscriber::set_global_default(subscriber), guard)
        }
    };

    if result.is_err() {
        eprintln!("Failed to set tracing subscriber");
        return None;
    }

    tracing::debug!(?target, "Logging initialized");
    Some(guard)
}

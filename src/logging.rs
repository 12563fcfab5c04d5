//! Log output for the consultant server and its helper binaries.
//!
//! Pipeline stages emit structured `tracing` events (`stage`, `kind`, `elapsed_ms`, ...). They
//! are rendered twice: compact lines on stdout for the hosting platform, and an ANSI-free copy in
//! a file for later inspection of degraded answers. `RDCONSULT_LOG_FILE` pins the file path;
//! without it the file rolls daily under `logs/`.
use std::path::PathBuf;
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const LOG_FILE_ENV: &str = "RDCONSULT_LOG_FILE";
const DEFAULT_LOG_DIR: &str = "logs";
const DEFAULT_LOG_FILE: &str = "rdconsult.log";

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Where the file copy of the log goes.
#[derive(Debug, Clone, PartialEq, Eq)]
enum LogTarget {
    /// Single file appended to across restarts.
    Pinned(PathBuf),
    /// Daily-rolled file inside a directory.
    Daily { dir: PathBuf, file_name: String },
}

impl LogTarget {
    fn resolve(pinned: Option<String>) -> Self {
        match pinned.filter(|path| !path.trim().is_empty()) {
            Some(path) => Self::Pinned(PathBuf::from(path.trim())),
            None => Self::Daily {
                dir: PathBuf::from(DEFAULT_LOG_DIR),
                file_name: DEFAULT_LOG_FILE.to_string(),
            },
        }
    }

    fn open(&self) -> std::io::Result<NonBlocking> {
        let (writer, guard) = match self {
            Self::Pinned(path) => {
                let file = std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)?;
                tracing_appender::non_blocking(file)
            }
            Self::Daily { dir, file_name } => {
                std::fs::create_dir_all(dir)?;
                tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, file_name))
            }
        };
        let _ = LOG_GUARD.set(guard);
        Ok(writer)
    }
}

/// Install the global subscriber. `RUST_LOG` filters both outputs (default `info`).
///
/// An unwritable log file only disables the file copy; stdout logging still starts.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(false).compact());

    let target = LogTarget::resolve(std::env::var(LOG_FILE_ENV).ok());
    match target.open() {
        Ok(writer) => registry
            .with(
                fmt::layer()
                    .with_writer(writer)
                    .with_target(true)
                    .with_ansi(false)
                    .compact(),
            )
            .init(),
        Err(err) => {
            registry.init();
            tracing::warn!(log_target = ?target, error = %err, "File logging disabled");
        }
    }
}

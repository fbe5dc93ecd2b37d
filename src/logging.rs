//! Console and file logging.
//!
//! Everything goes to stderr (stdout is reserved for command output) and to
//! `{log_dir}/stow.log`. `RUST_LOG` wins over the `-v`/`-q` default.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*};

const LOG_FILE: &str = "stow.log";

/// Install the global subscriber. Keep the guard alive until exit or buffered
/// file output is lost.
pub fn init(log_dir: &Path, default_level: &str) -> Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir).or_raise(|| ErrorKind::Logging)?;
    let (file_writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(log_dir, LOG_FILE));

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let console = fmt::layer().with_writer(std::io::stderr);
    let file = fmt::layer().with_ansi(false).with_writer(file_writer);
    Registry::default().with(env_filter).with(console).with(file).try_init().or_raise(|| ErrorKind::Logging)?;
    Ok(guard)
}

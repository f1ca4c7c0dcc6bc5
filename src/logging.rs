//! Tracing setup.
//!
//! Two sinks: a per-invocation log file under the configured log
//! directory (always at least info level) and stderr (warnings only
//! unless `--verbose`). `RUST_LOG` overrides both when set.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::error::MigrateError;

/// Initialize the global subscriber. Returns the log file path.
pub fn init(log_dir: &Path, verbose: bool) -> Result<PathBuf, MigrateError> {
    fs::create_dir_all(log_dir).map_err(|e| MigrateError::io(log_dir, e))?;
    let log_path = log_dir.join(format!("migration_{}.log", Utc::now().format("%Y%m%d_%H%M%S")));
    let file = fs::File::create(&log_path).map_err(|e| MigrateError::io(&log_path, e))?;

    let default_directive = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(Arc::new(file))
        .with_ansi(false)
        .with_target(true);

    let stderr_level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::WARN
    };
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .with_filter(stderr_level);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stderr_layer)
        .init();

    Ok(log_path)
}

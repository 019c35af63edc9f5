//! Utility functions and helpers
//!
//! Logging setup and display formatting shared by the binary and the library.

use crate::config::{LogFormat, LogLevel};
use crate::{Error, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer, Registry};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` overrides `level` when set. When `file` is given, events are
/// also appended to it through a background writer; keep the returned guard
/// alive until shutdown so buffered lines are flushed.
pub fn init_logging(
    level: LogLevel,
    format: LogFormat,
    file: Option<&Path>,
) -> Result<Option<WorkerGuard>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    let mut layers: Vec<BoxedLayer> = vec![match format {
        LogFormat::Json => fmt::layer().json().with_target(false).boxed(),
        LogFormat::Plain => fmt::layer().with_target(false).boxed(),
    }];

    let guard = match file {
        Some(path) => {
            let (writer, guard) = tracing_appender::non_blocking(open_log_file(path)?);
            layers.push(match format {
                LogFormat::Json => fmt::layer().json().with_writer(writer).boxed(),
                LogFormat::Plain => fmt::layer().with_ansi(false).with_writer(writer).boxed(),
            });
            Some(guard)
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .map_err(|e| Error::config(format!("Failed to install logger: {}", e)))?;

    Ok(guard)
}

fn open_log_file(path: &Path) -> Result<tracing_appender::rolling::RollingFileAppender> {
    let file_name = path
        .file_name()
        .ok_or_else(|| Error::config(format!("Invalid log file path: {}", path.display())))?;
    let directory = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    Ok(tracing_appender::rolling::never(directory, file_name))
}

/// Format hash rate as a human-readable string
pub fn format_hash_rate(hashes_per_sec: f64) -> String {
    const UNITS: &[&str] = &["H/s", "KH/s", "MH/s", "GH/s", "TH/s"];
    let mut rate = hashes_per_sec;
    let mut unit_index = 0;

    while rate >= 1000.0 && unit_index < UNITS.len() - 1 {
        rate /= 1000.0;
        unit_index += 1;
    }

    format!("{:.2} {}", rate, UNITS[unit_index])
}

/// Format duration as a human-readable string
pub fn format_duration(seconds: u64) -> String {
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else {
        let hours = seconds / 3600;
        let minutes = (seconds % 3600) / 60;
        format!("{}h {}m {}s", hours, minutes, seconds % 60)
    }
}

//! Console and log-file output.
//!
//! Every diagnostic is a `tracing` event. Events go to stderr and, through a
//! non-blocking writer, to the log file, which is truncated at startup.
//! Echoed readings use [`READINGS_TARGET`]; they are printed in color on
//! stdout by the loop and therefore kept out of the console layer.
//!
//! `RUST_LOG` overrides the filter derived from the verbosity switches.

use std::fs::File;
use std::path::Path;

use tracing::Subscriber;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use crate::config::Verbosity;
use crate::error::{ConfigError, Result};

/// Target of the per-message echo events.
pub const READINGS_TARGET: &str = "f007th_send::readings";

/// Build the subscriber without installing it. The guard flushes the log
/// file when dropped and must outlive every event.
pub fn subscriber(
    verbosity: Verbosity,
    log_file: &Path,
) -> Result<(impl Subscriber + Send + Sync + 'static, WorkerGuard)> {
    let file = File::create(log_file).map_err(|source| ConfigError::LogFile {
        path: log_file.display().to_string(),
        source,
    })?;
    let (writer, guard) = tracing_appender::non_blocking(file);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.filter_directive()));

    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(filter_fn(|meta| meta.target() != READINGS_TARGET));

    let file_layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(false);

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file_layer);
    Ok((subscriber, guard))
}

/// Install the global subscriber (and the `log` bridge used by reqwest's
/// connection tracing).
pub fn init(verbosity: Verbosity, log_file: &Path) -> Result<WorkerGuard> {
    let (subscriber, guard) = subscriber(verbosity, log_file)?;
    if let Err(e) = subscriber.try_init() {
        eprintln!("WARNING: logging already initialized: {e}");
    }
    Ok(guard)
}

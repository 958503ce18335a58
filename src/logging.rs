//! Structured logging configuration
//!
//! Three-level span hierarchy: commands (bootstrap, delete, recreate,
//! upgrade), steps (build hardware, wait for install), and leaf operations
//! (one `govc` call, one upload). Format and destination are chosen on the
//! command line; file output goes through a non-blocking appender.

use std::fs;
use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::Registry;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

const LOG_FILE_NAME: &str = "vcenter-vm-bootstrap.log";

/// Logging format options for different environments
#[derive(Clone, Debug, clap::ValueEnum)]
pub enum LogFormat {
    /// Pretty-printed console output for development
    Pretty,
    /// JSON output for production environments
    Json,
    /// Compact console output for minimal verbosity (default)
    Compact,
}

/// Where log lines go
#[derive(Clone, Debug, clap::ValueEnum)]
pub enum LogOutput {
    /// stderr only
    Stderr,
    /// Log file only
    File,
    /// Both stderr and the log file
    FileAndStderr,
}

/// Errors during logging initialization
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("failed to create log directory '{path}': {source}")]
    LogDirectory {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Builder wiring format, output, and filtering together
///
/// Returns a [`WorkerGuard`] when file output is enabled; the caller must
/// hold it for the process lifetime or buffered lines are lost on exit.
pub struct LoggingBuilder {
    format: LogFormat,
    output: LogOutput,
    log_dir: PathBuf,
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

impl LoggingBuilder {
    #[must_use]
    pub fn new(format: LogFormat, output: LogOutput, log_dir: PathBuf) -> Self {
        Self {
            format,
            output,
            log_dir,
        }
    }

    /// Install the global subscriber
    ///
    /// # Errors
    ///
    /// Returns an error when the log directory cannot be created.
    ///
    /// # Panics
    ///
    /// Panics when a global subscriber is already installed; logging is
    /// initialized exactly once at startup.
    pub fn init(self) -> Result<Option<WorkerGuard>, LoggingError> {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let mut layers: Vec<BoxedLayer> = Vec::new();
        let mut guard = None;

        if matches!(self.output, LogOutput::Stderr | LogOutput::FileAndStderr) {
            layers.push(Self::make_layer(&self.format, std::io::stderr, true));
        }

        if matches!(self.output, LogOutput::File | LogOutput::FileAndStderr) {
            fs::create_dir_all(&self.log_dir).map_err(|source| LoggingError::LogDirectory {
                path: self.log_dir.display().to_string(),
                source,
            })?;
            let appender = tracing_appender::rolling::never(&self.log_dir, LOG_FILE_NAME);
            let (writer, worker_guard) = tracing_appender::non_blocking(appender);
            guard = Some(worker_guard);
            layers.push(Self::make_layer(&self.format, writer, false));
        }

        tracing_subscriber::registry().with(layers).with(filter).init();
        Ok(guard)
    }

    fn make_layer<W>(format: &LogFormat, writer: W, ansi: bool) -> BoxedLayer
    where
        W: for<'w> fmt::MakeWriter<'w> + Send + Sync + 'static,
    {
        match format {
            LogFormat::Pretty => fmt::layer()
                .with_writer(writer)
                .with_ansi(ansi)
                .pretty()
                .boxed(),
            LogFormat::Json => fmt::layer().with_writer(writer).json().boxed(),
            LogFormat::Compact => fmt::layer()
                .with_writer(writer)
                .with_ansi(ansi)
                .compact()
                .boxed(),
        }
    }
}

/// Path of the log file inside a log directory
#[must_use]
pub fn log_file_path(log_dir: &Path) -> PathBuf {
    log_dir.join(LOG_FILE_NAME)
}

//! Logging initialization
//!
//! Installs a global `tracing` subscriber from a [`LoggingConfig`]. File
//! output goes through a non-blocking writer whose buffer is flushed when
//! the returned [`LoggingGuard`] drops, so hold it for the life of the
//! process.
//!
//! ```rust,no_run
//! use relaymcp_server::LoggingConfig;
//!
//! // Stderr only, no guard
//! LoggingConfig::stderr_minimal().init()?;
//!
//! // Files, guard must be held
//! let _guard = LoggingConfig::file_only("/var/log/relaymcp").init()?;
//! # Ok::<(), std::io::Error>(())
//! ```
//!
//! | Output | Guard |
//! |---|---|
//! | `Stderr` | no |
//! | `FileOnly` | yes |
//! | `Both` | yes |
//! | `None` | no |

use std::io;
use std::path::Path;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::RollingFileAppender;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::{LogOutput, LogRotation, LoggingConfig};

/// Flushes buffered file logs on drop
#[derive(Debug)]
pub struct LoggingGuard {
    _file_guard: WorkerGuard,
    _stderr_guard: Option<WorkerGuard>,
}

impl LoggingConfig {
    /// Install the global subscriber
    ///
    /// `RUST_LOG` overrides [`LoggingConfig::level`]. Returns a guard for
    /// file-based output.
    ///
    /// # Errors
    ///
    /// Returns an error if file output has no directory, the directory
    /// cannot be created, or a global subscriber is already installed.
    pub fn init(&self) -> io::Result<Option<LoggingGuard>> {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level));

        match self.output {
            LogOutput::None => Ok(None),
            LogOutput::Stderr => {
                install(self.structured, filter, io::stderr)?;
                Ok(None)
            }
            LogOutput::FileOnly => {
                let (writer, file_guard) = self.file_writer()?;
                install(self.structured, filter, writer)?;
                Ok(Some(LoggingGuard {
                    _file_guard: file_guard,
                    _stderr_guard: None,
                }))
            }
            LogOutput::Both => {
                let (file_writer, file_guard) = self.file_writer()?;
                let (stderr_writer, stderr_guard) = tracing_appender::non_blocking(io::stderr());
                install(self.structured, filter, file_writer.and(stderr_writer))?;
                Ok(Some(LoggingGuard {
                    _file_guard: file_guard,
                    _stderr_guard: Some(stderr_guard),
                }))
            }
        }
    }

    fn file_writer(&self) -> io::Result<(NonBlocking, WorkerGuard)> {
        let dir = self.directory.as_deref().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                "File logging requires a directory",
            )
        })?;
        std::fs::create_dir_all(dir)?;
        Ok(tracing_appender::non_blocking(appender(
            self.rotation,
            dir,
            &self.file_prefix,
        )))
    }
}

fn appender(rotation: LogRotation, dir: &Path, prefix: &str) -> RollingFileAppender {
    match rotation {
        LogRotation::Minute => tracing_appender::rolling::minutely(dir, prefix),
        LogRotation::Hourly => tracing_appender::rolling::hourly(dir, prefix),
        LogRotation::Daily => tracing_appender::rolling::daily(dir, prefix),
        LogRotation::Never => tracing_appender::rolling::never(dir, prefix),
    }
}

fn install<W>(structured: bool, filter: EnvFilter, writer: W) -> io::Result<()>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let subscriber = tracing_subscriber::registry().with(filter);
    let result = if structured {
        subscriber
            .with(fmt::layer().json().with_writer(writer))
            .try_init()
    } else {
        subscriber.with(fmt::layer().with_writer(writer)).try_init()
    };
    result.map_err(|e| io::Error::other(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_output_requires_directory() {
        let config = LoggingConfig {
            output: LogOutput::FileOnly,
            directory: None,
            ..LoggingConfig::default()
        };
        let err = config.init().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);

        let config = LoggingConfig {
            output: LogOutput::Both,
            directory: None,
            ..LoggingConfig::default()
        };
        assert!(config.init().is_err());
    }

    #[test]
    fn test_none_output_installs_nothing() {
        let config = LoggingConfig {
            output: LogOutput::None,
            ..LoggingConfig::default()
        };
        assert!(config.init().unwrap().is_none());
    }

    #[test]
    fn test_file_only_preset() {
        let dir = tempfile::tempdir().unwrap();
        let config = LoggingConfig::file_only(dir.path());
        assert_eq!(config.output, LogOutput::FileOnly);
        let (_writer, _guard) = config.file_writer().unwrap();
        assert!(dir.path().exists());
    }
}

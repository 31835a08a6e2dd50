//! Structured logging
//!
//! Installs the global `tracing` subscriber: JSON or text output, level
//! filtering through `RUST_LOG` or the configured level, and a size-rotated
//! log file when writing to disk.

use crate::core::config::LoggingConfig;
use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Keeps the background log writer alive for the lifetime of the process
pub struct Logger {
    _guard: WorkerGuard,
}

impl Logger {
    /// Initialize the global subscriber from configuration
    pub fn init(config: &LoggingConfig) -> Result<Self> {
        let level = parse_log_level(&config.level)?;

        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("{},tower_http=info", level.as_str().to_lowercase())));

        let (writer, guard) = build_writer(config)?;

        let fmt_layer = match config.format.as_str() {
            "json" => fmt::layer()
                .json()
                .with_writer(writer)
                .with_span_events(FmtSpan::CLOSE)
                .with_current_span(true)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .boxed(),
            "text" => fmt::layer()
                .with_writer(writer)
                .with_span_events(FmtSpan::CLOSE)
                .with_target(true)
                .with_ansi(config.output == "stdout")
                .boxed(),
            other => anyhow::bail!("Invalid format configuration: {}", other),
        };

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .context("Failed to initialize tracing subscriber")?;

        tracing::info!(
            level = %config.level,
            format = %config.format,
            output = %config.output,
            "Logging system initialized"
        );

        Ok(Logger { _guard: guard })
    }
}

fn build_writer(config: &LoggingConfig) -> Result<(NonBlocking, WorkerGuard)> {
    match config.output.as_str() {
        "stdout" => Ok(tracing_appender::non_blocking(io::stdout())),
        "file" => {
            let log_file = config
                .log_file
                .as_ref()
                .context("log_file must be specified when output is 'file'")?;

            if let Some(parent) = log_file.parent() {
                fs::create_dir_all(parent).context("Failed to create log directory")?;
            }

            let appender = SizeRotatingFile::new(log_file, config.max_file_size, config.max_backups);
            Ok(tracing_appender::non_blocking(appender))
        }
        other => anyhow::bail!("Invalid output configuration: {}", other),
    }
}

/// Parse log level string to tracing Level
fn parse_log_level(level: &str) -> Result<Level> {
    match level.to_lowercase().as_str() {
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => anyhow::bail!("Invalid log level: {}", level),
    }
}

/// Log file that rolls over to `<name>.1`, `<name>.2`, ... once it exceeds a size
///
/// Owned exclusively by the non-blocking worker thread, so no locking is needed.
pub struct SizeRotatingFile {
    path: PathBuf,
    max_file_size: usize,
    max_backups: usize,
    file: Option<File>,
    written: usize,
}

impl SizeRotatingFile {
    pub fn new(path: &Path, max_file_size: usize, max_backups: usize) -> Self {
        Self {
            path: path.to_path_buf(),
            max_file_size,
            max_backups,
            file: None,
            written: 0,
        }
    }

    fn backup_path(&self, index: usize) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(format!(".{}", index));
        PathBuf::from(name)
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.file = None;

        let oldest = self.backup_path(self.max_backups);
        if oldest.exists() {
            fs::remove_file(&oldest)?;
        }
        for i in (1..self.max_backups).rev() {
            let from = self.backup_path(i);
            if from.exists() {
                fs::rename(&from, self.backup_path(i + 1))?;
            }
        }
        if self.path.exists() {
            fs::rename(&self.path, self.backup_path(1))?;
        }

        self.written = 0;
        Ok(())
    }

    fn file(&mut self) -> io::Result<&mut File> {
        if self.file.is_none() {
            let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
            self.written = file.metadata()?.len() as usize;
            self.file = Some(file);
        }
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "log file unavailable"))
    }
}

impl Write for SizeRotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        // Opening first loads the size of a pre-existing file
        self.file()?;
        if self.written > 0 && self.written + buf.len() > self.max_file_size {
            self.rotate()?;
        }

        let written = self.file()?.write(buf)?;
        self.written += written;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_level() {
        assert!(matches!(parse_log_level("debug"), Ok(Level::DEBUG)));
        assert!(matches!(parse_log_level("INFO"), Ok(Level::INFO)));
        assert!(matches!(parse_log_level("warn"), Ok(Level::WARN)));
        assert!(matches!(parse_log_level("error"), Ok(Level::ERROR)));
        assert!(parse_log_level("verbose").is_err());
    }

    #[test]
    fn test_rotation_keeps_bounded_backups() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("bookhub.log");
        let mut file = SizeRotatingFile::new(&log_path, 16, 2);

        for _ in 0..5 {
            file.write_all(b"0123456789ab\n").unwrap();
        }
        file.flush().unwrap();

        assert!(log_path.exists());
        assert!(dir.path().join("bookhub.log.1").exists());
        assert!(dir.path().join("bookhub.log.2").exists());
        assert!(!dir.path().join("bookhub.log.3").exists());
        assert_eq!(fs::read_to_string(&log_path).unwrap(), "0123456789ab\n");
    }
}

//! Rolling Logger
//!
//! Installs a `tracing` subscriber that writes to daily log files
//! (`<app>.<YYYY-MM-DD>.log`) and mirrors to stderr. Only the newest
//! `max_files` files are kept. The most recent lines are also held in a
//! circular in-memory buffer so a UI can show them without reading files.

use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use chrono::{Local, NaiveDate};
use parking_lot::Mutex;
use thiserror::Error;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

const DEFAULT_MAX_FILES: usize = 7;
const DEFAULT_BUFFER_LINES: usize = 500;
const DEFAULT_FILTER: &str = "info";

static LOGGER: OnceLock<RollingLogger> = OnceLock::new();

#[derive(Debug, Error)]
pub enum LoggerError {
    #[error("Failed to prepare log directory {path}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Logger already initialized: {0}")]
    AlreadyInitialized(String),
    #[error("Logger not initialized")]
    NotInitialized,
}

/// Logger settings
#[derive(Debug, Clone)]
pub struct LoggerOptions {
    pub dir: PathBuf,
    pub app_name: String,
    /// Number of daily files kept on disk
    pub max_files: usize,
    /// Lines kept in the in-memory buffer
    pub buffer_lines: usize,
    /// Used when `RUST_LOG` is not set
    pub default_filter: String,
}

impl LoggerOptions {
    pub fn new(dir: impl Into<PathBuf>, app_name: &str) -> Self {
        Self {
            dir: dir.into(),
            app_name: app_name.to_string(),
            max_files: DEFAULT_MAX_FILES,
            buffer_lines: DEFAULT_BUFFER_LINES,
            default_filter: DEFAULT_FILTER.to_string(),
        }
    }
}

struct CurrentFile {
    date: NaiveDate,
    file: File,
}

struct Shared {
    options: LoggerOptions,
    current: Mutex<Option<CurrentFile>>,
    recent: Mutex<VecDeque<String>>,
}

/// Daily-rotating file writer with a circular line buffer
#[derive(Clone)]
pub struct RollingLogger {
    shared: Arc<Shared>,
}

impl RollingLogger {
    pub fn new(options: LoggerOptions) -> Result<Self, LoggerError> {
        fs::create_dir_all(&options.dir).map_err(|source| LoggerError::Directory {
            path: options.dir.clone(),
            source,
        })?;
        Ok(Self {
            shared: Arc::new(Shared {
                current: Mutex::new(None),
                recent: Mutex::new(VecDeque::with_capacity(options.buffer_lines)),
                options,
            }),
        })
    }

    /// Most recent lines, oldest first
    pub fn recent_lines(&self) -> Vec<String> {
        self.shared.recent.lock().iter().cloned().collect()
    }

    /// Path of the file written for `date`
    pub fn file_for(&self, date: NaiveDate) -> PathBuf {
        let options = &self.shared.options;
        options
            .dir
            .join(format!("{}.{}.log", options.app_name, date.format("%Y-%m-%d")))
    }

    fn write_record(&self, buf: &[u8]) -> io::Result<()> {
        self.remember(buf);

        let today = Local::now().date_naive();
        let mut current = self.shared.current.lock();
        let stale = current.as_ref().map_or(true, |c| c.date != today);
        if stale {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(self.file_for(today))?;
            *current = Some(CurrentFile { date: today, file });
            self.prune()?;
        }
        match current.as_mut() {
            Some(c) => c.file.write_all(buf),
            None => Ok(()),
        }
    }

    fn remember(&self, buf: &[u8]) {
        let capacity = self.shared.options.buffer_lines;
        if capacity == 0 {
            return;
        }
        let text = String::from_utf8_lossy(buf);
        let mut recent = self.shared.recent.lock();
        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            if recent.len() == capacity {
                recent.pop_front();
            }
            recent.push_back(line.to_string());
        }
    }

    /// Delete the oldest log files beyond `max_files`
    fn prune(&self) -> io::Result<()> {
        let options = &self.shared.options;
        let mut logs = log_files(&options.dir, &options.app_name)?;
        if logs.len() <= options.max_files {
            return Ok(());
        }
        // Date-stamped names sort chronologically
        logs.sort();
        let excess = logs.len() - options.max_files;
        for old in logs.into_iter().take(excess) {
            fs::remove_file(old)?;
        }
        Ok(())
    }
}

fn log_files(dir: &Path, app_name: &str) -> io::Result<Vec<PathBuf>> {
    let prefix = format!("{app_name}.");
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let matches = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(&prefix) && n.ends_with(".log"));
        if matches {
            files.push(path);
        }
    }
    Ok(files)
}

impl Write for RollingLogger {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_record(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.shared.current.lock().as_mut() {
            Some(c) => c.file.flush(),
            None => Ok(()),
        }
    }
}

impl<'a> MakeWriter<'a> for RollingLogger {
    type Writer = RollingLogger;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Install the global logger with default options
pub fn init_logger(dir: impl Into<PathBuf>, app_name: &str) -> Result<(), LoggerError> {
    init_logger_with(LoggerOptions::new(dir, app_name))
}

/// Install the global logger
pub fn init_logger_with(options: LoggerOptions) -> Result<(), LoggerError> {
    if LOGGER.get().is_some() {
        return Err(LoggerError::AlreadyInitialized(
            "rolling logger".to_string(),
        ));
    }
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&options.default_filter));
    let logger = RollingLogger::new(options)?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(logger.clone().and(io::stderr))
        .try_init()
        .map_err(|e| LoggerError::AlreadyInitialized(e.to_string()))?;

    let _ = LOGGER.set(logger);
    tracing::info!("Logger initialized");
    Ok(())
}

/// Recent lines of the global logger; empty before initialization
pub fn recent_lines() -> Vec<String> {
    LOGGER.get().map(RollingLogger::recent_lines).unwrap_or_default()
}

pub fn info(message: &str) -> Result<(), LoggerError> {
    LOGGER.get().ok_or(LoggerError::NotInitialized)?;
    tracing::info!("{message}");
    Ok(())
}

pub fn error(message: &str) -> Result<(), LoggerError> {
    LOGGER.get().ok_or(LoggerError::NotInitialized)?;
    tracing::error!("{message}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(dir: &Path) -> LoggerOptions {
        LoggerOptions {
            max_files: 2,
            buffer_lines: 3,
            ..LoggerOptions::new(dir, "Taskboard")
        }
    }

    #[test]
    fn test_writes_to_dated_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut logger = RollingLogger::new(options(dir.path())).unwrap();

        logger.write_all(b"first line\n").unwrap();
        logger.flush().unwrap();

        let path = logger.file_for(Local::now().date_naive());
        let contents = fs::read_to_string(path).unwrap();
        assert_eq!(contents, "first line\n");
    }

    #[test]
    fn test_buffer_keeps_most_recent_lines() {
        let dir = tempfile::tempdir().unwrap();
        let mut logger = RollingLogger::new(options(dir.path())).unwrap();

        for i in 0..5 {
            logger.write_all(format!("line {i}\n").as_bytes()).unwrap();
        }

        assert_eq!(logger.recent_lines(), ["line 2", "line 3", "line 4"]);
    }

    #[test]
    fn test_old_files_are_pruned() {
        let dir = tempfile::tempdir().unwrap();
        for day in ["2020-01-01", "2020-01-02", "2020-01-03"] {
            fs::write(dir.path().join(format!("Taskboard.{day}.log")), "old\n").unwrap();
        }
        fs::write(dir.path().join("unrelated.txt"), "keep").unwrap();

        let mut logger = RollingLogger::new(options(dir.path())).unwrap();
        logger.write_all(b"today\n").unwrap();

        let mut remaining = log_files(dir.path(), "Taskboard").unwrap();
        remaining.sort();
        assert_eq!(remaining.len(), 2);
        assert_eq!(
            remaining[0].file_name().unwrap().to_str().unwrap(),
            "Taskboard.2020-01-03.log"
        );
        assert!(dir.path().join("unrelated.txt").exists());
    }

    #[test]
    fn test_helpers_require_init() {
        if LOGGER.get().is_none() {
            assert!(matches!(info("hello"), Err(LoggerError::NotInitialized)));
            assert!(recent_lines().is_empty());
        }
    }
}

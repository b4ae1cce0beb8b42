#![deny(missing_docs)]
//! Shared logging utilities for the trawler workspace.
//!
//! This crate provides the `trawl_*` logging macros used across the codebase,
//! the process-wide logger setup used by the CLI, and a minimal test
//! initializer for the global logger.

use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use log::LevelFilter;
use simplelog::{
    ColorChoice, CombinedLogger, Config, ConfigBuilder, SharedLogger, TermLogger, TerminalMode,
    WriteLogger,
};

/// Default log file written when a file destination is selected without a path.
pub const DEFAULT_LOG_FILE: &str = "./trawler.log";

/// Logs a trace-level message using the global logging facade.
#[macro_export]
macro_rules! trawl_trace {
    ($($arg:tt)*) => {{
        log::trace!($($arg)*);
    }};
}

/// Logs a debug-level message using the global logging facade.
#[macro_export]
macro_rules! trawl_debug {
    ($($arg:tt)*) => {{
        log::debug!($($arg)*);
    }};
}

/// Logs an info-level message using the global logging facade.
#[macro_export]
macro_rules! trawl_info {
    ($($arg:tt)*) => {{
        log::info!($($arg)*);
    }};
}

/// Logs a warn-level message using the global logging facade.
#[macro_export]
macro_rules! trawl_warn {
    ($($arg:tt)*) => {{
        log::warn!($($arg)*);
    }};
}

/// Logs an error-level message using the global logging facade.
#[macro_export]
macro_rules! trawl_error {
    ($($arg:tt)*) => {{
        log::error!($($arg)*);
    }};
}

/// Destination for log output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogDestination {
    /// Write to the terminal (stderr for warnings and errors).
    #[default]
    Terminal,
    /// Write to a log file.
    File,
    /// Write to both file and terminal.
    Both,
}

/// Returned when a log destination name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownDestination(pub String);

impl fmt::Display for UnknownDestination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown log destination '{}' (expected terminal, file or both)",
            self.0
        )
    }
}

impl std::error::Error for UnknownDestination {}

impl FromStr for LogDestination {
    type Err = UnknownDestination;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "terminal" | "term" => Ok(Self::Terminal),
            "file" => Ok(Self::File),
            "both" => Ok(Self::Both),
            other => Err(UnknownDestination(other.to_string())),
        }
    }
}

/// Initialize the global logger.
///
/// For `LogDestination::File` or `Both` the log is written to `file_path`, or
/// to [`DEFAULT_LOG_FILE`] when no path is given. If the file cannot be
/// created the file logger is skipped with a warning on stderr. Calling this
/// more than once keeps the first logger.
pub fn initialize(destination: LogDestination, level: LevelFilter, file_path: Option<&Path>) {
    let config = build_config();
    let log_path = file_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE));

    let mut loggers: Vec<Box<dyn SharedLogger>> = Vec::new();
    if matches!(destination, LogDestination::Terminal | LogDestination::Both) {
        loggers.push(TermLogger::new(
            level,
            config.clone(),
            TerminalMode::Mixed,
            ColorChoice::Auto,
        ));
    }
    if matches!(destination, LogDestination::File | LogDestination::Both) {
        if let Some(file_logger) = create_file_logger(level, config, &log_path) {
            loggers.push(file_logger);
        }
    }
    if loggers.is_empty() {
        return;
    }

    let _ = CombinedLogger::init(loggers);
}

/// Initializes a simple terminal logger for use in tests.
///
/// This safely no-ops if another logger has already been initialized.
pub fn initialize_for_tests() {
    // Use debug level in debug builds, info in release builds.
    let level = if cfg!(debug_assertions) {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    // Ignore the error if a logger was already set by another test.
    let _ = CombinedLogger::init(vec![TermLogger::new(
        level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )]);
}

fn build_config() -> Config {
    ConfigBuilder::new()
        .set_time_format_rfc3339()
        .set_target_level(LevelFilter::Error)
        .build()
}

fn create_file_logger(
    level: LevelFilter,
    config: Config,
    log_path: &Path,
) -> Option<Box<WriteLogger<File>>> {
    match File::create(log_path) {
        Ok(file) => Some(WriteLogger::new(level, config, file)),
        Err(err) => {
            eprintln!("Warning: Could not create log file at {:?}: {}", log_path, err);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::LogDestination;

    #[test]
    fn destination_names_parse_case_insensitively() {
        assert_eq!("Terminal".parse(), Ok(LogDestination::Terminal));
        assert_eq!("FILE".parse(), Ok(LogDestination::File));
        assert_eq!(" both ".parse(), Ok(LogDestination::Both));
        assert!("syslog".parse::<LogDestination>().is_err());
    }
}

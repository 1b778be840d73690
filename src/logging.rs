use clap::ValueEnum;
use flexi_logger::{
    Cleanup, Criterion, Duplicate, FileSpec, Logger, LoggerHandle, Naming, WriteMode,
};
use log::LevelFilter;

use crate::config::log_config;

/// Log verbosity, selectable from the command line. The library itself
/// never initialises logging; only the binary does.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::Trace,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Error => LevelFilter::Error,
        }
    }
}

impl LogLevel {
    fn as_spec(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Start logging to a rotated file under [`log_config::DIRECTORY`], with
/// errors mirrored to stderr. The returned handle must stay alive until
/// the program ends or buffered lines are lost.
#[must_use]
pub fn init(level: LogLevel) -> LoggerHandle {
    let file = FileSpec::default()
        .directory(log_config::DIRECTORY)
        .basename(log_config::BASENAME)
        .suffix("log");

    Logger::try_with_str(level.as_spec())
        .expect("log level names match the specification grammar")
        .log_to_file(file)
        .rotate(
            Criterion::Size(log_config::ROTATE_BYTES),
            Naming::Timestamps,
            Cleanup::KeepLogFiles(log_config::KEEP_FILES),
        )
        .write_mode(WriteMode::BufferAndFlush)
        .duplicate_to_stderr(Duplicate::Error)
        .start()
        .expect("logger initialisation failed")
}

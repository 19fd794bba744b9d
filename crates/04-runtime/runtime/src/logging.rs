//! Log levels and sink setup.
//!
//! Library code logs through the `log` macros; this module maps the five
//! runtime levels onto `log` filters and installs `env_logger` as the sink.

use std::fmt;
use std::str::FromStr;

use log::{error, LevelFilter};

use crate::error::RuntimeError;

/// Severity threshold, lowest first. `Fatal` is reserved for unrecoverable
/// startup failures and terminates the process.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Fatal,
}

impl LogLevel {
    pub fn filter(self) -> LevelFilter {
        match self {
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Error | LogLevel::Fatal => LevelFilter::Error,
        }
    }
}

impl FromStr for LogLevel {
    type Err = RuntimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            "fatal" => Ok(LogLevel::Fatal),
            other => Err(RuntimeError::InvalidLogLevel(other.to_owned())),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Fatal => "fatal",
        };
        f.write_str(name)
    }
}

/// Installs `env_logger` at `level`; `RUST_LOG` may still refine per-module
/// filters. Returns `false` if a logger was already installed.
pub fn init(level: LogLevel) -> bool {
    env_logger::Builder::new()
        .filter_level(level.filter())
        .parse_default_env()
        .try_init()
        .is_ok()
}

/// Logs `message` as fatal and exits the process with a failure code.
pub fn fatal(message: impl fmt::Display) -> ! {
    error!("FATAL: {message}");
    log::logger().flush();
    std::process::exit(1)
}

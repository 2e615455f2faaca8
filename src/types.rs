use std::str::FromStr;
use serde::Deserialize;

/// How the executer reacts when a task reports a failure.
///
/// - `FailFast`: skip every task that has not started yet and report the
///   failure once running tasks finish (default behaviour).
/// - `Continue`: keep executing every task that does not depend on the
///   failed one, and report all failures at the end.
///
/// Failures raised by the execution harness itself always abort, whatever
/// the mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureMode {
    FailFast,
    Continue,
}

impl Default for FailureMode {
    fn default() -> Self {
        FailureMode::FailFast
    }
}

impl FromStr for FailureMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fail-fast" | "failfast" => Ok(FailureMode::FailFast),
            "continue" => Ok(FailureMode::Continue),
            other => Err(format!(
                "invalid failure_mode: {other} (expected \"fail-fast\" or \"continue\")"
            )),
        }
    }
}

/// Log level accepted in config files and by [`crate::logging::init_logging`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            other => Err(format!("invalid log level: {other}")),
        }
    }
}

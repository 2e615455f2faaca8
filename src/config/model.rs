// src/config/model.rs

use serde::Deserialize;

use crate::types::{FailureMode, LogLevel};

/// Configuration as read from a TOML file, before validation.
///
/// ```toml
/// [executor]
/// parallel_threads = 4
/// failure_mode = "continue"
///
/// [logging]
/// level = "debug"
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    #[serde(default)]
    pub executor: ExecutorSection,

    #[serde(default)]
    pub logging: LoggingSection,
}

/// `[executor]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExecutorSection {
    /// Number of threads executing tasks, including the calling thread.
    ///
    /// `1` executes sequentially. If `None`, one thread per available
    /// processing unit is used.
    #[serde(default)]
    pub parallel_threads: Option<usize>,

    /// Upper bound applied to the effective thread count.
    #[serde(default = "default_max_parallel_threads")]
    pub max_parallel_threads: usize,

    /// `"fail-fast"` (default) or `"continue"`.
    #[serde(default)]
    pub failure_mode: FailureMode,
}

fn default_max_parallel_threads() -> usize {
    256
}

impl Default for ExecutorSection {
    fn default() -> Self {
        Self {
            parallel_threads: None,
            max_parallel_threads: default_max_parallel_threads(),
            failure_mode: FailureMode::default(),
        }
    }
}

/// `[logging]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingSection {
    /// If `None`, `TASKGRAPH_LOG` or `info` is used.
    #[serde(default)]
    pub level: Option<LogLevel>,
}

/// Validated configuration. Only obtainable through
/// `ConfigFile::try_from(RawConfigFile)` or the loader.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub executor: ExecutorSection,
    pub logging: LoggingSection,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(executor: ExecutorSection, logging: LoggingSection) -> Self {
        Self { executor, logging }
    }

    /// Effective number of executing threads.
    pub fn worker_count(&self) -> usize {
        self.executor
            .parallel_threads
            .unwrap_or_else(crate::exec::available_workers)
            .clamp(1, self.executor.max_parallel_threads.max(1))
    }

    pub fn failure_mode(&self) -> FailureMode {
        self.executor.failure_mode
    }
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self::new_unchecked(ExecutorSection::default(), LoggingSection::default())
    }
}

// src/errors.rs

//! Crate-wide error type, result alias and task failure records.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Where a recorded failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The task's own `execute` returned an error.
    Task,
    /// The harness around the task failed (listener error, panic).
    Execution,
}

/// A failure recorded against a single task during plan execution.
///
/// The underlying error is shared so that it can live both on the node and
/// in the plan's failure list. Callers can inspect it with
/// [`TaskFailure::error`] and `anyhow::Error::downcast_ref`.
#[derive(Debug, Clone)]
pub struct TaskFailure {
    task: String,
    kind: FailureKind,
    error: Arc<anyhow::Error>,
}

impl TaskFailure {
    pub fn new(task: impl Into<String>, kind: FailureKind, error: Arc<anyhow::Error>) -> Self {
        Self {
            task: task.into(),
            kind,
            error,
        }
    }

    /// Path of the task that failed.
    pub fn task(&self) -> &str {
        &self.task
    }

    pub fn kind(&self) -> FailureKind {
        self.kind
    }

    pub fn error(&self) -> &anyhow::Error {
        &self.error
    }

    /// Whether the failure was raised by the harness rather than the task.
    pub fn is_execution_failure(&self) -> bool {
        self.kind == FailureKind::Execution
    }
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            FailureKind::Task => write!(f, "Execution failed for task '{}': {}", self.task, self.error),
            FailureKind::Execution => {
                write!(f, "Task '{}' could not be executed: {}", self.task, self.error)
            }
        }
    }
}

impl std::error::Error for TaskFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        let inner: &(dyn std::error::Error + Send + Sync + 'static) = &**self.error;
        Some(inner)
    }
}

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Circular dependency between the following tasks:\n{0}")]
    CircularDependency(String),

    #[error("Task information is not available, as this task execution graph has not been populated: {0}")]
    GraphNotReady(&'static str),

    #[error(transparent)]
    TaskFailed(TaskFailure),

    #[error("{}", render_failures(.0))]
    MultipleFailures(Vec<TaskFailure>),

    #[error("failed to start worker thread '{name}': {source}")]
    WorkerSpawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("worker thread '{0}' panicked")]
    WorkerPanicked(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SchedulerError {
    /// All task failures carried by this error, in the order they were
    /// recorded. Empty for non-failure variants.
    pub fn failures(&self) -> Vec<&TaskFailure> {
        match self {
            SchedulerError::TaskFailed(failure) => vec![failure],
            SchedulerError::MultipleFailures(failures) => failures.iter().collect(),
            _ => Vec::new(),
        }
    }
}

fn render_failures(failures: &[TaskFailure]) -> String {
    let mut out = format!("Build completed with {} failures.", failures.len());
    for (i, failure) in failures.iter().enumerate() {
        out.push_str(&format!("\n  {}: {}", i + 1, failure));
    }
    out
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, SchedulerError>;

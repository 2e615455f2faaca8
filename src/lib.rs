// src/lib.rs

//! In-process task graph executer.
//!
//! Callers hand in requested [`Task`]s; the executer expands their
//! dependencies and finalizers into a graph, orders it, rejects cycles and
//! runs the plan on one or more worker threads.
//!
//! Typical flow:
//!
//! - build a [`TaskGraphExecuter`] (directly or from a [`ConfigFile`])
//! - optionally install a filter, a failure handler and listeners
//! - `add_tasks(...)` one or more batches
//! - `execute()`

pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod task;
pub mod types;

use std::path::Path;

use tracing::debug;

pub use crate::config::ConfigFile;
pub use crate::dag::{FailureAction, TaskExecutionPlan, TaskFailureHandler};
pub use crate::engine::TaskGraphExecuter;
pub use crate::errors::{FailureKind, SchedulerError, TaskFailure};
pub use crate::exec::{TaskExecutionListener, TaskGraphListener};
pub use crate::task::{Task, TaskFilter, TaskPath, TaskRef};
pub use crate::types::{FailureMode, LogLevel};

/// Load and validate a config file, set up logging from it and return a
/// ready executer.
///
/// An already installed tracing subscriber is left in place.
pub fn executer_from_path(path: impl AsRef<Path>) -> errors::Result<TaskGraphExecuter> {
    let cfg = config::load_and_validate(path.as_ref())?;
    if let Err(e) = logging::init_logging(cfg.logging.level) {
        debug!(error = %e, "keeping existing tracing subscriber");
    }
    debug!(path = %path.as_ref().display(), "loaded task graph config");
    Ok(TaskGraphExecuter::from_config(&cfg))
}

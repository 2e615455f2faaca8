// src/task.rs

//! The task abstraction consumed by the scheduler.
//!
//! The scheduler never looks inside a task: it only needs the task's
//! identity, its relations to other tasks, an optional mutual-exclusion key
//! and a way to run it.

use std::fmt;
use std::sync::Arc;

/// Canonical task identity type used throughout the crate.
pub type TaskPath = String;

/// Shared handle to a task.
pub type TaskRef = Arc<dyn Task>;

/// A unit of work the scheduler can plan and execute.
///
/// Implementations must be cheap to query: relation accessors are called
/// while the task graph is being built and may be called more than once.
pub trait Task: Send + Sync + fmt::Debug {
    /// Stable identity, e.g. `":core:compile"`.
    ///
    /// Paths also define the natural task order used wherever the scheduler
    /// needs a deterministic ordering.
    fn path(&self) -> &str;

    /// Tasks that must complete successfully before this one may start.
    fn dependencies(&self) -> Vec<TaskRef>;

    /// Tasks that must run once this task has run, even if nobody asked
    /// for them.
    fn finalized_by(&self) -> Vec<TaskRef> {
        Vec::new()
    }

    /// Tasks that, *if* they are part of the plan, must run before this one.
    fn must_run_after(&self) -> Vec<TaskRef> {
        Vec::new()
    }

    /// Tasks this one should run after when both are planned. Unlike
    /// [`must_run_after`](Task::must_run_after), the preference is dropped
    /// instead of failing the plan when it would create a cycle.
    fn should_run_after(&self) -> Vec<TaskRef> {
        Vec::new()
    }

    /// Tasks sharing a key never execute concurrently.
    fn mutex_key(&self) -> Option<&str> {
        None
    }

    /// Run the task's own work. An `Err` is a task failure.
    fn execute(&self) -> anyhow::Result<()>;
}

/// Inclusion predicate applied to every task reachable from the requested
/// ones.
pub type TaskFilter = Arc<dyn Fn(&dyn Task) -> bool + Send + Sync>;

/// Filter accepting every task.
pub fn satisfy_all() -> TaskFilter {
    Arc::new(|_: &dyn Task| true)
}

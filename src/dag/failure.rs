// src/dag/failure.rs

//! Failure policies applied when a task reports a failure.

use std::sync::Arc;

use crate::task::Task;
use crate::types::FailureMode;

/// What the plan should do after a task failure has been recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureAction {
    /// Keep scheduling independent tasks.
    Continue,
    /// Skip every task that has not started yet.
    Abort,
}

/// Decides how a task failure affects the rest of the plan.
///
/// Called under the plan lock, so implementations must not block.
pub trait TaskFailureHandler: Send + Sync {
    fn on_task_failure(&self, task: &dyn Task, failure: &anyhow::Error) -> FailureAction;
}

/// Stop at the first failure (the default).
#[derive(Debug, Clone, Copy, Default)]
pub struct FailFastHandler;

impl TaskFailureHandler for FailFastHandler {
    fn on_task_failure(&self, _task: &dyn Task, _failure: &anyhow::Error) -> FailureAction {
        FailureAction::Abort
    }
}

/// Record every failure and keep going.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContinueOnFailureHandler;

impl TaskFailureHandler for ContinueOnFailureHandler {
    fn on_task_failure(&self, _task: &dyn Task, _failure: &anyhow::Error) -> FailureAction {
        FailureAction::Continue
    }
}

/// Handler matching a configured [`FailureMode`].
pub fn handler_for(mode: FailureMode) -> Arc<dyn TaskFailureHandler> {
    match mode {
        FailureMode::FailFast => Arc::new(FailFastHandler),
        FailureMode::Continue => Arc::new(ContinueOnFailureHandler),
    }
}

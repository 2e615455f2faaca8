// src/exec/worker.rs

//! Worker loops that drain a [`TaskExecutionPlan`].

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use anyhow::anyhow;
use tracing::{debug, info, warn};

use crate::dag::{TaskExecutionPlan, TaskOutcome};
use crate::errors::Result;
use crate::exec::backend::{ExecutorFactory, ThreadExecutorFactory};
use crate::exec::listener::{SerializedListener, TaskExecutionListener};
use crate::task::TaskRef;

/// Runs a whole execution plan to completion.
pub trait TaskPlanExecutor: Send + Sync {
    /// Execute every planned task and return the aggregated failures.
    fn process(
        &self,
        plan: &Arc<TaskExecutionPlan>,
        listener: Arc<dyn TaskExecutionListener>,
    ) -> Result<()>;
}

/// Executes the plan on the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct SequentialPlanExecutor;

impl TaskPlanExecutor for SequentialPlanExecutor {
    fn process(
        &self,
        plan: &Arc<TaskExecutionPlan>,
        listener: Arc<dyn TaskExecutionListener>,
    ) -> Result<()> {
        run_worker(plan, listener.as_ref());
        plan.await_completion()
    }
}

/// Executes the plan on `worker_count` threads: the calling thread plus
/// `worker_count - 1` workers obtained from an [`ExecutorFactory`].
pub struct ParallelPlanExecutor {
    worker_count: usize,
    factory: Arc<dyn ExecutorFactory>,
}

impl ParallelPlanExecutor {
    pub fn new(worker_count: usize, factory: Arc<dyn ExecutorFactory>) -> Self {
        Self {
            worker_count: worker_count.max(1),
            factory,
        }
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }
}

impl TaskPlanExecutor for ParallelPlanExecutor {
    fn process(
        &self,
        plan: &Arc<TaskExecutionPlan>,
        listener: Arc<dyn TaskExecutionListener>,
    ) -> Result<()> {
        let listener: Arc<dyn TaskExecutionListener> = Arc::new(SerializedListener::new(listener));
        let mut workers = Vec::with_capacity(self.worker_count.saturating_sub(1));

        info!(workers = self.worker_count, "executing plan in parallel");

        for index in 1..self.worker_count {
            let name = format!("task-worker-{index}");
            let worker_plan = Arc::clone(plan);
            let worker_listener = Arc::clone(&listener);
            let job = Box::new(move || run_worker(&worker_plan, worker_listener.as_ref()));

            match self.factory.spawn(name, job) {
                Ok(handle) => workers.push(handle),
                Err(err) => {
                    // The calling thread still drains the plan, just with
                    // fewer helpers.
                    warn!(error = %err, "could not start worker; continuing with fewer workers");
                    break;
                }
            }
        }

        run_worker(plan, listener.as_ref());
        let result = plan.await_completion();

        for worker in workers {
            let name = worker.name().to_string();
            if let Err(err) = worker.join() {
                warn!(worker = %name, error = %err, "worker did not stop cleanly");
                if result.is_ok() {
                    return Err(err);
                }
            }
        }

        result
    }
}

/// Pick the executor for a worker count: one worker runs sequentially.
pub fn plan_executor_for(
    worker_count: usize,
    factory: Arc<dyn ExecutorFactory>,
) -> Box<dyn TaskPlanExecutor> {
    if worker_count <= 1 {
        Box::new(SequentialPlanExecutor)
    } else {
        Box::new(ParallelPlanExecutor::new(worker_count, factory))
    }
}

/// Default plan executor using OS threads.
pub fn default_plan_executor(worker_count: usize) -> Box<dyn TaskPlanExecutor> {
    plan_executor_for(worker_count, Arc::new(ThreadExecutorFactory))
}

/// Number of processing units, or 1 if that cannot be determined.
pub fn available_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Pull tasks from the plan until it reports there is nothing left.
pub fn run_worker(plan: &TaskExecutionPlan, listener: &dyn TaskExecutionListener) {
    let mut executed = 0usize;
    while let Some(scheduled) = plan.get_task_to_execute() {
        let outcome = execute_task(&scheduled.task, listener);
        plan.task_complete(scheduled.id, outcome);
        executed += 1;
    }
    debug!(executed, "worker finished: no more tasks");
}

/// Run one task with its listener callbacks. Never panics: a panic in the
/// task or a listener becomes an execution failure.
pub fn execute_task(task: &TaskRef, listener: &dyn TaskExecutionListener) -> TaskOutcome {
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        if let Err(err) = listener.before_execute(task.as_ref()) {
            return TaskOutcome::execution_failed(err);
        }
        let task_failure = task.execute().err();
        let execution_failure = listener
            .after_execute(task.as_ref(), task_failure.as_ref())
            .err();
        TaskOutcome {
            task_failure,
            execution_failure,
        }
    }));

    result.unwrap_or_else(|payload| {
        TaskOutcome::execution_failed(anyhow!(
            "task '{}' panicked: {}",
            task.path(),
            panic_message(payload.as_ref())
        ))
    })
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

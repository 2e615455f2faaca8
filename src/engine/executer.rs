// src/engine/executer.rs

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use crate::config::ConfigFile;
use crate::dag::{handler_for, TaskExecutionPlan, TaskFailureHandler};
use crate::errors::{Result, SchedulerError};
use crate::exec::{
    default_plan_executor, ListenerBroadcast, SequentialPlanExecutor, TaskExecutionListener,
    TaskGraphListener, TaskPlanExecutor,
};
use crate::task::{Task, TaskRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GraphState {
    Empty,
    Populated,
}

/// Caller-facing entry point: collects requested tasks, plans them and
/// executes the plan.
///
/// Configuration (`use_filter`, `use_failure_handler`, listeners) should
/// happen before tasks are added. After [`execute`](Self::execute) the
/// executer is empty again and can be reused for another batch.
pub struct TaskGraphExecuter {
    plan: Arc<TaskExecutionPlan>,
    plan_executor: Box<dyn TaskPlanExecutor>,
    listeners: ListenerBroadcast,
    graph_listeners: Vec<Arc<dyn TaskGraphListener>>,
    state: GraphState,
}

impl std::fmt::Debug for TaskGraphExecuter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskGraphExecuter")
            .field("plan", &self.plan)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl TaskGraphExecuter {
    pub fn new(plan_executor: Box<dyn TaskPlanExecutor>) -> Self {
        Self {
            plan: Arc::new(TaskExecutionPlan::new()),
            plan_executor,
            listeners: ListenerBroadcast::new(),
            graph_listeners: Vec::new(),
            state: GraphState::Empty,
        }
    }

    /// Executer running everything on the calling thread.
    pub fn sequential() -> Self {
        Self::new(Box::new(SequentialPlanExecutor))
    }

    /// Executer wired from a validated config: thread count and failure
    /// policy.
    pub fn from_config(cfg: &ConfigFile) -> Self {
        let workers = cfg.worker_count();
        debug!(workers, failure_mode = ?cfg.failure_mode(), "configuring task graph executer");
        let executer = Self::new(default_plan_executor(workers));
        executer.plan.use_failure_handler(handler_for(cfg.failure_mode()));
        executer
    }

    pub fn use_filter<F>(&mut self, filter: F)
    where
        F: Fn(&dyn Task) -> bool + Send + Sync + 'static,
    {
        self.plan.use_filter(Arc::new(filter));
    }

    pub fn use_failure_handler(&mut self, handler: Arc<dyn TaskFailureHandler>) {
        self.plan.use_failure_handler(handler);
    }

    pub fn add_task_execution_listener(&mut self, listener: Arc<dyn TaskExecutionListener>) {
        self.listeners.add(listener);
    }

    pub fn add_graph_listener(&mut self, listener: Arc<dyn TaskGraphListener>) {
        self.graph_listeners.push(listener);
    }

    /// Run `action` with the final task list right before execution starts.
    pub fn when_ready<F>(&mut self, action: F)
    where
        F: Fn(&[TaskRef]) + Send + Sync + 'static,
    {
        self.graph_listeners.push(Arc::new(action));
    }

    /// Add requested tasks (and everything they need) and extend the plan.
    ///
    /// Fails with [`SchedulerError::CircularDependency`] if the tasks form
    /// a cycle.
    pub fn add_tasks(&mut self, tasks: impl IntoIterator<Item = TaskRef>) -> Result<()> {
        self.plan.add_to_task_graph(tasks);
        self.determine_execution_plan()
    }

    pub fn determine_execution_plan(&mut self) -> Result<()> {
        self.plan.determine_execution_plan()?;
        self.state = GraphState::Populated;
        Ok(())
    }

    /// Execute the plan to completion, then clear it.
    ///
    /// Returns the single recorded failure unwrapped, or
    /// [`SchedulerError::MultipleFailures`] if there were several.
    pub fn execute(&mut self) -> Result<()> {
        let tasks = self.plan.tasks();
        for listener in &self.graph_listeners {
            listener.graph_populated(&tasks);
        }

        info!(tasks = tasks.len(), "executing task graph");
        let started = Instant::now();

        let listener: Arc<dyn TaskExecutionListener> = Arc::new(self.listeners.clone());
        let result = self.plan_executor.process(&self.plan, listener);
        self.clear();

        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            success = result.is_ok(),
            "task graph execution finished"
        );
        result
    }

    /// Whether a task with this path is part of the plan.
    pub fn has_task(&self, path: &str) -> Result<bool> {
        self.ensure_populated("has_task")?;
        Ok(self.plan.contains(path))
    }

    pub fn has_task_ref(&self, task: &dyn Task) -> Result<bool> {
        self.has_task(task.path())
    }

    /// All planned tasks in execution order.
    pub fn get_all_tasks(&self) -> Result<Vec<TaskRef>> {
        self.ensure_populated("get_all_tasks")?;
        Ok(self.plan.tasks())
    }

    /// Shared handle to the underlying plan, e.g. for inspection in tests.
    pub fn plan(&self) -> &Arc<TaskExecutionPlan> {
        &self.plan
    }

    pub fn clear(&mut self) {
        self.plan.clear();
        self.state = GraphState::Empty;
    }

    fn ensure_populated(&self, operation: &'static str) -> Result<()> {
        match self.state {
            GraphState::Populated => Ok(()),
            GraphState::Empty => Err(SchedulerError::GraphNotReady(operation)),
        }
    }
}

// src/dag/plan.rs

//! The execution plan: a thread-safe queue of planned tasks.
//!
//! All mutable state lives behind a single lock paired with a condition
//! variable. Workers block in [`TaskExecutionPlan::get_task_to_execute`]
//! until a task becomes available, and the driving thread blocks in
//! [`TaskExecutionPlan::await_completion`] until every planned task reached
//! a terminal state. Task execution itself happens outside the lock.

use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info, warn};

use crate::dag::builder::{GraphBuilder, GraphRoots};
use crate::dag::failure::{FailFastHandler, FailureAction, TaskFailureHandler};
use crate::dag::graph::DependencyGraph;
use crate::dag::node::{ExecutionState, NodeId, NodeState, Requirement};
use crate::dag::planner::{ExecutionOrder, ExecutionPlanner};
use crate::errors::{FailureKind, Result, SchedulerError, TaskFailure};
use crate::exec::worker::panic_message;
use crate::task::{satisfy_all, Task, TaskFilter, TaskRef};

/// A task handed to a worker. Must be reported back through
/// [`TaskExecutionPlan::task_complete`] exactly once.
#[derive(Debug, Clone)]
pub struct ScheduledTask {
    pub id: NodeId,
    pub task: TaskRef,
}

/// What happened when a worker ran a task.
#[derive(Debug, Default)]
pub struct TaskOutcome {
    /// Error returned by the task's own `execute`.
    pub task_failure: Option<anyhow::Error>,
    /// Error raised around the task (listener failure, panic).
    pub execution_failure: Option<anyhow::Error>,
}

impl TaskOutcome {
    pub fn success() -> Self {
        Self::default()
    }

    pub fn task_failed(error: anyhow::Error) -> Self {
        Self {
            task_failure: Some(error),
            execution_failure: None,
        }
    }

    pub fn execution_failed(error: anyhow::Error) -> Self {
        Self {
            task_failure: None,
            execution_failure: Some(error),
        }
    }
}

enum Selection {
    AllComplete,
    NothingReady,
    Candidate(NodeId),
}

struct PlanState {
    graph: DependencyGraph,
    roots: GraphRoots,
    order: ExecutionOrder,
    failures: Vec<TaskFailure>,
    running_mutexes: HashSet<String>,
    filter: TaskFilter,
    failure_handler: Arc<dyn TaskFailureHandler>,
}

/// Reusable execution plan.
///
/// Graph population ([`add_to_task_graph`](Self::add_to_task_graph),
/// [`determine_execution_plan`](Self::determine_execution_plan)) and
/// [`clear`](Self::clear) are expected to happen while no workers are
/// running.
pub struct TaskExecutionPlan {
    state: Mutex<PlanState>,
    condition: Condvar,
}

impl std::fmt::Debug for TaskExecutionPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("TaskExecutionPlan")
            .field("nodes", &state.graph.len())
            .field("planned", &state.order.len())
            .field("failures", &state.failures.len())
            .finish_non_exhaustive()
    }
}

impl Default for TaskExecutionPlan {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskExecutionPlan {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(PlanState {
                graph: DependencyGraph::new(),
                roots: GraphRoots::default(),
                order: ExecutionOrder::default(),
                failures: Vec::new(),
                running_mutexes: HashSet::new(),
                filter: satisfy_all(),
                failure_handler: Arc::new(FailFastHandler),
            }),
            condition: Condvar::new(),
        }
    }

    pub fn use_filter(&self, filter: TaskFilter) {
        self.state.lock().filter = filter;
    }

    pub fn use_failure_handler(&self, handler: Arc<dyn TaskFailureHandler>) {
        self.state.lock().failure_handler = handler;
    }

    /// Add requested tasks and everything they reach to the graph.
    pub fn add_to_task_graph(&self, tasks: impl IntoIterator<Item = TaskRef>) {
        let mut state = self.state.lock();
        let st = &mut *state;
        GraphBuilder::new(&mut st.graph, &mut st.roots, &st.filter).add_tasks(tasks);
    }

    /// Compute (or extend) the execution order. Fails on cycles.
    pub fn determine_execution_plan(&self) -> Result<()> {
        let mut state = self.state.lock();
        let st = &mut *state;
        ExecutionPlanner::new(&mut st.graph, &st.roots, &mut st.order).determine()
    }

    /// Planned tasks in execution order.
    pub fn tasks(&self) -> Vec<TaskRef> {
        let state = self.state.lock();
        state
            .order
            .iter()
            .map(|id| state.graph.node(id).task().clone())
            .collect()
    }

    /// Whether a task with this path is part of the plan.
    pub fn contains(&self, path: &str) -> bool {
        let state = self.state.lock();
        state
            .graph
            .get(path)
            .is_some_and(|id| state.order.contains(id))
    }

    pub fn len(&self) -> usize {
        self.state.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().order.is_empty()
    }

    /// Snapshot of a task's scheduling state, if it is in the graph.
    pub fn node_state(&self, path: &str) -> Option<NodeState> {
        let state = self.state.lock();
        let id = state.graph.get(path)?;
        Some(state.graph.node(id).snapshot())
    }

    /// Block until a task can be executed, or return `None` once every
    /// planned task is complete.
    pub fn get_task_to_execute(&self) -> Option<ScheduledTask> {
        let mut state = self.state.lock();

        loop {
            match state.select_next() {
                Selection::AllComplete => return None,
                Selection::NothingReady => self.condition.wait(&mut state),
                Selection::Candidate(id) => {
                    if state.all_dependencies_successful(id) {
                        return Some(state.start(id));
                    }
                    let node = state.graph.node_mut(id);
                    node.skip_execution();
                    info!(task = %node.path(), "skipping task: a dependency did not succeed");
                    self.condition.notify_all();
                }
            }
        }
    }

    /// Report the outcome of a task previously returned by
    /// [`get_task_to_execute`](Self::get_task_to_execute).
    pub fn task_complete(&self, id: NodeId, outcome: TaskOutcome) {
        let mut state = self.state.lock();
        let st = &mut *state;

        {
            let node = st.graph.node_mut(id);
            if let Some(failure) = outcome.task_failure {
                node.set_task_failure(failure);
            }
            if let Some(failure) = outcome.execution_failure {
                node.set_execution_failure(failure);
            }
        }

        st.enforce_finalizer_tasks(id);
        if st.graph.node(id).is_failed() {
            st.handle_failure(id);
        }

        let node = st.graph.node_mut(id);
        node.finish_execution();
        debug!(task = %node.path(), failed = node.is_failed(), "task complete");
        if let Some(key) = node.task().mutex_key() {
            st.running_mutexes.remove(key);
        }

        self.condition.notify_all();
    }

    /// Block until every planned task is complete, then surface failures:
    /// one failure is returned as-is, several are aggregated.
    pub fn await_completion(&self) -> Result<()> {
        let mut state = self.state.lock();
        while !state.all_tasks_complete() {
            self.condition.wait(&mut state);
        }

        match state.failures.as_slice() {
            [] => Ok(()),
            [single] => Err(SchedulerError::TaskFailed(single.clone())),
            many => Err(SchedulerError::MultipleFailures(many.to_vec())),
        }
    }

    /// Forget everything about the current graph and plan. The filter and
    /// failure handler are kept.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.graph.clear();
        state.roots.clear();
        state.order.clear();
        state.failures.clear();
        state.running_mutexes.clear();
    }
}

impl PlanState {
    fn select_next(&self) -> Selection {
        let mut all_complete = true;
        for id in self.order.iter() {
            let node = self.graph.node(id);
            all_complete = all_complete && node.is_complete();
            if node.is_ready() && self.all_dependencies_complete(id) && self.mutex_available(id) {
                return Selection::Candidate(id);
            }
        }
        if all_complete {
            Selection::AllComplete
        } else {
            Selection::NothingReady
        }
    }

    fn all_dependencies_complete(&self, id: NodeId) -> bool {
        self.graph
            .node(id)
            .hard_successors()
            .iter()
            .all(|dep| self.graph.node(*dep).is_complete())
    }

    fn all_dependencies_successful(&self, id: NodeId) -> bool {
        self.graph
            .node(id)
            .hard_successors()
            .iter()
            .all(|dep| self.graph.node(*dep).is_successful())
    }

    fn mutex_available(&self, id: NodeId) -> bool {
        match self.graph.node(id).task().mutex_key() {
            Some(key) => !self.running_mutexes.contains(key),
            None => true,
        }
    }

    fn start(&mut self, id: NodeId) -> ScheduledTask {
        let node = self.graph.node_mut(id);
        node.start_execution();
        let task = node.task().clone();
        if let Some(key) = task.mutex_key() {
            self.running_mutexes.insert(key.to_string());
        }
        info!(task = %task.path(), "starting task");
        ScheduledTask { id, task }
    }

    fn all_tasks_complete(&self) -> bool {
        self.order.iter().all(|id| self.graph.node(id).is_complete())
    }

    /// Make sure every finalizer of a node that just ran will run too.
    fn enforce_finalizer_tasks(&mut self, id: NodeId) {
        let finalizers = self.graph.node(id).finalizers().to_vec();
        for finalizer in finalizers {
            let node = self.graph.node(finalizer);
            if node.is_required() || node.is_must_not_run() {
                debug!(
                    task = %self.graph.path_of(id),
                    finalizer = %node.path(),
                    "enforcing finalizer"
                );
                self.enforce_with_dependencies(finalizer);
            }
        }
    }

    /// Enforce `root` and its hard-dependency closure, dependencies first.
    fn enforce_with_dependencies(&mut self, root: NodeId) {
        let mut stack: Vec<(NodeId, bool)> = vec![(root, false)];
        let mut visited: HashSet<NodeId> = HashSet::new();

        while let Some((id, expanded)) = stack.pop() {
            if expanded {
                let node = self.graph.node_mut(id);
                if node.is_must_not_run() || node.is_required() {
                    node.enforce_run();
                }
                continue;
            }
            if !visited.insert(id) {
                continue;
            }
            stack.push((id, true));
            for dep in self.graph.node(id).hard_successors().iter().rev() {
                stack.push((*dep, false));
            }
        }
    }

    fn handle_failure(&mut self, id: NodeId) {
        let node = self.graph.node(id);
        let task = node.task().clone();

        if let Some(failure) = node.execution_failure().cloned() {
            // Execution failures always abort: the plan can no longer be trusted.
            warn!(task = %task.path(), error = %failure, "task execution failed; aborting");
            self.abort_execution();
            self.failures
                .push(TaskFailure::new(task.path(), FailureKind::Execution, failure));
            return;
        }

        if let Some(failure) = node.task_failure().cloned() {
            let action = self.failure_action(task.as_ref(), &failure);
            warn!(task = %task.path(), error = %failure, ?action, "task failed");
            if action == FailureAction::Abort {
                self.abort_execution();
            }
            self.failures
                .push(TaskFailure::new(task.path(), FailureKind::Task, failure));
        }
    }

    /// Ask the failure handler what to do. A handler that panics aborts.
    fn failure_action(&self, task: &dyn Task, failure: &anyhow::Error) -> FailureAction {
        let handler = &self.failure_handler;
        panic::catch_unwind(AssertUnwindSafe(|| handler.on_task_failure(task, failure)))
            .unwrap_or_else(|payload| {
                error!(
                    task = %task.path(),
                    panic = %panic_message(payload.as_ref()),
                    "failure handler panicked; aborting"
                );
                FailureAction::Abort
            })
    }

    /// Skip every required task that has not started. Executing tasks and
    /// enforced finalizer chains are left to finish.
    fn abort_execution(&mut self) {
        for &id in self.order.as_slice() {
            let node = self.graph.node_mut(id);
            if node.state() == ExecutionState::Ready && node.requirement() == Requirement::Required {
                node.skip_execution();
                debug!(task = %node.path(), "skipping task: execution aborted");
            }
        }
    }
}

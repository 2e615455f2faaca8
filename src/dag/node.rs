// src/dag/node.rs

//! Per-task scheduling state.

use std::fmt;
use std::sync::Arc;

use crate::task::TaskRef;

/// Index of a node in the [`DependencyGraph`](crate::dag::DependencyGraph)
/// arena. Stable for the lifetime of one graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Execution state of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    /// Not started yet.
    Ready,
    /// Handed to a worker.
    Executing,
    /// Ran to completion (successfully or not).
    Executed,
    /// Will never run: a dependency failed or execution was aborted.
    Skipped,
}

/// Whether (and how strongly) a node is meant to run.
///
/// Transitions only move "up": once a node is required it never goes back
/// to `MustNotRun`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    /// Seen in the graph but not yet classified.
    Unknown,
    /// Rejected by the inclusion filter.
    NotRequired,
    /// Part of a requested task's dependency closure.
    Required,
    /// Only reachable through a finalizer whose finalized task has not run.
    MustNotRun,
    /// Finalizer chain enforced after its finalized task ran; exempt from
    /// abort.
    Enforced,
}

/// Read-only view of a node's state, for tests and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeState {
    pub state: ExecutionState,
    pub requirement: Requirement,
}

/// Scheduling state for exactly one task.
#[derive(Debug)]
pub struct TaskNode {
    task: TaskRef,
    state: ExecutionState,
    requirement: Requirement,
    dependencies_processed: bool,
    /// Cached result of the inclusion filter.
    accepted: Option<bool>,
    /// Dependencies: must complete successfully before this node starts.
    pub(crate) hard_successors: Vec<NodeId>,
    /// Ordering-only predecessors.
    pub(crate) soft_successors: Vec<NodeId>,
    /// Preferred predecessors; dropped by the planner when they would close
    /// a cycle.
    pub(crate) should_successors: Vec<NodeId>,
    pub(crate) finalizers: Vec<NodeId>,
    execution_failure: Option<Arc<anyhow::Error>>,
    task_failure: Option<Arc<anyhow::Error>>,
}

impl TaskNode {
    pub fn new(task: TaskRef) -> Self {
        Self {
            task,
            state: ExecutionState::Ready,
            requirement: Requirement::Unknown,
            dependencies_processed: false,
            accepted: None,
            hard_successors: Vec::new(),
            soft_successors: Vec::new(),
            should_successors: Vec::new(),
            finalizers: Vec::new(),
            execution_failure: None,
            task_failure: None,
        }
    }

    pub fn task(&self) -> &TaskRef {
        &self.task
    }

    pub fn path(&self) -> &str {
        self.task.path()
    }

    pub fn state(&self) -> ExecutionState {
        self.state
    }

    pub fn requirement(&self) -> Requirement {
        self.requirement
    }

    pub fn snapshot(&self) -> NodeState {
        NodeState {
            state: self.state,
            requirement: self.requirement,
        }
    }

    pub fn hard_successors(&self) -> &[NodeId] {
        &self.hard_successors
    }

    pub fn soft_successors(&self) -> &[NodeId] {
        &self.soft_successors
    }

    pub fn should_successors(&self) -> &[NodeId] {
        &self.should_successors
    }

    pub fn finalizers(&self) -> &[NodeId] {
        &self.finalizers
    }

    pub fn is_required(&self) -> bool {
        matches!(self.requirement, Requirement::Required | Requirement::Enforced)
    }

    pub fn is_must_not_run(&self) -> bool {
        self.requirement == Requirement::MustNotRun
    }

    /// Whether the planner should place this node in the execution plan.
    ///
    /// `MustNotRun` nodes are planned so they can still be enforced later.
    pub fn is_included_in_plan(&self) -> bool {
        matches!(
            self.requirement,
            Requirement::Required | Requirement::MustNotRun | Requirement::Enforced
        )
    }

    pub fn is_ready(&self) -> bool {
        self.state == ExecutionState::Ready && self.is_required()
    }

    pub fn is_complete(&self) -> bool {
        match self.state {
            ExecutionState::Executed | ExecutionState::Skipped => true,
            ExecutionState::Executing => false,
            ExecutionState::Ready => !self.is_required(),
        }
    }

    pub fn is_successful(&self) -> bool {
        match self.state {
            ExecutionState::Executed => !self.is_failed(),
            ExecutionState::Skipped | ExecutionState::Executing => false,
            ExecutionState::Ready => !self.is_required(),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.task_failure.is_some() || self.execution_failure.is_some()
    }

    pub fn execution_failure(&self) -> Option<&Arc<anyhow::Error>> {
        self.execution_failure.as_ref()
    }

    pub fn task_failure(&self) -> Option<&Arc<anyhow::Error>> {
        self.task_failure.as_ref()
    }

    pub(crate) fn dependencies_processed(&self) -> bool {
        self.dependencies_processed
    }

    pub(crate) fn mark_dependencies_processed(&mut self) {
        self.dependencies_processed = true;
    }

    pub(crate) fn accepted(&self) -> Option<bool> {
        self.accepted
    }

    pub(crate) fn set_accepted(&mut self, accepted: bool) {
        self.accepted = Some(accepted);
    }

    /// Mark as part of the required closure. Upgrades `MustNotRun`; leaves
    /// `Enforced` and `NotRequired` untouched.
    pub(crate) fn require(&mut self) {
        if matches!(self.requirement, Requirement::Unknown | Requirement::MustNotRun) {
            self.requirement = Requirement::Required;
        }
    }

    pub(crate) fn do_not_require(&mut self) {
        if self.requirement == Requirement::Unknown {
            self.requirement = Requirement::NotRequired;
        }
    }

    /// Only applies to unclassified nodes, so requiredness never reverts.
    pub(crate) fn must_not_run(&mut self) {
        if self.requirement == Requirement::Unknown {
            self.requirement = Requirement::MustNotRun;
        }
    }

    pub(crate) fn enforce_run(&mut self) {
        if self.state == ExecutionState::Ready
            && matches!(self.requirement, Requirement::Required | Requirement::MustNotRun)
        {
            self.requirement = Requirement::Enforced;
        }
    }

    pub(crate) fn start_execution(&mut self) {
        debug_assert!(self.is_ready(), "starting a node that is not ready");
        self.state = ExecutionState::Executing;
    }

    pub(crate) fn finish_execution(&mut self) {
        debug_assert_eq!(self.state, ExecutionState::Executing);
        self.state = ExecutionState::Executed;
    }

    /// Skip a node that has not started. Executing and finished nodes are
    /// left alone.
    pub(crate) fn skip_execution(&mut self) {
        if self.state == ExecutionState::Ready {
            self.state = ExecutionState::Skipped;
        }
    }

    pub(crate) fn set_execution_failure(&mut self, failure: anyhow::Error) {
        self.execution_failure = Some(Arc::new(failure));
    }

    pub(crate) fn set_task_failure(&mut self, failure: anyhow::Error) {
        self.task_failure = Some(Arc::new(failure));
    }
}

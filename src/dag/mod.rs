// src/dag/mod.rs

//! Task graph representation, planning and scheduling.
//!
//! - [`node`] holds the per-task scheduling state.
//! - [`graph`] is the arena of nodes keyed by task path.
//! - [`builder`] expands requested tasks into the graph.
//! - [`planner`] computes the execution order and detects cycles.
//! - [`plan`] is the thread-safe queue workers pull tasks from.
//! - [`failure`] holds the failure policies.

pub mod builder;
pub mod failure;
pub mod graph;
pub mod node;
pub mod plan;
pub mod planner;

pub use builder::{GraphBuilder, GraphRoots};
pub use failure::{
    handler_for, ContinueOnFailureHandler, FailFastHandler, FailureAction, TaskFailureHandler,
};
pub use graph::DependencyGraph;
pub use node::{ExecutionState, NodeId, NodeState, Requirement, TaskNode};
pub use plan::{ScheduledTask, TaskExecutionPlan, TaskOutcome};
pub use planner::{ExecutionOrder, ExecutionPlanner};

// src/engine/mod.rs

//! Orchestration entry point.
//!
//! [`TaskGraphExecuter`] ties together:
//! - the task graph and execution plan (`dag`)
//! - the plan executors and listeners (`exec`)
//! - configuration (`config`)

pub mod executer;

pub use executer::TaskGraphExecuter;

// src/exec/mod.rs

//! Task execution layer.
//!
//! - [`worker`] holds the worker loop and the sequential / parallel plan
//!   executors built on it.
//! - [`backend`] provides the `ExecutorFactory` trait used to start worker
//!   threads, and the `ThreadExecutorFactory` used in production.
//! - [`listener`] defines the callbacks invoked around each task.

pub mod backend;
pub mod listener;
pub mod worker;

pub use backend::{ExecutorFactory, ThreadExecutorFactory, WorkerHandle, WorkerJob};
pub use listener::{
    ListenerBroadcast, SerializedListener, TaskExecutionListener, TaskGraphListener,
};
pub use worker::{
    available_workers, default_plan_executor, execute_task, plan_executor_for, run_worker,
    ParallelPlanExecutor, SequentialPlanExecutor, TaskPlanExecutor,
};

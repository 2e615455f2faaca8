// src/exec/listener.rs

//! Callbacks invoked around task execution and when the graph is ready.

use std::sync::Arc;

use anyhow::Result;
use parking_lot::Mutex;

use crate::task::{Task, TaskRef};

/// Notified before and after each task runs.
///
/// An `Err` from either callback is treated as an execution failure of
/// the task, which aborts the whole plan.
pub trait TaskExecutionListener: Send + Sync {
    fn before_execute(&self, _task: &dyn Task) -> Result<()> {
        Ok(())
    }

    /// `failure` is the task's own failure, if it reported one.
    fn after_execute(&self, _task: &dyn Task, _failure: Option<&anyhow::Error>) -> Result<()> {
        Ok(())
    }
}

/// Notified once the execution plan is final, right before execution.
pub trait TaskGraphListener: Send + Sync {
    fn graph_populated(&self, tasks: &[TaskRef]);
}

impl<F> TaskGraphListener for F
where
    F: Fn(&[TaskRef]) + Send + Sync,
{
    fn graph_populated(&self, tasks: &[TaskRef]) {
        self(tasks)
    }
}

/// Fans each callback out to every registered listener, in registration
/// order, stopping at the first error.
#[derive(Default, Clone)]
pub struct ListenerBroadcast {
    listeners: Vec<Arc<dyn TaskExecutionListener>>,
}

impl ListenerBroadcast {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, listener: Arc<dyn TaskExecutionListener>) {
        self.listeners.push(listener);
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl TaskExecutionListener for ListenerBroadcast {
    fn before_execute(&self, task: &dyn Task) -> Result<()> {
        for listener in &self.listeners {
            listener.before_execute(task)?;
        }
        Ok(())
    }

    fn after_execute(&self, task: &dyn Task, failure: Option<&anyhow::Error>) -> Result<()> {
        for listener in &self.listeners {
            listener.after_execute(task, failure)?;
        }
        Ok(())
    }
}

/// Serializes callbacks across worker threads so listeners observe one
/// notification at a time.
pub struct SerializedListener {
    inner: Arc<dyn TaskExecutionListener>,
    lock: Mutex<()>,
}

impl SerializedListener {
    pub fn new(inner: Arc<dyn TaskExecutionListener>) -> Self {
        Self {
            inner,
            lock: Mutex::new(()),
        }
    }
}

impl TaskExecutionListener for SerializedListener {
    fn before_execute(&self, task: &dyn Task) -> Result<()> {
        let _guard = self.lock.lock();
        self.inner.before_execute(task)
    }

    fn after_execute(&self, task: &dyn Task, failure: Option<&anyhow::Error>) -> Result<()> {
        let _guard = self.lock.lock();
        self.inner.after_execute(task, failure)
    }
}

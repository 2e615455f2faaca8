// src/exec/backend.rs

//! Pluggable worker-thread factory.
//!
//! The parallel plan executor never calls `std::thread` directly; it asks
//! an [`ExecutorFactory`] for workers. Production code uses
//! [`ThreadExecutorFactory`]; tests can provide their own implementation,
//! for example one that counts spawns or runs jobs inline.

use std::thread::{self, JoinHandle};

use tracing::debug;

use crate::errors::{Result, SchedulerError};

/// Work handed to a worker: runs until the plan has nothing left.
pub type WorkerJob = Box<dyn FnOnce() + Send + 'static>;

/// Creates named workers running a [`WorkerJob`].
pub trait ExecutorFactory: Send + Sync {
    fn spawn(&self, name: String, job: WorkerJob) -> Result<WorkerHandle>;
}

/// Handle to a spawned worker. Joining it waits for the worker to stop.
#[derive(Debug)]
pub struct WorkerHandle {
    name: String,
    handle: JoinHandle<()>,
}

impl WorkerHandle {
    pub fn new(name: String, handle: JoinHandle<()>) -> Self {
        Self { name, handle }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn join(self) -> Result<()> {
        self.handle
            .join()
            .map_err(|_| SchedulerError::WorkerPanicked(self.name))
    }
}

/// Spawns one OS thread per worker.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadExecutorFactory;

impl ExecutorFactory for ThreadExecutorFactory {
    fn spawn(&self, name: String, job: WorkerJob) -> Result<WorkerHandle> {
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(job)
            .map_err(|source| SchedulerError::WorkerSpawn {
                name: name.clone(),
                source,
            })?;
        debug!(worker = %name, "worker thread started");
        Ok(WorkerHandle::new(name, handle))
    }
}

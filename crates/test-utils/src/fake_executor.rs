use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use taskgraph::errors::{Result, SchedulerError};
use taskgraph::exec::{ExecutorFactory, ThreadExecutorFactory, WorkerHandle, WorkerJob};

/// A factory that:
/// - records how many workers were requested
/// - delegates to real threads.
#[derive(Debug, Default)]
pub struct CountingExecutorFactory {
    spawned: AtomicUsize,
    inner: ThreadExecutorFactory,
}

impl CountingExecutorFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn spawned(&self) -> usize {
        self.spawned.load(Ordering::SeqCst)
    }
}

impl ExecutorFactory for CountingExecutorFactory {
    fn spawn(&self, name: String, job: WorkerJob) -> Result<WorkerHandle> {
        self.spawned.fetch_add(1, Ordering::SeqCst);
        self.inner.spawn(name, job)
    }
}

/// A factory that can never start a worker, as if the OS refused threads.
#[derive(Debug, Default)]
pub struct FailingExecutorFactory {
    attempts: AtomicUsize,
}

impl FailingExecutorFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl ExecutorFactory for FailingExecutorFactory {
    fn spawn(&self, name: String, _job: WorkerJob) -> Result<WorkerHandle> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(SchedulerError::WorkerSpawn {
            name,
            source: std::io::Error::other("thread limit reached"),
        })
    }
}

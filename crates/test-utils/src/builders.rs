#![allow(dead_code)]

use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::anyhow;
use parking_lot::Mutex;
use taskgraph::task::{Task, TaskRef};

/// One finished task run, as seen by the task itself.
#[derive(Debug, Clone)]
pub struct ExecutionRecord {
    pub path: String,
    pub started: Instant,
    pub finished: Instant,
    pub thread: Option<String>,
}

impl ExecutionRecord {
    /// Whether the two runs were in progress at the same time.
    pub fn overlaps(&self, other: &ExecutionRecord) -> bool {
        self.started < other.finished && other.started < self.finished
    }
}

/// Shared log every [`TestTask`] writes into when it runs.
#[derive(Debug, Clone, Default)]
pub struct ExecutionLog {
    records: Arc<Mutex<Vec<ExecutionRecord>>>,
}

impl ExecutionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<ExecutionRecord> {
        self.records.lock().clone()
    }

    /// Paths of executed tasks, in the order they finished.
    pub fn executed(&self) -> Vec<String> {
        self.records.lock().iter().map(|r| r.path.clone()).collect()
    }

    pub fn was_executed(&self, path: &str) -> bool {
        self.records.lock().iter().any(|r| r.path == path)
    }

    pub fn count(&self, path: &str) -> usize {
        self.records.lock().iter().filter(|r| r.path == path).count()
    }

    pub fn record(&self, path: &str) -> Option<ExecutionRecord> {
        self.records.lock().iter().find(|r| r.path == path).cloned()
    }

    pub fn clear(&self) {
        self.records.lock().clear();
    }

    fn push(&self, record: ExecutionRecord) {
        self.records.lock().push(record);
    }
}

#[derive(Debug, Clone)]
enum Behaviour {
    Succeed,
    Fail(String),
    Panic(String),
}

/// Configurable task used throughout the tests.
///
/// Relations are held behind a lock so that cycles can be wired after the
/// tasks exist.
pub struct TestTask {
    path: String,
    dependencies: Mutex<Vec<TaskRef>>,
    finalized_by: Mutex<Vec<TaskRef>>,
    must_run_after: Mutex<Vec<TaskRef>>,
    should_run_after: Mutex<Vec<TaskRef>>,
    mutex_key: Option<String>,
    behaviour: Behaviour,
    duration: Duration,
    log: ExecutionLog,
}

impl fmt::Debug for TestTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Relations may be cyclic; only print the path.
        f.debug_struct("TestTask").field("path", &self.path).finish()
    }
}

impl TestTask {
    pub fn task_ref(self: &Arc<Self>) -> TaskRef {
        Arc::clone(self) as TaskRef
    }

    pub fn add_dependency(&self, dep: &Arc<TestTask>) {
        self.dependencies.lock().push(dep.task_ref());
    }

    pub fn add_finalizer(&self, finalizer: &Arc<TestTask>) {
        self.finalized_by.lock().push(finalizer.task_ref());
    }

    pub fn add_must_run_after(&self, other: &Arc<TestTask>) {
        self.must_run_after.lock().push(other.task_ref());
    }

    pub fn add_should_run_after(&self, other: &Arc<TestTask>) {
        self.should_run_after.lock().push(other.task_ref());
    }
}

impl Task for TestTask {
    fn path(&self) -> &str {
        &self.path
    }

    fn dependencies(&self) -> Vec<TaskRef> {
        self.dependencies.lock().clone()
    }

    fn finalized_by(&self) -> Vec<TaskRef> {
        self.finalized_by.lock().clone()
    }

    fn must_run_after(&self) -> Vec<TaskRef> {
        self.must_run_after.lock().clone()
    }

    fn should_run_after(&self) -> Vec<TaskRef> {
        self.should_run_after.lock().clone()
    }

    fn mutex_key(&self) -> Option<&str> {
        self.mutex_key.as_deref()
    }

    fn execute(&self) -> anyhow::Result<()> {
        let started = Instant::now();
        if !self.duration.is_zero() {
            thread::sleep(self.duration);
        }
        let finished = Instant::now();
        self.log.push(ExecutionRecord {
            path: self.path.clone(),
            started,
            finished,
            thread: thread::current().name().map(str::to_string),
        });

        match &self.behaviour {
            Behaviour::Succeed => Ok(()),
            Behaviour::Fail(message) => Err(anyhow!("{message}")),
            Behaviour::Panic(message) => panic!("{message}"),
        }
    }
}

/// Builder for [`TestTask`] to simplify test setup.
pub struct TaskBuilder {
    path: String,
    dependencies: Vec<TaskRef>,
    finalized_by: Vec<TaskRef>,
    must_run_after: Vec<TaskRef>,
    should_run_after: Vec<TaskRef>,
    mutex_key: Option<String>,
    behaviour: Behaviour,
    duration: Duration,
    log: ExecutionLog,
}

impl TaskBuilder {
    pub fn new(path: &str, log: &ExecutionLog) -> Self {
        Self {
            path: path.to_string(),
            dependencies: Vec::new(),
            finalized_by: Vec::new(),
            must_run_after: Vec::new(),
            should_run_after: Vec::new(),
            mutex_key: None,
            behaviour: Behaviour::Succeed,
            duration: Duration::ZERO,
            log: log.clone(),
        }
    }

    pub fn depends_on(mut self, deps: &[&Arc<TestTask>]) -> Self {
        self.dependencies.extend(deps.iter().map(|d| d.task_ref()));
        self
    }

    pub fn finalized_by(mut self, finalizers: &[&Arc<TestTask>]) -> Self {
        self.finalized_by.extend(finalizers.iter().map(|f| f.task_ref()));
        self
    }

    pub fn must_run_after(mut self, others: &[&Arc<TestTask>]) -> Self {
        self.must_run_after.extend(others.iter().map(|o| o.task_ref()));
        self
    }

    pub fn should_run_after(mut self, others: &[&Arc<TestTask>]) -> Self {
        self.should_run_after.extend(others.iter().map(|o| o.task_ref()));
        self
    }

    pub fn mutex(mut self, key: &str) -> Self {
        self.mutex_key = Some(key.to_string());
        self
    }

    pub fn failing(mut self, message: &str) -> Self {
        self.behaviour = Behaviour::Fail(message.to_string());
        self
    }

    pub fn panicking(mut self, message: &str) -> Self {
        self.behaviour = Behaviour::Panic(message.to_string());
        self
    }

    pub fn sleeping(mut self, millis: u64) -> Self {
        self.duration = Duration::from_millis(millis);
        self
    }

    pub fn build(self) -> Arc<TestTask> {
        Arc::new(TestTask {
            path: self.path,
            dependencies: Mutex::new(self.dependencies),
            finalized_by: Mutex::new(self.finalized_by),
            must_run_after: Mutex::new(self.must_run_after),
            should_run_after: Mutex::new(self.should_run_after),
            mutex_key: self.mutex_key,
            behaviour: self.behaviour,
            duration: self.duration,
            log: self.log,
        })
    }
}

/// Shorthand for a plain task with the given dependencies.
pub fn task(path: &str, log: &ExecutionLog, deps: &[&Arc<TestTask>]) -> Arc<TestTask> {
    TaskBuilder::new(path, log).depends_on(deps).build()
}

/// Convert test tasks into the handles the executer accepts.
pub fn refs(tasks: &[&Arc<TestTask>]) -> Vec<TaskRef> {
    tasks.iter().map(|t| t.task_ref()).collect()
}

/// Paths of a task list, e.g. from `get_all_tasks`.
pub fn paths(tasks: &[TaskRef]) -> Vec<String> {
    tasks.iter().map(|t| t.path().to_string()).collect()
}

#![allow(dead_code)]

use std::collections::HashSet;

use anyhow::anyhow;
use parking_lot::Mutex;
use taskgraph::exec::TaskExecutionListener;
use taskgraph::task::Task;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerEvent {
    Before(String),
    After { path: String, failed: bool },
}

/// Listener that records every callback and can be told to fail or panic
/// for specific tasks.
#[derive(Debug, Default)]
pub struct RecordingListener {
    events: Mutex<Vec<ListenerEvent>>,
    fail_before: HashSet<String>,
    fail_after: HashSet<String>,
    panic_before: HashSet<String>,
    active: Mutex<usize>,
    max_active: Mutex<usize>,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_before(mut self, path: &str) -> Self {
        self.fail_before.insert(path.to_string());
        self
    }

    pub fn failing_after(mut self, path: &str) -> Self {
        self.fail_after.insert(path.to_string());
        self
    }

    pub fn panicking_before(mut self, path: &str) -> Self {
        self.panic_before.insert(path.to_string());
        self
    }

    pub fn events(&self) -> Vec<ListenerEvent> {
        self.events.lock().clone()
    }

    /// Highest number of callbacks observed in flight at once.
    pub fn max_concurrent_callbacks(&self) -> usize {
        *self.max_active.lock()
    }

    fn enter(&self) {
        let mut active = self.active.lock();
        *active += 1;
        let mut max = self.max_active.lock();
        *max = (*max).max(*active);
    }

    fn exit(&self) {
        *self.active.lock() -= 1;
    }
}

impl TaskExecutionListener for RecordingListener {
    fn before_execute(&self, task: &dyn Task) -> anyhow::Result<()> {
        self.enter();
        // Widen the window in which overlapping callbacks would be seen.
        std::thread::sleep(std::time::Duration::from_millis(1));
        self.events
            .lock()
            .push(ListenerEvent::Before(task.path().to_string()));
        self.exit();

        if self.panic_before.contains(task.path()) {
            panic!("listener panicked before {}", task.path());
        }
        if self.fail_before.contains(task.path()) {
            return Err(anyhow!("listener rejected {}", task.path()));
        }
        Ok(())
    }

    fn after_execute(&self, task: &dyn Task, failure: Option<&anyhow::Error>) -> anyhow::Result<()> {
        self.enter();
        self.events.lock().push(ListenerEvent::After {
            path: task.path().to_string(),
            failed: failure.is_some(),
        });
        self.exit();

        if self.fail_after.contains(task.path()) {
            return Err(anyhow!("listener failed after {}", task.path()));
        }
        Ok(())
    }
}

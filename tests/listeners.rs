// tests/listeners.rs

use std::sync::Arc;

use parking_lot::Mutex;
use taskgraph::dag::ContinueOnFailureHandler;
use taskgraph::exec::{TaskExecutionListener, TaskGraphListener};
use taskgraph::task::{Task, TaskRef};
use taskgraph::TaskGraphExecuter;
use taskgraph_test_utils::builders::{paths, refs, task, ExecutionLog, TaskBuilder};
use taskgraph_test_utils::init_tracing;
use taskgraph_test_utils::recording::{ListenerEvent, RecordingListener};

fn before(path: &str) -> ListenerEvent {
    ListenerEvent::Before(path.to_string())
}

fn after(path: &str, failed: bool) -> ListenerEvent {
    ListenerEvent::After {
        path: path.to_string(),
        failed,
    }
}

#[test]
fn test_listener_sees_every_task_in_order() {
    init_tracing();
    let log = ExecutionLog::new();
    let a = task(":a", &log, &[]);
    let b = TaskBuilder::new(":b", &log).depends_on(&[&a]).failing("nope").build();

    let listener = Arc::new(RecordingListener::new());
    let mut exec = TaskGraphExecuter::sequential();
    exec.add_task_execution_listener(listener.clone());
    exec.add_tasks(refs(&[&b])).unwrap();
    assert!(exec.execute().is_err());

    assert_eq!(
        listener.events(),
        vec![before(":a"), after(":a", false), before(":b"), after(":b", true)]
    );
}

#[test]
fn test_skipped_tasks_are_not_reported_to_listeners() {
    init_tracing();
    let log = ExecutionLog::new();
    let a = TaskBuilder::new(":a", &log).failing("nope").build();
    let b = task(":b", &log, &[&a]);
    let c = task(":c", &log, &[]);

    let listener = Arc::new(RecordingListener::new());
    let mut exec = TaskGraphExecuter::sequential();
    exec.use_failure_handler(Arc::new(ContinueOnFailureHandler));
    exec.add_task_execution_listener(listener.clone());
    exec.add_tasks(refs(&[&b, &c])).unwrap();
    assert!(exec.execute().is_err());

    assert_eq!(
        listener.events(),
        vec![before(":a"), after(":a", true), before(":c"), after(":c", false)]
    );
}

/// Appends `name:callback:path` to a shared journal.
struct Journal {
    name: &'static str,
    entries: Arc<Mutex<Vec<String>>>,
}

impl TaskExecutionListener for Journal {
    fn before_execute(&self, task: &dyn Task) -> anyhow::Result<()> {
        self.entries
            .lock()
            .push(format!("{}:before:{}", self.name, task.path()));
        Ok(())
    }

    fn after_execute(&self, task: &dyn Task, _failure: Option<&anyhow::Error>) -> anyhow::Result<()> {
        self.entries
            .lock()
            .push(format!("{}:after:{}", self.name, task.path()));
        Ok(())
    }
}

#[test]
fn test_listeners_are_notified_in_registration_order() {
    init_tracing();
    let log = ExecutionLog::new();
    let a = task(":a", &log, &[]);

    let entries = Arc::new(Mutex::new(Vec::new()));
    let mut exec = TaskGraphExecuter::sequential();
    for name in ["first", "second"] {
        exec.add_task_execution_listener(Arc::new(Journal {
            name,
            entries: Arc::clone(&entries),
        }));
    }
    exec.add_tasks(refs(&[&a])).unwrap();
    exec.execute().unwrap();

    assert_eq!(
        *entries.lock(),
        vec![
            "first:before::a",
            "second:before::a",
            "first:after::a",
            "second:after::a",
        ]
    );
}

struct PlanSnapshot {
    seen: Mutex<Vec<Vec<String>>>,
}

impl TaskGraphListener for PlanSnapshot {
    fn graph_populated(&self, tasks: &[TaskRef]) {
        self.seen.lock().push(paths(tasks));
    }
}

#[test]
fn test_graph_listener_fires_once_per_execute() {
    init_tracing();
    let log = ExecutionLog::new();
    let a = task(":a", &log, &[]);
    let b = task(":b", &log, &[]);

    let snapshot = Arc::new(PlanSnapshot {
        seen: Mutex::new(Vec::new()),
    });
    let mut exec = TaskGraphExecuter::sequential();
    exec.add_graph_listener(snapshot.clone());

    exec.add_tasks(refs(&[&b])).unwrap();
    exec.execute().unwrap();
    exec.add_tasks(refs(&[&a, &b])).unwrap();
    exec.execute().unwrap();

    assert_eq!(
        *snapshot.seen.lock(),
        vec![vec![":b".to_string()], vec![":a".to_string(), ":b".to_string()]]
    );
}

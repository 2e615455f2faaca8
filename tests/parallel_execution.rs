// tests/parallel_execution.rs

use std::collections::HashSet;
use std::sync::Arc;

use taskgraph::config::{parse_str, ConfigFile};
use taskgraph::exec::{ExecutorFactory, ParallelPlanExecutor};
use taskgraph::TaskGraphExecuter;
use taskgraph_test_utils::builders::{refs, task, ExecutionLog, TaskBuilder, TestTask};
use taskgraph_test_utils::fake_executor::{CountingExecutorFactory, FailingExecutorFactory};
use taskgraph_test_utils::recording::RecordingListener;
use taskgraph_test_utils::{init_tracing, with_timeout};

fn parallel(workers: usize, factory: Arc<dyn ExecutorFactory>) -> TaskGraphExecuter {
    init_tracing();
    TaskGraphExecuter::new(Box::new(ParallelPlanExecutor::new(workers, factory)))
}

fn assert_finished_before(log: &ExecutionLog, dep: &str, dependent: &str) {
    let dep = log.record(dep).expect("dependency did not run");
    let dependent = log.record(dependent).expect("dependent did not run");
    assert!(
        dep.finished <= dependent.started,
        "{} started before {} finished",
        dependent.path,
        dep.path
    );
}

#[test]
fn test_parallel_run_respects_dependencies() {
    let (log, spawned) = with_timeout(|| {
        let log = ExecutionLog::new();
        let a = TaskBuilder::new(":a", &log).sleeping(30).build();
        let b = TaskBuilder::new(":b", &log).depends_on(&[&a]).sleeping(10).build();
        let c = TaskBuilder::new(":c", &log).depends_on(&[&a]).sleeping(10).build();
        let d = task(":d", &log, &[&b, &c]);

        let factory = CountingExecutorFactory::new();
        let mut exec = parallel(4, factory.clone());
        exec.add_tasks(refs(&[&d])).unwrap();
        exec.execute().unwrap();
        (log, factory.spawned())
    });

    assert_eq!(spawned, 3);
    assert_eq!(log.executed().len(), 4);
    assert_finished_before(&log, ":a", ":b");
    assert_finished_before(&log, ":a", ":c");
    assert_finished_before(&log, ":b", ":d");
    assert_finished_before(&log, ":c", ":d");
}

#[test]
fn test_independent_tasks_run_concurrently() {
    let log = with_timeout(|| {
        let log = ExecutionLog::new();
        let tasks: Vec<Arc<TestTask>> = (0..4)
            .map(|i| TaskBuilder::new(&format!(":t{i}"), &log).sleeping(150).build())
            .collect();

        let mut exec = parallel(4, CountingExecutorFactory::new());
        exec.add_tasks(tasks.iter().map(|t| t.task_ref())).unwrap();
        exec.execute().unwrap();
        log
    });

    let records = log.records();
    assert_eq!(records.len(), 4);
    let overlapping = records
        .iter()
        .enumerate()
        .any(|(i, r)| records[i + 1..].iter().any(|other| r.overlaps(other)));
    assert!(overlapping, "expected at least two tasks to overlap");

    let threads: HashSet<Option<String>> = records.iter().map(|r| r.thread.clone()).collect();
    assert!(threads.len() > 1);
}

#[test]
fn test_tasks_sharing_a_mutex_never_overlap() {
    let log = with_timeout(|| {
        let log = ExecutionLog::new();
        let mut tasks: Vec<Arc<TestTask>> = (0..6)
            .map(|i| {
                TaskBuilder::new(&format!(":locked{i}"), &log)
                    .mutex("database")
                    .sleeping(20)
                    .build()
            })
            .collect();
        tasks.extend((0..3).map(|i| TaskBuilder::new(&format!(":free{i}"), &log).sleeping(20).build()));

        let mut exec = parallel(4, CountingExecutorFactory::new());
        exec.add_tasks(tasks.iter().map(|t| t.task_ref())).unwrap();
        exec.execute().unwrap();
        log
    });

    let locked: Vec<_> = log
        .records()
        .into_iter()
        .filter(|r| r.path.starts_with(":locked"))
        .collect();
    assert_eq!(locked.len(), 6);
    for (i, a) in locked.iter().enumerate() {
        for b in &locked[i + 1..] {
            assert!(!a.overlaps(b), "{} overlapped {}", a.path, b.path);
        }
    }
    assert_eq!(log.executed().len(), 9);
}

#[test]
fn test_worker_spawn_failure_falls_back_to_calling_thread() {
    let (log, attempts) = with_timeout(|| {
        let log = ExecutionLog::new();
        let a = task(":a", &log, &[]);
        let b = task(":b", &log, &[&a]);

        let factory = FailingExecutorFactory::new();
        let mut exec = parallel(4, factory.clone());
        exec.add_tasks(refs(&[&b])).unwrap();
        exec.execute().unwrap();
        (log, factory.attempts())
    });

    assert_eq!(attempts, 1);
    assert_eq!(log.executed(), vec![":a", ":b"]);
    let threads: HashSet<Option<String>> =
        log.records().into_iter().map(|r| r.thread).collect();
    assert_eq!(threads, HashSet::from([Some("test-driver".to_string())]));
}

#[test]
fn test_parallel_fail_fast_skips_dependents() {
    let (log, failed) = with_timeout(|| {
        let log = ExecutionLog::new();
        let a = TaskBuilder::new(":a", &log).failing("boom").build();
        let b = task(":b", &log, &[&a]);
        let c = task(":c", &log, &[&b]);

        let mut exec = parallel(3, CountingExecutorFactory::new());
        exec.add_tasks(refs(&[&c])).unwrap();
        let err = exec.execute().unwrap_err();
        let failed: Vec<String> = err.failures().iter().map(|f| f.task().to_string()).collect();
        (log, failed)
    });

    assert_eq!(log.executed(), vec![":a"]);
    assert_eq!(failed, vec![":a"]);
}

#[test]
fn test_listener_callbacks_are_serialized() {
    let listener = Arc::new(RecordingListener::new());
    let events = {
        let listener = Arc::clone(&listener);
        with_timeout(move || {
            let log = ExecutionLog::new();
            let tasks: Vec<Arc<TestTask>> = (0..8)
                .map(|i| TaskBuilder::new(&format!(":t{i}"), &log).sleeping(5).build())
                .collect();

            let mut exec = parallel(4, CountingExecutorFactory::new());
            exec.add_task_execution_listener(listener.clone());
            exec.add_tasks(tasks.iter().map(|t| t.task_ref())).unwrap();
            exec.execute().unwrap();
            listener.events()
        })
    };

    assert_eq!(events.len(), 16);
    assert_eq!(listener.max_concurrent_callbacks(), 1);
}

#[test]
fn test_executer_from_config_runs_plan() {
    let raw = parse_str(
        r#"
[executor]
parallel_threads = 3
failure_mode = "continue"
"#,
    )
    .unwrap();
    let cfg = ConfigFile::try_from(raw).unwrap();
    assert_eq!(cfg.worker_count(), 3);

    let log = with_timeout(move || {
        init_tracing();
        let log = ExecutionLog::new();
        let a = TaskBuilder::new(":a", &log).failing("boom").build();
        let b = task(":b", &log, &[]);
        let c = task(":c", &log, &[]);

        let mut exec = TaskGraphExecuter::from_config(&cfg);
        exec.add_tasks(refs(&[&a, &b, &c])).unwrap();
        assert!(exec.execute().is_err());
        log
    });

    // Continue mode: every independent task still ran.
    let mut executed = log.executed();
    executed.sort();
    assert_eq!(executed, vec![":a", ":b", ":c"]);
}

// tests/cycles.rs

use taskgraph::errors::SchedulerError;
use taskgraph::{Task, TaskGraphExecuter};
use taskgraph_test_utils::builders::{paths, refs, task, ExecutionLog, TaskBuilder};
use taskgraph_test_utils::init_tracing;

fn cycle_message(err: SchedulerError) -> String {
    match err {
        SchedulerError::CircularDependency(chain) => chain,
        other => panic!("Expected CircularDependency error, got: {:?}", other),
    }
}

#[test]
fn test_two_task_cycle_is_rejected_before_execution() {
    init_tracing();
    let log = ExecutionLog::new();
    let a = task(":a", &log, &[]);
    let b = task(":b", &log, &[&a]);
    a.add_dependency(&b);

    let mut exec = TaskGraphExecuter::sequential();
    let err = exec.add_tasks(refs(&[&b])).unwrap_err();

    let chain = cycle_message(err);
    assert_eq!(chain, ":a -> :b -> :a");
    assert!(log.executed().is_empty());
}

#[test]
fn test_cycle_error_renders_full_message() {
    init_tracing();
    let log = ExecutionLog::new();
    let a = task(":a", &log, &[]);
    let b = task(":b", &log, &[&a]);
    a.add_dependency(&b);

    let mut exec = TaskGraphExecuter::sequential();
    let err = exec.add_tasks(refs(&[&a])).unwrap_err();

    let message = err.to_string();
    assert!(message.starts_with("Circular dependency between the following tasks:"));
    assert!(message.contains(":a"));
    assert!(message.contains(":b"));
}

#[test]
fn test_self_dependency_is_rejected() {
    init_tracing();
    let log = ExecutionLog::new();
    let a = task(":a", &log, &[]);
    a.add_dependency(&a);

    let mut exec = TaskGraphExecuter::sequential();
    let chain = cycle_message(exec.add_tasks(refs(&[&a])).unwrap_err());
    assert_eq!(chain, ":a -> :a");
}

#[test]
fn test_longer_cycle_reports_its_members_in_order() {
    init_tracing();
    let log = ExecutionLog::new();
    let a = task(":a", &log, &[]);
    let c = task(":c", &log, &[&a]);
    let b = task(":b", &log, &[&c]);
    a.add_dependency(&b);
    let root = task(":root", &log, &[&a]);

    let mut exec = TaskGraphExecuter::sequential();
    let chain = cycle_message(exec.add_tasks(refs(&[&root])).unwrap_err());
    assert_eq!(chain, ":a -> :b -> :c -> :a");
}

#[test]
fn test_cycle_through_ordering_constraint_is_rejected() {
    init_tracing();
    let log = ExecutionLog::new();
    let a = task(":a", &log, &[]);
    let b = TaskBuilder::new(":b", &log).depends_on(&[&a]).build();
    a.add_must_run_after(&b);

    let mut exec = TaskGraphExecuter::sequential();
    let chain = cycle_message(exec.add_tasks(refs(&[&b])).unwrap_err());
    assert_eq!(chain, ":a -> :b -> :a");
}

#[test]
fn test_ordering_constraint_to_unplanned_task_is_not_a_cycle() {
    init_tracing();
    let log = ExecutionLog::new();
    let a = task(":a", &log, &[]);
    let b = TaskBuilder::new(":b", &log).depends_on(&[&a]).build();
    a.add_must_run_after(&b);

    // :b is never planned, so the ordering constraint on :a is inert.
    let mut exec = TaskGraphExecuter::sequential();
    exec.add_tasks(refs(&[&a])).unwrap();
    exec.execute().unwrap();
    assert_eq!(log.executed(), vec![":a"]);
}

#[test]
fn test_should_run_after_edge_into_a_visiting_task_is_dropped() {
    init_tracing();
    let log = ExecutionLog::new();
    let b = task(":b", &log, &[]);
    let a = task(":a", &log, &[&b]);
    b.add_should_run_after(&a);

    let mut exec = TaskGraphExecuter::sequential();
    exec.add_tasks(refs(&[&a])).unwrap();
    assert_eq!(paths(&exec.get_all_tasks().unwrap()), vec![":b", ":a"]);

    exec.execute().unwrap();
    assert_eq!(log.executed(), vec![":b", ":a"]);
}

#[test]
fn test_should_run_after_edge_is_dropped_when_cycle_is_found_past_it() {
    init_tracing();
    let log = ExecutionLog::new();
    let a = task(":a", &log, &[]);
    let c = task(":c", &log, &[&a]);
    let b = task(":b", &log, &[&c]);
    a.add_should_run_after(&b);

    // :b needs :c which needs :a, so ":a should run after :b" cannot hold.
    let mut exec = TaskGraphExecuter::sequential();
    exec.add_tasks(refs(&[&a, &b])).unwrap();
    assert_eq!(paths(&exec.get_all_tasks().unwrap()), vec![":a", ":c", ":b"]);

    exec.execute().unwrap();
    assert_eq!(log.executed(), vec![":a", ":c", ":b"]);
}

#[test]
fn test_should_run_after_does_not_hide_a_dependency_cycle() {
    init_tracing();
    let log = ExecutionLog::new();
    let c = task(":c", &log, &[]);
    let a = TaskBuilder::new(":a", &log).should_run_after(&[&c]).build();
    let b = task(":b", &log, &[&a]);
    a.add_dependency(&b);

    let mut exec = TaskGraphExecuter::sequential();
    let chain = cycle_message(exec.add_tasks(refs(&[&a, &c])).unwrap_err());
    assert_eq!(chain, ":a -> :b -> :a");
    assert!(log.executed().is_empty());
}

#[test]
fn test_filtered_task_breaks_cycle() {
    init_tracing();
    let log = ExecutionLog::new();
    let a = task(":a", &log, &[]);
    let b = task(":b", &log, &[&a]);
    a.add_dependency(&b);

    let mut exec = TaskGraphExecuter::sequential();
    exec.use_filter(|t: &dyn Task| t.path() != ":b");
    exec.add_tasks(refs(&[&a])).unwrap();
    exec.execute().unwrap();

    assert_eq!(log.executed(), vec![":a"]);
}

#[test]
fn test_rejected_batch_leaves_previous_plan_intact() {
    init_tracing();
    let log = ExecutionLog::new();
    let ok = task(":ok", &log, &[]);
    let a = task(":a", &log, &[]);
    let b = task(":b", &log, &[&a]);
    a.add_dependency(&b);

    let mut exec = TaskGraphExecuter::sequential();
    exec.add_tasks(refs(&[&ok])).unwrap();
    assert!(exec.add_tasks(refs(&[&a])).is_err());

    assert_eq!(paths(&exec.get_all_tasks().unwrap()), vec![":ok"]);
}

// tests/scheduler_property.rs

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use proptest::prelude::*;
use taskgraph::dag::{ContinueOnFailureHandler, TaskExecutionPlan, TaskOutcome};
use taskgraph::exec::ParallelPlanExecutor;
use taskgraph::task::Task;
use taskgraph::TaskGraphExecuter;
use taskgraph_test_utils::builders::{ExecutionLog, TaskBuilder, TestTask};
use taskgraph_test_utils::fake_executor::CountingExecutorFactory;

/// Random acyclic graph: task N may only depend on tasks 0..N-1.
fn dag_strategy(max_tasks: usize) -> impl Strategy<Value = Vec<Vec<usize>>> {
    (1..=max_tasks).prop_flat_map(|num_tasks| {
        proptest::collection::vec(
            proptest::collection::vec(any::<usize>(), 0..num_tasks),
            num_tasks,
        )
        .prop_map(|raw| {
            raw.into_iter()
                .enumerate()
                .map(|(i, potential)| {
                    let mut deps: Vec<usize> = if i == 0 {
                        Vec::new()
                    } else {
                        potential.into_iter().map(|d| d % i).collect()
                    };
                    deps.sort_unstable();
                    deps.dedup();
                    deps
                })
                .collect()
        })
    })
}

fn build_tasks(
    deps: &[Vec<usize>],
    failing: &HashSet<usize>,
    log: &ExecutionLog,
) -> Vec<Arc<TestTask>> {
    let mut tasks: Vec<Arc<TestTask>> = Vec::with_capacity(deps.len());
    for (i, task_deps) in deps.iter().enumerate() {
        let dep_refs: Vec<&Arc<TestTask>> = task_deps.iter().map(|d| &tasks[*d]).collect();
        let mut builder = TaskBuilder::new(&format!(":task_{i:02}"), log).depends_on(&dep_refs);
        if failing.contains(&i) {
            builder = builder.failing("induced failure");
        }
        tasks.push(builder.build());
    }
    tasks
}

/// Every transitive dependency of the requested tasks, including themselves.
fn closure(deps: &[Vec<usize>], requested: &[usize]) -> HashSet<usize> {
    let mut seen = HashSet::new();
    let mut stack: Vec<usize> = requested.to_vec();
    while let Some(i) = stack.pop() {
        if seen.insert(i) {
            stack.extend(deps[i].iter().copied());
        }
    }
    seen
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_plan_is_a_topological_order_of_the_requested_closure(
        deps in dag_strategy(12),
        requested in proptest::collection::vec(0..12usize, 1..4),
    ) {
        let requested: Vec<usize> = requested.into_iter().filter(|i| *i < deps.len()).collect();
        prop_assume!(!requested.is_empty());

        let log = ExecutionLog::new();
        let tasks = build_tasks(&deps, &HashSet::new(), &log);
        let plan = TaskExecutionPlan::new();
        plan.add_to_task_graph(requested.iter().map(|i| tasks[*i].task_ref()));
        plan.determine_execution_plan().unwrap();

        let planned: Vec<String> = plan.tasks().iter().map(|t| t.path().to_string()).collect();
        let position: HashMap<&str, usize> =
            planned.iter().enumerate().map(|(i, p)| (p.as_str(), i)).collect();

        let expected = closure(&deps, &requested);
        prop_assert_eq!(planned.len(), expected.len());

        for i in &expected {
            let path = format!(":task_{i:02}");
            let pos = position[path.as_str()];
            for d in &deps[*i] {
                let dep_path = format!(":task_{:02}", d);
                prop_assert!(position[dep_path.as_str()] < pos, "{} planned before its dependency {}", path, dep_path);
            }
        }
    }

    #[test]
    fn test_manual_walk_terminates_and_never_runs_after_failed_dependency(
        deps in dag_strategy(10),
        failing in proptest::collection::hash_set(0..10usize, 0..3),
    ) {
        let log = ExecutionLog::new();
        let tasks = build_tasks(&deps, &failing, &log);
        let plan = TaskExecutionPlan::new();
        plan.use_failure_handler(Arc::new(ContinueOnFailureHandler));
        plan.add_to_task_graph(tasks.iter().map(|t| t.task_ref()));
        plan.determine_execution_plan().unwrap();

        let mut steps = 0;
        let mut ran: HashSet<String> = HashSet::new();
        while let Some(scheduled) = plan.get_task_to_execute() {
            steps += 1;
            prop_assert!(steps <= deps.len(), "more tasks handed out than planned");
            let outcome = match scheduled.task.execute() {
                Ok(()) => TaskOutcome::success(),
                Err(e) => TaskOutcome::task_failed(e),
            };
            ran.insert(scheduled.task.path().to_string());
            plan.task_complete(scheduled.id, outcome);
        }

        let result = plan.await_completion();
        let failed_and_ran: Vec<usize> = failing
            .iter()
            .copied()
            .filter(|i| *i < deps.len() && ran.contains(&format!(":task_{i:02}")))
            .collect();
        prop_assert_eq!(result.is_err(), !failed_and_ran.is_empty());

        // A task only runs if every dependency ran and succeeded.
        for (i, task_deps) in deps.iter().enumerate() {
            if !ran.contains(&format!(":task_{i:02}")) {
                continue;
            }
            for d in task_deps {
                let dep_name = format!(":task_{d:02}");
                prop_assert!(ran.contains(&dep_name));
                prop_assert!(!failing.contains(d));
            }
        }
    }
}

#[test]
fn test_parallel_run_matches_sequential_set() {
    let deps: Vec<Vec<usize>> = vec![
        vec![],
        vec![0],
        vec![0],
        vec![1, 2],
        vec![],
        vec![4, 3],
        vec![5],
        vec![],
    ];

    let sequential_log = ExecutionLog::new();
    let tasks = build_tasks(&deps, &HashSet::new(), &sequential_log);
    let mut exec = TaskGraphExecuter::sequential();
    exec.add_tasks(tasks.iter().map(|t| t.task_ref())).unwrap();
    exec.execute().unwrap();

    let parallel_log = ExecutionLog::new();
    let tasks = build_tasks(&deps, &HashSet::new(), &parallel_log);
    let mut exec = TaskGraphExecuter::new(Box::new(ParallelPlanExecutor::new(
        4,
        CountingExecutorFactory::new(),
    )));
    exec.add_tasks(tasks.iter().map(|t| t.task_ref())).unwrap();
    exec.execute().unwrap();

    let mut sequential = sequential_log.executed();
    let mut parallel = parallel_log.executed();
    sequential.sort();
    parallel.sort();
    assert_eq!(sequential, parallel);
    assert_eq!(parallel.len(), deps.len());
}

// src/dag/builder.rs

//! Expansion of requested tasks into a full dependency graph.

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::{debug, trace};

use crate::dag::graph::DependencyGraph;
use crate::dag::node::NodeId;
use crate::task::{TaskFilter, TaskRef};

/// Nodes the planner starts from: requested (entry) tasks and every
/// finalizer discovered while building, both in insertion order.
#[derive(Debug, Default)]
pub struct GraphRoots {
    entry_tasks: Vec<NodeId>,
    finalizer_tasks: Vec<NodeId>,
    seen_entries: HashSet<NodeId>,
    seen_finalizers: HashSet<NodeId>,
}

impl GraphRoots {
    pub fn entry_tasks(&self) -> &[NodeId] {
        &self.entry_tasks
    }

    pub fn finalizer_tasks(&self) -> &[NodeId] {
        &self.finalizer_tasks
    }

    fn add_entry(&mut self, id: NodeId) {
        if self.seen_entries.insert(id) {
            self.entry_tasks.push(id);
        }
    }

    fn add_finalizer(&mut self, id: NodeId) {
        if self.seen_finalizers.insert(id) {
            self.finalizer_tasks.push(id);
        }
    }

    pub fn clear(&mut self) {
        self.entry_tasks.clear();
        self.finalizer_tasks.clear();
        self.seen_entries.clear();
        self.seen_finalizers.clear();
    }
}

/// Populates a [`DependencyGraph`] from a batch of requested tasks.
///
/// The walk uses an explicit deque rather than recursion: a task is visited
/// once to queue its dependencies and finalizers ahead of itself, and a
/// second time, after those were processed, to record its edges.
///
/// Cycles are not reported here. A dependency that is still being visited
/// is simply not queued again; its edge is still recorded so the planner
/// can report the full cycle.
pub struct GraphBuilder<'a> {
    graph: &'a mut DependencyGraph,
    roots: &'a mut GraphRoots,
    filter: &'a TaskFilter,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(
        graph: &'a mut DependencyGraph,
        roots: &'a mut GraphRoots,
        filter: &'a TaskFilter,
    ) -> Self {
        Self {
            graph,
            roots,
            filter,
        }
    }

    /// Add a batch of requested tasks and everything reachable from them.
    pub fn add_tasks(&mut self, tasks: impl IntoIterator<Item = TaskRef>) {
        let mut sorted: Vec<TaskRef> = tasks.into_iter().collect();
        sorted.sort_by(|a, b| a.path().cmp(b.path()));
        sorted.dedup_by(|a, b| a.path() == b.path());

        let mut queue: VecDeque<NodeId> = VecDeque::with_capacity(sorted.len());
        for task in sorted {
            let id = self.graph.add_node(task);
            self.roots.add_entry(id);
            queue.push_back(id);
        }

        let mut visiting: HashSet<NodeId> = HashSet::new();
        // Dependencies resolved on the first visit, consumed on the second.
        let mut resolved: HashMap<NodeId, Vec<NodeId>> = HashMap::new();

        while let Some(&id) = queue.front() {
            if self.graph.node(id).dependencies_processed() {
                queue.pop_front();
                continue;
            }

            if !self.accepts(id) {
                queue.pop_front();
                let node = self.graph.node_mut(id);
                node.mark_dependencies_processed();
                node.do_not_require();
                debug!(task = %node.path(), "task excluded by filter");
                continue;
            }

            if visiting.insert(id) {
                let task = self.graph.node(id).task().clone();
                trace!(task = %task.path(), "visiting task");

                for finalizer in task.finalized_by() {
                    let finalizer_id = self.graph.add_node(finalizer);
                    if self.add_finalizer_node(id, finalizer_id) && !visiting.contains(&finalizer_id)
                    {
                        queue.push_front(finalizer_id);
                    }
                }

                let mut deps: Vec<NodeId> = task
                    .dependencies()
                    .into_iter()
                    .map(|dep| self.graph.add_node(dep))
                    .collect();
                deps.sort_by(|a, b| self.graph.path_of(*a).cmp(self.graph.path_of(*b)));
                deps.dedup();

                // Push in reverse so the smallest path ends up at the front.
                for dep in deps.iter().rev() {
                    if !visiting.contains(dep) {
                        queue.push_front(*dep);
                    }
                }
                resolved.insert(id, deps);
            } else {
                queue.pop_front();
                visiting.remove(&id);

                let deps = resolved.remove(&id).unwrap_or_default();
                for dep in deps {
                    if self.accepts(dep) {
                        self.graph.add_hard_edge(id, dep);
                    }
                }

                let task = self.graph.node(id).task().clone();
                for after in task.must_run_after() {
                    let after_id = self.graph.add_node(after);
                    if self.accepts(after_id) {
                        self.graph.add_soft_edge(id, after_id);
                    }
                }
                for after in task.should_run_after() {
                    let after_id = self.graph.add_node(after);
                    if self.accepts(after_id) {
                        self.graph.add_should_edge(id, after_id);
                    }
                }

                self.graph.node_mut(id).mark_dependencies_processed();
                trace!(task = %task.path(), "dependencies processed");
            }
        }
    }

    /// Register `finalizer` as finalizing `node`. Returns `false` if the
    /// finalizer is excluded by the filter.
    fn add_finalizer_node(&mut self, node: NodeId, finalizer: NodeId) -> bool {
        if !self.accepts(finalizer) {
            return false;
        }
        self.graph.add_finalizer(node, finalizer);
        self.graph.node_mut(finalizer).must_not_run();
        self.graph.add_soft_edge(finalizer, node);
        self.roots.add_finalizer(finalizer);
        debug!(
            task = %self.graph.path_of(node),
            finalizer = %self.graph.path_of(finalizer),
            "registered finalizer"
        );
        true
    }

    /// Evaluate the filter at most once per node.
    fn accepts(&mut self, id: NodeId) -> bool {
        if let Some(accepted) = self.graph.node(id).accepted() {
            return accepted;
        }
        let task = self.graph.node(id).task().clone();
        let accepted = (self.filter)(task.as_ref());
        self.graph.node_mut(id).set_accepted(accepted);
        accepted
    }
}

// src/dag/planner.rs

//! Turns a populated [`DependencyGraph`] into a linear execution order.
//!
//! Planning happens in three passes:
//! 1. requiredness is propagated from the entry tasks along hard edges;
//! 2. finalizers nobody requires (and their dependency closure) are marked
//!    `MustNotRun`, so they are planned but only run if enforced later;
//! 3. a depth-first walk over hard, soft and should edges appends nodes in
//!    post-order, which puts every dependency before its dependents. A
//!    finalizer is queued right after the task it finalizes is planned.
//!
//! A cycle found in pass 3 aborts planning with
//! [`SchedulerError::CircularDependency`], unless the walk reached it
//! through a should-run-after edge: that edge is dropped and the walk
//! resumes from its source.

use std::collections::{HashMap, HashSet, VecDeque};

use petgraph::algo::tarjan_scc;
use petgraph::graphmap::DiGraphMap;
use tracing::{debug, warn};

use crate::dag::builder::GraphRoots;
use crate::dag::graph::DependencyGraph;
use crate::dag::node::{NodeId, Requirement};
use crate::errors::{Result, SchedulerError};

/// Insertion-ordered set of planned nodes.
#[derive(Debug, Default)]
pub struct ExecutionOrder {
    order: Vec<NodeId>,
    planned: HashSet<NodeId>,
}

impl ExecutionOrder {
    pub fn contains(&self, id: NodeId) -> bool {
        self.planned.contains(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.order.iter().copied()
    }

    pub fn as_slice(&self) -> &[NodeId] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.planned.clear();
    }

    fn push(&mut self, id: NodeId) {
        if self.planned.insert(id) {
            self.order.push(id);
        }
    }

    /// Drop everything appended after the first `len` entries.
    fn truncate(&mut self, len: usize) {
        for id in self.order.drain(len..) {
            self.planned.remove(&id);
        }
    }
}

/// Bookkeeping for one ordering pass.
#[derive(Debug, Default)]
struct OrderWalk {
    queue: VecDeque<NodeId>,
    visiting: HashSet<NodeId>,
    /// Nodes whose first visit is done but which are not planned yet.
    path: Vec<NodeId>,
    /// Should-edges the walk arrived through, most recent last.
    should_edges: Vec<(NodeId, NodeId)>,
    /// Plan length when a node with should-successors was first visited.
    plan_before_visiting: HashMap<NodeId, usize>,
}

impl OrderWalk {
    fn leave_should_edge(&mut self, id: NodeId) {
        if self.should_edges.last().is_some_and(|(_, to)| *to == id) {
            self.should_edges.pop();
        }
    }
}

/// Borrowed view over the graph state needed to compute a plan.
pub struct ExecutionPlanner<'a> {
    graph: &'a mut DependencyGraph,
    roots: &'a GraphRoots,
    order: &'a mut ExecutionOrder,
}

impl<'a> ExecutionPlanner<'a> {
    pub fn new(
        graph: &'a mut DependencyGraph,
        roots: &'a GraphRoots,
        order: &'a mut ExecutionOrder,
    ) -> Self {
        Self {
            graph,
            roots,
            order,
        }
    }

    /// Run all three passes. Nodes planned by earlier calls keep their
    /// position; only new nodes are appended.
    pub fn determine(&mut self) -> Result<()> {
        self.propagate_requiredness();
        self.prune_finalizers();
        self.order_nodes()?;
        debug!(planned = self.order.len(), "execution plan determined");
        Ok(())
    }

    /// Pass 1: entry tasks and their hard-dependency closure are required.
    fn propagate_requiredness(&mut self) {
        let mut stack: Vec<NodeId> = self.roots.entry_tasks().to_vec();

        while let Some(id) = stack.pop() {
            let node = self.graph.node_mut(id);
            if node.requirement() == Requirement::NotRequired || node.is_required() {
                continue;
            }
            node.require();
            stack.extend(node.hard_successors().iter().copied());
        }
    }

    /// Pass 2: finalizers that are not required, and whatever only they
    /// depend on, should not run unless enforced.
    fn prune_finalizers(&mut self) {
        let mut visited: HashSet<NodeId> = HashSet::new();

        for &finalizer in self.roots.finalizer_tasks() {
            let mut stack = vec![finalizer];
            while let Some(id) = stack.pop() {
                if !visited.insert(id) {
                    continue;
                }
                let node = self.graph.node_mut(id);
                if node.is_required() || node.requirement() == Requirement::NotRequired {
                    continue;
                }
                node.must_not_run();
                stack.extend(node.hard_successors().iter().copied());
            }
        }
    }

    /// Pass 3: depth-first post-order over hard, soft and should edges.
    ///
    /// Entry tasks are walked first. Finalizers are queued as soon as the
    /// task they finalize is planned; any left over are walked last.
    fn order_nodes(&mut self) -> Result<()> {
        let roots = self.roots;
        let planned_before = self.order.len();
        let mut walk = OrderWalk::default();

        walk.queue.extend(roots.entry_tasks().iter().copied());
        self.drain(&mut walk, planned_before)?;

        walk.queue.extend(roots.finalizer_tasks().iter().copied());
        self.drain(&mut walk, planned_before)
    }

    fn drain(&mut self, walk: &mut OrderWalk, planned_before: usize) -> Result<()> {
        'queue: while let Some(&id) = walk.queue.front() {
            if self.order.contains(id) || !self.graph.node(id).is_included_in_plan() {
                walk.queue.pop_front();
                walk.leave_should_edge(id);
                continue;
            }

            if walk.visiting.insert(id) {
                if let Some(&from) = walk.path.last() {
                    if self.graph.node(from).should_successors().contains(&id) {
                        walk.should_edges.push((from, id));
                    }
                }
                self.drop_should_edges_into(id, &walk.visiting);
                if !self.graph.node(id).should_successors().is_empty() {
                    walk.plan_before_visiting.insert(id, self.order.len());
                }

                for successor in self.successors_in_reverse(id) {
                    if walk.visiting.contains(&successor) {
                        match walk.should_edges.pop() {
                            Some(edge) => {
                                self.unwind_should_edge(walk, edge);
                                continue 'queue;
                            }
                            None => {
                                self.order.truncate(planned_before);
                                return Err(self.cycle_error());
                            }
                        }
                    }
                    walk.queue.push_front(successor);
                }
                walk.path.push(id);
            } else {
                walk.queue.pop_front();
                walk.leave_should_edge(id);
                walk.visiting.remove(&id);
                walk.path.pop();
                self.order.push(id);
                self.queue_finalizers(walk, id);
            }
        }

        Ok(())
    }

    /// Successors in the order they are pushed to the front of the queue, so
    /// that should-successors are walked first and dependencies last.
    fn successors_in_reverse(&self, id: NodeId) -> Vec<NodeId> {
        let node = self.graph.node(id);
        node.hard_successors()
            .iter()
            .rev()
            .chain(node.soft_successors().iter().rev())
            .chain(node.should_successors().iter().rev())
            .copied()
            .collect()
    }

    /// A should-edge into a node that is still being visited would close a
    /// cycle.
    fn drop_should_edges_into(&mut self, id: NodeId, visiting: &HashSet<NodeId>) {
        let cyclic: Vec<NodeId> = self
            .graph
            .node(id)
            .should_successors()
            .iter()
            .copied()
            .filter(|after| visiting.contains(after))
            .collect();
        for after in cyclic {
            debug!(
                task = %self.graph.path_of(id),
                after = %self.graph.path_of(after),
                "dropping should-run-after edge that would close a cycle"
            );
            self.graph.remove_should_edge(id, after);
        }
    }

    /// Remove a walked should-edge and rewind the walk to just before its
    /// source was first visited.
    fn unwind_should_edge(&mut self, walk: &mut OrderWalk, (from, to): (NodeId, NodeId)) {
        debug!(
            task = %self.graph.path_of(from),
            after = %self.graph.path_of(to),
            "cycle found past a should-run-after edge; dropping it"
        );
        self.graph.remove_should_edge(from, to);

        while let Some(id) = walk.path.pop() {
            if id == from {
                break;
            }
        }
        while let Some(&next) = walk.queue.front() {
            walk.visiting.remove(&next);
            if next == from {
                break;
            }
            walk.queue.pop_front();
        }
        if let Some(&len) = walk.plan_before_visiting.get(&from) {
            self.order.truncate(len);
        }
    }

    /// Queue the finalizers of a node that was just planned.
    fn queue_finalizers(&self, walk: &mut OrderWalk, id: NodeId) {
        for &finalizer in self.graph.node(id).finalizers().iter().rev() {
            if self.order.contains(finalizer)
                || walk.visiting.contains(&finalizer)
                || walk.queue.contains(&finalizer)
            {
                continue;
            }
            let position = self.finalizer_position(finalizer, &walk.queue);
            walk.queue.insert(position, finalizer);
        }
    }

    /// Just after the last queued node the finalizer has to follow, or the
    /// head of the queue if none is queued.
    fn finalizer_position(&self, finalizer: NodeId, queue: &VecDeque<NodeId>) -> usize {
        let node = self.graph.node(finalizer);
        node.hard_successors()
            .iter()
            .chain(node.soft_successors())
            .chain(node.should_successors())
            .filter_map(|after| queue.iter().position(|queued| queued == after))
            .max()
            .map_or(0, |index| index + 1)
    }

    /// Find the first cycle among planned-or-plannable nodes and render it.
    fn cycle_error(&self) -> SchedulerError {
        let cycle = find_first_cycle(self.graph, self.roots);
        let rendered = cycle
            .iter()
            .map(|id| self.graph.path_of(*id))
            .collect::<Vec<_>>()
            .join(" -> ");
        warn!(cycle = %rendered, "circular dependency in task graph");
        SchedulerError::CircularDependency(rendered)
    }
}

/// Locate a cycle reachable from the roots over hard and soft edges.
///
/// Returns the shortest cycle through the smallest-path member of the first
/// strongly connected component that contains one, with the start node
/// repeated at the end (`[a, b, a]`).
pub fn find_first_cycle(graph: &DependencyGraph, roots: &GraphRoots) -> Vec<NodeId> {
    let mut walk: DiGraphMap<NodeId, ()> = DiGraphMap::new();
    let mut stack: Vec<NodeId> = roots
        .entry_tasks()
        .iter()
        .chain(roots.finalizer_tasks())
        .copied()
        .collect();
    let mut seen: HashSet<NodeId> = HashSet::new();

    while let Some(id) = stack.pop() {
        let node = graph.node(id);
        if !node.is_included_in_plan() || !seen.insert(id) {
            continue;
        }
        walk.add_node(id);
        for &next in node.hard_successors().iter().chain(node.soft_successors()) {
            if graph.node(next).is_included_in_plan() {
                walk.add_edge(id, next, ());
                stack.push(next);
            }
        }
    }

    let mut best: Option<Vec<NodeId>> = None;
    for component in tarjan_scc(&walk) {
        let is_cycle = component.len() > 1
            || component
                .first()
                .is_some_and(|only| walk.contains_edge(*only, *only));
        if !is_cycle {
            continue;
        }
        let start = match component.iter().min_by(|a, b| graph.path_of(**a).cmp(graph.path_of(**b))) {
            Some(start) => *start,
            None => continue,
        };
        let members: HashSet<NodeId> = component.iter().copied().collect();
        let cycle = shortest_cycle_through(&walk, &members, start);
        let better = match &best {
            None => true,
            Some(current) => graph.path_of(start) < graph.path_of(current[0]),
        };
        if better {
            best = Some(cycle);
        }
    }

    best.unwrap_or_default()
}

/// Breadth-first search from `start` back to itself, staying inside one
/// strongly connected component.
fn shortest_cycle_through(
    walk: &DiGraphMap<NodeId, ()>,
    members: &HashSet<NodeId>,
    start: NodeId,
) -> Vec<NodeId> {
    if walk.contains_edge(start, start) {
        return vec![start, start];
    }

    let mut parent: HashMap<NodeId, NodeId> = HashMap::new();
    let mut queue: VecDeque<NodeId> = VecDeque::from([start]);

    while let Some(current) = queue.pop_front() {
        let mut neighbours: Vec<NodeId> = walk.neighbors(current).collect();
        neighbours.sort();
        for next in neighbours {
            if !members.contains(&next) {
                continue;
            }
            if next == start {
                let mut path = vec![start];
                let mut cursor = current;
                while cursor != start {
                    path.push(cursor);
                    cursor = parent[&cursor];
                }
                path.push(start);
                path.reverse();
                return path;
            }
            if !parent.contains_key(&next) {
                parent.insert(next, current);
                queue.push_back(next);
            }
        }
    }

    vec![start, start]
}

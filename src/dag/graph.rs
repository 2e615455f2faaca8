// src/dag/graph.rs

use std::collections::HashMap;

use crate::dag::node::{NodeId, TaskNode};
use crate::task::TaskRef;

/// Arena of [`TaskNode`]s keyed by task path.
///
/// Edges are stored on the nodes as `NodeId` lists kept sorted by task
/// path, so every traversal over successors is deterministic.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    nodes: Vec<TaskNode>,
    index: HashMap<String, NodeId>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the node for `task`, creating it on first sight.
    pub fn add_node(&mut self, task: TaskRef) -> NodeId {
        if let Some(id) = self.index.get(task.path()) {
            return *id;
        }
        let id = NodeId(self.nodes.len());
        self.index.insert(task.path().to_string(), id);
        self.nodes.push(TaskNode::new(task));
        id
    }

    pub fn get(&self, path: &str) -> Option<NodeId> {
        self.index.get(path).copied()
    }

    pub fn node(&self, id: NodeId) -> &TaskNode {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut TaskNode {
        &mut self.nodes[id.0]
    }

    pub fn path_of(&self, id: NodeId) -> &str {
        self.nodes[id.0].path()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// `from` depends on `to`.
    pub fn add_hard_edge(&mut self, from: NodeId, to: NodeId) {
        if let Some(pos) = self.sorted_position(&self.nodes[from.0].hard_successors, to) {
            self.nodes[from.0].hard_successors.insert(pos, to);
        }
    }

    /// `from` must run after `to` when both are planned.
    pub fn add_soft_edge(&mut self, from: NodeId, to: NodeId) {
        if let Some(pos) = self.sorted_position(&self.nodes[from.0].soft_successors, to) {
            self.nodes[from.0].soft_successors.insert(pos, to);
        }
    }

    /// `from` should run after `to` when both are planned, unless that
    /// would close a cycle.
    pub fn add_should_edge(&mut self, from: NodeId, to: NodeId) {
        if let Some(pos) = self.sorted_position(&self.nodes[from.0].should_successors, to) {
            self.nodes[from.0].should_successors.insert(pos, to);
        }
    }

    pub fn remove_should_edge(&mut self, from: NodeId, to: NodeId) {
        self.nodes[from.0].should_successors.retain(|id| *id != to);
    }

    /// `finalizer` must run once `node` has run.
    pub fn add_finalizer(&mut self, node: NodeId, finalizer: NodeId) {
        if let Some(pos) = self.sorted_position(&self.nodes[node.0].finalizers, finalizer) {
            self.nodes[node.0].finalizers.insert(pos, finalizer);
        }
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.index.clear();
    }

    /// Insertion point for `id` in a path-sorted list, or `None` if it is
    /// already present.
    fn sorted_position(&self, list: &[NodeId], id: NodeId) -> Option<usize> {
        let path = self.path_of(id);
        match list.binary_search_by(|probe| self.path_of(*probe).cmp(path)) {
            Ok(_) => None,
            Err(pos) => Some(pos),
        }
    }
}

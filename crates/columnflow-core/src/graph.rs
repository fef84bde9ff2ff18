//! Statement dependency graph construction and traversal
//!
//! Builds forward and reverse edges between batch statements so they can be
//! resolved in dependency order and so downstream impact can be computed.

use indexmap::IndexSet;
use std::collections::{HashMap, HashSet, VecDeque};

/// Node identifier (statement or relation name)
pub type NodeId = String;

/// Result of ordering the graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ordering {
    /// Every node, parents before children where possible
    pub order: Vec<NodeId>,

    /// Nodes that sit on (or behind) a cycle, appended in insertion order
    pub cyclic: Vec<NodeId>,
}

/// Dependency graph with forward and reverse edges
#[derive(Debug, Clone, Default)]
pub struct StatementGraph {
    /// Forward edges: node -> nodes it reads from (parents)
    parents: HashMap<NodeId, Vec<NodeId>>,

    /// Reverse edges: node -> nodes that read from it (children)
    children: HashMap<NodeId, Vec<NodeId>>,

    /// All nodes in insertion order
    nodes: IndexSet<NodeId>,
}

impl StatementGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from `(node, relations it reads)` pairs
    ///
    /// Only reads of other nodes in the batch become edges; reads of base
    /// tables and self-reads are dropped.
    pub fn from_reads<I, R>(reads: I) -> Self
    where
        I: IntoIterator<Item = (NodeId, R)>,
        R: IntoIterator<Item = NodeId>,
    {
        let pairs: Vec<(NodeId, Vec<NodeId>)> = reads
            .into_iter()
            .map(|(node, deps)| (node, deps.into_iter().collect()))
            .collect();

        let mut graph = Self::new();
        for (node, _) in &pairs {
            graph.add_node(node.clone());
        }

        for (node, deps) in pairs {
            for dep in deps {
                if dep != node && graph.nodes.contains(&dep) {
                    graph.add_edge(&dep, &node);
                }
            }
        }

        graph
    }

    /// Add a node with no edges
    pub fn add_node(&mut self, node: impl Into<NodeId>) {
        self.nodes.insert(node.into());
    }

    /// Add an edge `parent -> child`, ignoring duplicates
    pub fn add_edge(&mut self, parent: &str, child: &str) {
        self.nodes.insert(parent.to_string());
        self.nodes.insert(child.to_string());

        let parents = self.parents.entry(child.to_string()).or_default();
        if !parents.iter().any(|p| p == parent) {
            parents.push(parent.to_string());
            self.children
                .entry(parent.to_string())
                .or_default()
                .push(child.to_string());
        }
    }

    /// Get all nodes in insertion order
    pub fn all_nodes(&self) -> Vec<&NodeId> {
        self.nodes.iter().collect()
    }

    /// Get immediate parents (dependencies) of a node
    pub fn parents(&self, node_id: &str) -> Vec<&NodeId> {
        self.parents
            .get(node_id)
            .map(|deps| deps.iter().collect())
            .unwrap_or_default()
    }

    /// Get immediate children (dependents) of a node
    pub fn children(&self, node_id: &str) -> Vec<&NodeId> {
        self.children
            .get(node_id)
            .map(|deps| deps.iter().collect())
            .unwrap_or_default()
    }

    /// Get all downstream nodes (transitive closure of children)
    ///
    /// This is the "blast radius" - every statement affected if this node changes.
    pub fn downstream(&self, node_id: &str) -> Vec<NodeId> {
        Self::walk(&self.children, node_id)
    }

    /// Get all upstream nodes (transitive closure of parents)
    pub fn upstream(&self, node_id: &str) -> Vec<NodeId> {
        Self::walk(&self.parents, node_id)
    }

    fn walk(edges: &HashMap<NodeId, Vec<NodeId>>, node_id: &str) -> Vec<NodeId> {
        let mut visited = HashSet::new();
        let mut queue: VecDeque<NodeId> = edges
            .get(node_id)
            .map(|next| next.iter().cloned().collect())
            .unwrap_or_default();
        let mut result = Vec::new();

        // BFS
        while let Some(current) = queue.pop_front() {
            if !visited.insert(current.clone()) {
                continue;
            }
            result.push(current.clone());

            if let Some(next) = edges.get(&current) {
                for node in next {
                    if !visited.contains(node) {
                        queue.push_back(node.clone());
                    }
                }
            }
        }

        result
    }

    /// Check if there's a path from source to target
    pub fn has_path(&self, source: &str, target: &str) -> bool {
        self.downstream(source).iter().any(|node| node == target)
    }

    /// Kahn's algorithm, stable with respect to insertion order
    ///
    /// Nodes left over because of a cycle are appended in insertion order and
    /// also listed in [`Ordering::cyclic`].
    pub fn topological_order(&self) -> Ordering {
        let mut in_degree: HashMap<&str, usize> = self
            .nodes
            .iter()
            .map(|node| (node.as_str(), self.parents.get(node).map_or(0, Vec::len)))
            .collect();

        let mut queue: VecDeque<&str> = self
            .nodes
            .iter()
            .filter(|node| in_degree.get(node.as_str()) == Some(&0))
            .map(String::as_str)
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());
        let mut placed = HashSet::new();

        while let Some(node) = queue.pop_front() {
            order.push(node.to_string());
            placed.insert(node);

            if let Some(children) = self.children.get(node) {
                for child in children {
                    if let Some(degree) = in_degree.get_mut(child.as_str()) {
                        *degree -= 1;
                        if *degree == 0 {
                            queue.push_back(child.as_str());
                        }
                    }
                }
            }
        }

        let cyclic: Vec<NodeId> = self
            .nodes
            .iter()
            .filter(|node| !placed.contains(node.as_str()))
            .cloned()
            .collect();
        order.extend(cyclic.iter().cloned());

        Ordering { order, cyclic }
    }
}

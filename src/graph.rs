//! Immutable adjacency index over a process chain.
//!
//! Uses BTreeMap/BTreeSet for deterministic iteration order: traversals,
//! topological order and reported cycles are identical across runs.

use std::collections::{btree_set, BTreeMap, BTreeSet};

use crate::types::{ChainViolation, NodeId, ProcessChain, ProcessEdge, ProcessNode};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    InProgress,
    Done,
}

/// Adjacency index borrowed from a chain.
///
/// Building the index checks reference integrity: unique node and edge ids,
/// edges naming existing nodes, and edges carrying a part the source outputs
/// and the target accepts.
#[derive(Debug, Clone)]
pub struct ChainIndex<'a> {
    nodes: BTreeMap<&'a NodeId, &'a ProcessNode>,
    /// Source -> outgoing edges, in canonical edge order.
    outgoing: BTreeMap<&'a NodeId, Vec<&'a ProcessEdge>>,
    /// Target -> incoming edges, in canonical edge order.
    incoming: BTreeMap<&'a NodeId, Vec<&'a ProcessEdge>>,
}

impl<'a> ChainIndex<'a> {
    /// Index a chain.
    pub fn build(chain: &'a ProcessChain) -> Result<Self, ChainViolation> {
        let mut nodes = BTreeMap::new();
        for node in &chain.nodes {
            if nodes.insert(&node.id, node).is_some() {
                return Err(ChainViolation::DuplicateNode(node.id.clone()));
            }
        }

        let mut edge_ids = BTreeSet::new();
        let mut outgoing: BTreeMap<&NodeId, Vec<&ProcessEdge>> = BTreeMap::new();
        let mut incoming: BTreeMap<&NodeId, Vec<&ProcessEdge>> = BTreeMap::new();

        for edge in &chain.edges {
            if !edge_ids.insert(edge.id.as_str()) {
                return Err(ChainViolation::DuplicateEdge(edge.id.clone()));
            }

            let source = nodes.get(&edge.source_node_id).ok_or_else(|| {
                ChainViolation::UnknownNode {
                    edge_id: edge.id.clone(),
                    node_id: edge.source_node_id.clone(),
                }
            })?;
            let target = nodes.get(&edge.target_node_id).ok_or_else(|| {
                ChainViolation::UnknownNode {
                    edge_id: edge.id.clone(),
                    node_id: edge.target_node_id.clone(),
                }
            })?;

            if source.output(&edge.part_code).is_none() {
                return Err(ChainViolation::UnknownOutput {
                    edge_id: edge.id.clone(),
                    node_id: source.id.clone(),
                    part_code: edge.part_code.clone(),
                });
            }
            if target.input(&edge.part_code).is_none() {
                return Err(ChainViolation::UnknownInput {
                    edge_id: edge.id.clone(),
                    node_id: target.id.clone(),
                    part_code: edge.part_code.clone(),
                });
            }

            outgoing.entry(&edge.source_node_id).or_default().push(edge);
            incoming.entry(&edge.target_node_id).or_default().push(edge);
        }

        for edges in outgoing.values_mut().chain(incoming.values_mut()) {
            edges.sort_by(|a, b| a.canonical_cmp(b));
        }

        Ok(Self {
            nodes,
            outgoing,
            incoming,
        })
    }

    /// Look up a node.
    pub fn node(&self, id: &NodeId) -> Option<&'a ProcessNode> {
        self.nodes.get(id).copied()
    }

    /// All nodes, in id order.
    pub fn nodes(&self) -> impl Iterator<Item = &'a ProcessNode> + '_ {
        self.nodes.values().copied()
    }

    /// Number of nodes.
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Edges leaving a node.
    pub fn outgoing(&self, id: &NodeId) -> &[&'a ProcessEdge] {
        self.outgoing.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Edges entering a node.
    pub fn incoming(&self, id: &NodeId) -> &[&'a ProcessEdge] {
        self.incoming.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Edges leaving a node that carry a given part.
    pub fn consumers(&self, id: &NodeId, part_code: &str) -> Vec<&'a ProcessEdge> {
        self.outgoing(id)
            .iter()
            .filter(|e| e.part_code == part_code)
            .copied()
            .collect()
    }

    /// Distinct successor nodes, in id order.
    pub fn successors(&self, id: &NodeId) -> BTreeSet<&'a NodeId> {
        self.outgoing(id).iter().map(|e| &e.target_node_id).collect()
    }

    /// Nodes fed by no other node in the chain, in id order.
    pub fn entry_nodes(&self) -> Vec<&'a NodeId> {
        self.nodes
            .keys()
            .filter(|id| self.incoming(id).is_empty())
            .copied()
            .collect()
    }

    /// Nodes feeding no other node in the chain, in id order.
    pub fn leaf_nodes(&self) -> Vec<&'a NodeId> {
        self.nodes
            .keys()
            .filter(|id| self.outgoing(id).is_empty())
            .copied()
            .collect()
    }

    /// Find a directed cycle by depth-first search with an in-progress marker.
    ///
    /// The search keeps an explicit stack of frames, so chain length is not
    /// bounded by the call stack. Returns the cycle's nodes with the first
    /// node repeated at the end.
    pub fn find_cycle(&self) -> Option<Vec<NodeId>> {
        let mut marks: BTreeMap<&NodeId, Mark> = BTreeMap::new();
        // One frame per node on the current path, with its unvisited successors.
        let mut frames: Vec<(&'a NodeId, btree_set::IntoIter<&'a NodeId>)> = Vec::new();

        for root in self.nodes.keys() {
            if marks.contains_key(root) {
                continue;
            }
            marks.insert(*root, Mark::InProgress);
            frames.push((*root, self.successors(root).into_iter()));

            while let Some((id, successors)) = frames.last_mut() {
                let id = *id;
                let Some(next) = successors.next() else {
                    frames.pop();
                    marks.insert(id, Mark::Done);
                    continue;
                };
                match marks.get(next) {
                    Some(Mark::InProgress) => {
                        // Back edge: the cycle is the path suffix starting at `next`.
                        let start = frames.iter().position(|(n, _)| *n == next).unwrap_or(0);
                        let mut cycle: Vec<NodeId> =
                            frames[start..].iter().map(|(n, _)| (*n).clone()).collect();
                        cycle.push(next.clone());
                        return Some(cycle);
                    }
                    Some(Mark::Done) => {}
                    None => {
                        marks.insert(next, Mark::InProgress);
                        frames.push((next, self.successors(next).into_iter()));
                    }
                }
            }
        }
        None
    }

    /// Topological order of all nodes (Kahn's algorithm, ties by id).
    pub fn topological_order(&self) -> Result<Vec<&'a NodeId>, ChainViolation> {
        let mut in_degree: BTreeMap<&NodeId, usize> = self
            .nodes
            .keys()
            .map(|id| (*id, self.incoming(id).len()))
            .collect();
        let mut ready: BTreeSet<&NodeId> = in_degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(id, _)| *id)
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(id) = ready.pop_first() {
            order.push(id);
            for edge in self.outgoing(id) {
                if let Some(d) = in_degree.get_mut(&edge.target_node_id) {
                    *d -= 1;
                    if *d == 0 {
                        ready.insert(&edge.target_node_id);
                    }
                }
            }
        }

        if order.len() < self.nodes.len() {
            let path = self.find_cycle().unwrap_or_default();
            return Err(ChainViolation::CycleDetected { path });
        }
        Ok(order)
    }

    /// Longest entry-to-leaf path, in edges.
    pub fn depth(&self) -> Result<usize, ChainViolation> {
        let order = self.topological_order()?;
        let mut dist: BTreeMap<&NodeId, usize> = BTreeMap::new();
        let mut deepest = 0;

        for id in order {
            let d = dist.get(id).copied().unwrap_or(0);
            deepest = deepest.max(d);
            for next in self.successors(id) {
                let entry = dist.entry(next).or_insert(0);
                *entry = (*entry).max(d + 1);
            }
        }
        Ok(deepest)
    }
}

/// Share an output's weight across the edges consuming it.
///
/// Shares follow the pinned `flow_kg` when every edge pins a positive flow,
/// otherwise the weight is split equally.
pub fn split_flow(total_kg: f64, edges: &[&ProcessEdge]) -> Vec<f64> {
    if edges.is_empty() {
        return Vec::new();
    }
    let pins: Option<Vec<f64>> = edges
        .iter()
        .map(|e| e.flow_kg.filter(|f| f.is_finite() && *f > 0.0))
        .collect();
    match pins {
        Some(pins) => {
            let sum: f64 = pins.iter().sum();
            pins.iter().map(|p| total_kg * p / sum).collect()
        }
        None => vec![total_kg / edges.len() as f64; edges.len()],
    }
}

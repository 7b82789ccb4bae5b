//! Process chain: the whole production plan.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::edge::ProcessEdge;
use super::node::{NodeId, ProcessNode, ProcessingEntity};
use super::stage::StageType;
use super::validation::ValidationResult;
use crate::canonical::{canonical_hash_hex, quantize};

/// A multi-stage processing plan.
///
/// Constructed wholesale by the caller and never mutated by the engine.
/// Every engine call takes the chain by reference and returns new values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessChain {
    /// Plan version, as tracked by the caller.
    pub version: u32,
    /// Processing steps.
    pub nodes: Vec<ProcessNode>,
    /// Material flows between steps.
    pub edges: Vec<ProcessEdge>,
    /// Creation time of the plan.
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    /// Last modification time of the plan.
    #[serde(default = "Utc::now")]
    pub last_modified: DateTime<Utc>,
}

impl ProcessChain {
    /// Create a chain stamped with the current time.
    pub fn new(version: u32, nodes: Vec<ProcessNode>, edges: Vec<ProcessEdge>) -> Self {
        let now = Utc::now();
        Self {
            version,
            nodes,
            edges,
            created_at: now,
            last_modified: now,
        }
    }

    /// Number of nodes.
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Number of edges.
    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    /// Deterministic fingerprint of the plan's semantic content.
    ///
    /// Timestamps and cached validation fields are excluded; floats are
    /// quantized. Node and edge order in the chain does not matter.
    pub fn fingerprint(&self) -> String {
        let mut nodes: Vec<NodeView<'_>> = self.nodes.iter().map(NodeView::from).collect();
        nodes.sort_by(|a, b| a.id.cmp(b.id));

        let mut edges: Vec<&ProcessEdge> = self.edges.iter().collect();
        edges.sort_by(|a, b| a.canonical_cmp(b));
        let edges: Vec<EdgeView<'_>> = edges.into_iter().map(EdgeView::from).collect();

        canonical_hash_hex(&ChainView {
            version: self.version,
            nodes,
            edges,
        })
    }

    /// Copy of this chain whose cached node validation fields reflect `result`.
    ///
    /// The error is attributed to every node it names; when it names no node
    /// all nodes carry it.
    pub fn annotated(&self, result: &ValidationResult) -> Self {
        let mut chain = self.clone();
        for node in &mut chain.nodes {
            node.validation_errors.clear();
            node.is_valid = true;
        }

        if let Some(error) = &result.error {
            let named: Vec<&NodeId> = result.offending_nodes.iter().collect();
            for node in &mut chain.nodes {
                if named.is_empty() || named.contains(&&node.id) {
                    node.is_valid = false;
                    node.validation_errors.push(error.clone());
                }
            }
        }
        chain
    }
}

#[derive(Serialize)]
struct ChainView<'a> {
    version: u32,
    nodes: Vec<NodeView<'a>>,
    edges: Vec<EdgeView<'a>>,
}

#[derive(Serialize)]
struct NodeView<'a> {
    id: &'a NodeId,
    stage_type: StageType,
    entity: &'a ProcessingEntity,
    inputs: Vec<(&'a str, Option<i64>)>,
    outputs: Vec<(&'a str, i64, bool, bool)>,
    variable_cost_per_kg: i64,
    fixed_cost_per_execution: i64,
}

impl<'a> From<&'a ProcessNode> for NodeView<'a> {
    fn from(node: &'a ProcessNode) -> Self {
        Self {
            id: &node.id,
            stage_type: node.stage_type,
            entity: &node.entity,
            inputs: node
                .inputs
                .iter()
                .map(|i| (i.part_code.as_str(), i.required_kg.map(quantize)))
                .collect(),
            outputs: node
                .outputs
                .iter()
                .map(|o| {
                    (
                        o.part_code.as_str(),
                        quantize(o.yield_pct),
                        o.is_by_product,
                        o.is_processable(),
                    )
                })
                .collect(),
            variable_cost_per_kg: quantize(node.variable_cost_per_kg),
            fixed_cost_per_execution: quantize(node.fixed_cost_per_execution),
        }
    }
}

#[derive(Serialize)]
struct EdgeView<'a> {
    id: &'a str,
    source: &'a NodeId,
    target: &'a NodeId,
    part_code: &'a str,
    flow_kg: Option<i64>,
}

impl<'a> From<&'a ProcessEdge> for EdgeView<'a> {
    fn from(edge: &'a ProcessEdge) -> Self {
        Self {
            id: &edge.id,
            source: &edge.source_node_id,
            target: &edge.target_node_id,
            part_code: &edge.part_code,
            flow_kg: edge.flow_kg.map(quantize),
        }
    }
}

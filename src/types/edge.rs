//! Material flow edges.

use serde::{Deserialize, Serialize};

use super::node::NodeId;

/// Material flow from one node's output to another node's input.
///
/// Edges are compared with [`ProcessEdge::canonical_cmp`]: (source, target, part_code, id).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessEdge {
    /// Edge identifier.
    pub id: String,
    /// Producing node.
    pub source_node_id: NodeId,
    /// Consuming node.
    pub target_node_id: NodeId,
    /// Part code carried by the edge.
    pub part_code: String,
    /// Pinned absolute weight of the flow.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow_kg: Option<f64>,
}

impl ProcessEdge {
    /// Create a new edge with no pinned flow.
    pub fn new(
        id: impl Into<String>,
        source: impl Into<NodeId>,
        target: impl Into<NodeId>,
        part_code: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source_node_id: source.into(),
            target_node_id: target.into(),
            part_code: part_code.into(),
            flow_kg: None,
        }
    }

    /// Pin the absolute flow weight.
    pub fn with_flow_kg(mut self, flow_kg: f64) -> Self {
        self.flow_kg = Some(flow_kg);
        self
    }

    /// Canonical ordering used wherever edges are serialized or hashed.
    pub fn canonical_cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.sort_key().cmp(&other.sort_key())
    }

    fn sort_key(&self) -> (&NodeId, &NodeId, &str, &str) {
        (&self.source_node_id, &self.target_node_id, &self.part_code, &self.id)
    }
}

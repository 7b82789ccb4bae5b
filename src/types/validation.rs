//! Validation outcomes.

use serde::{Deserialize, Serialize};

use super::node::NodeId;
use super::stage::StageType;

/// Reason a chain is not a legal production plan.
///
/// Structural violations (references, cycles, depth, stage ordering) and
/// mass-balance violations (yields, by-products, pinned flows) are both fatal
/// to the chain as a whole.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ChainViolation {
    /// Two nodes share an id.
    #[error("Duplicate node id '{0}'")]
    DuplicateNode(NodeId),

    /// Two edges share an id.
    #[error("Duplicate edge id '{0}'")]
    DuplicateEdge(String),

    /// An edge names a node that is not in the chain.
    #[error("Edge '{edge_id}' references unknown node '{node_id}'")]
    UnknownNode {
        /// Offending edge.
        edge_id: String,
        /// Missing node.
        node_id: NodeId,
    },

    /// An edge carries a part its source does not produce.
    #[error("Edge '{edge_id}' carries '{part_code}', which node '{node_id}' does not output")]
    UnknownOutput {
        /// Offending edge.
        edge_id: String,
        /// Source node.
        node_id: NodeId,
        /// Carried part.
        part_code: String,
    },

    /// An edge carries a part its target does not accept.
    #[error("Edge '{edge_id}' carries '{part_code}', which node '{node_id}' does not accept as input")]
    UnknownInput {
        /// Offending edge.
        edge_id: String,
        /// Target node.
        node_id: NodeId,
        /// Carried part.
        part_code: String,
    },

    /// The chain contains a directed cycle.
    #[error("Cycle detected: {}", format_path(.path))]
    CycleDetected {
        /// Nodes on the cycle, first node repeated at the end.
        path: Vec<NodeId>,
    },

    /// The longest entry-to-leaf path is too long.
    #[error("Chain depth {depth} exceeds maximum of {max}")]
    DepthExceeded {
        /// Computed depth in edges.
        depth: usize,
        /// Configured limit.
        max: usize,
    },

    /// A non-processable by-product feeds a downstream node.
    #[error("Non-processable by-product '{part_code}' cannot feed node '{target_node}' (edge '{edge_id}')")]
    NonProcessableByProduct {
        /// Offending edge.
        edge_id: String,
        /// By-product part code.
        part_code: String,
        /// Producing node.
        source_node: NodeId,
        /// Consuming node.
        target_node: NodeId,
    },

    /// An output declares a yield outside 0-100 or a non-finite yield.
    #[error("Node '{node_id}' output '{part_code}' has invalid yield {yield_pct}%")]
    InvalidYield {
        /// Offending node.
        node_id: NodeId,
        /// Offending output.
        part_code: String,
        /// Declared yield.
        yield_pct: f64,
    },

    /// A node has no output able to carry its cost.
    #[error("Node '{0}' declares no output with positive yield")]
    NoPositiveYield(NodeId),

    /// A node's outputs claim more than its input.
    #[error("Node '{node_id}' outputs exceed 100% ({total_pct}%)")]
    YieldsExceed100 {
        /// Offending node.
        node_id: NodeId,
        /// Sum of declared yields.
        total_pct: f64,
    },

    /// A pinned edge flow disagrees with the yield-implied flow.
    #[error("Mass balance mismatch on edge '{edge_id}': pinned {pinned_kg} kg, yield-implied {implied_kg} kg")]
    FlowMismatch {
        /// Offending edge.
        edge_id: String,
        /// Producing node.
        source_node: NodeId,
        /// Pinned flow.
        pinned_kg: f64,
        /// Flow implied by the source node's yield.
        implied_kg: f64,
    },

    /// An edge violates stage ordering.
    #[error("Invalid transition from {from} to {to} (edge '{edge_id}')")]
    InvalidTransition {
        /// Offending edge.
        edge_id: String,
        /// Source stage.
        from: StageType,
        /// Target stage.
        to: StageType,
        /// Producing node.
        source_node: NodeId,
        /// Consuming node.
        target_node: NodeId,
    },
}

fn format_path(path: &[NodeId]) -> String {
    path.iter()
        .map(NodeId::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}

impl ChainViolation {
    /// Whether this is a mass-balance violation rather than a structural one.
    pub fn is_mass_balance(&self) -> bool {
        matches!(
            self,
            Self::NonProcessableByProduct { .. }
                | Self::InvalidYield { .. }
                | Self::NoPositiveYield(_)
                | Self::YieldsExceed100 { .. }
                | Self::FlowMismatch { .. }
        )
    }

    /// Nodes named by the violation.
    pub fn offending_nodes(&self) -> Vec<NodeId> {
        match self {
            Self::DuplicateNode(id) | Self::NoPositiveYield(id) => vec![id.clone()],
            Self::DuplicateEdge(_) | Self::DepthExceeded { .. } => Vec::new(),
            Self::UnknownNode { .. } => Vec::new(),
            Self::UnknownOutput { node_id, .. }
            | Self::UnknownInput { node_id, .. }
            | Self::InvalidYield { node_id, .. }
            | Self::YieldsExceed100 { node_id, .. } => vec![node_id.clone()],
            Self::CycleDetected { path } => {
                let mut nodes = path.clone();
                nodes.sort();
                nodes.dedup();
                nodes
            }
            Self::NonProcessableByProduct { source_node, target_node, .. }
            | Self::InvalidTransition { source_node, target_node, .. } => {
                vec![source_node.clone(), target_node.clone()]
            }
            Self::FlowMismatch { source_node, .. } => vec![source_node.clone()],
        }
    }
}

/// Outcome of validating a chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Whether the chain is a legal production plan.
    pub valid: bool,
    /// Description of the first violation found.
    pub error: Option<String>,
    /// Nodes named by the violation.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub offending_nodes: Vec<NodeId>,
}

impl ValidationResult {
    /// A passing result.
    pub fn valid() -> Self {
        Self {
            valid: true,
            error: None,
            offending_nodes: Vec::new(),
        }
    }

    /// A failing result.
    pub fn invalid(error: String, offending_nodes: Vec<NodeId>) -> Self {
        Self {
            valid: false,
            error: Some(error),
            offending_nodes,
        }
    }
}

impl From<Result<(), ChainViolation>> for ValidationResult {
    fn from(outcome: Result<(), ChainViolation>) -> Self {
        match outcome {
            Ok(()) => Self::valid(),
            Err(violation) => Self::invalid(violation.to_string(), violation.offending_nodes()),
        }
    }
}

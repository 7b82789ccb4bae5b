//! Chain execution results.

use serde::{Deserialize, Serialize};

use super::allocation::NodeAllocationResult;
use super::node::NodeId;
use crate::ENGINE_SCHEMA_VERSION;

/// Discriminator of the cost method implemented by the chain executor.
pub const CHAIN_COST_METHOD: &str = "chain_yield_proportional";

/// Contribution of one node to a final output's accumulated cost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostContribution {
    /// Contributing node.
    pub node_id: NodeId,
    /// Contributed cost.
    pub cost_eur: f64,
    /// Contributed cost in currency minor units (exact).
    pub cost_minor: i64,
}

/// A leaf output of the chain: never consumed by another node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalOutput {
    /// Output part code.
    pub part_code: String,
    /// Node that produced the output.
    pub node_id: NodeId,
    /// Physical weight of the output.
    pub weight_kg: f64,
    /// Accumulated cost of every stage the material passed through.
    pub allocated_cost_eur: f64,
    /// Accumulated cost in currency minor units (exact).
    pub allocated_cost_minor: i64,
    /// Whether the output is a by-product.
    pub is_by_product: bool,
    /// Nodes from the chain entry to the producing node.
    pub path: Vec<NodeId>,
    /// Per-node breakdown of `allocated_cost_minor`, in path-independent id order.
    pub cost_breakdown: Vec<CostContribution>,
}

impl FinalOutput {
    /// Contribution of a given node, if any.
    pub fn contribution(&self, node_id: &NodeId) -> Option<&CostContribution> {
        self.cost_breakdown.iter().find(|c| &c.node_id == node_id)
    }
}

/// Execution record of one node, for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeExecution {
    /// Upstream cost carried into the node.
    pub inherited_cost_eur: f64,
    /// Upstream cost in currency minor units (exact).
    pub inherited_cost_minor: i64,
    /// The node's own allocation.
    #[serde(flatten)]
    pub allocation: NodeAllocationResult,
}

/// Result of executing a chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainExecutionResult {
    /// Whether execution completed.
    pub success: bool,
    /// Always [`CHAIN_COST_METHOD`].
    pub cost_method: String,
    /// Result layout version, [`ENGINE_SCHEMA_VERSION`] when produced here.
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    /// Why execution was refused, when it was.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Fingerprint of the executed chain.
    pub chain_fingerprint: String,
    /// Caller batch reference, echoed for traceability.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_ref: Option<String>,
    /// Weight fed into the chain.
    pub input_kg: f64,
    /// Costed leaf outputs. Empty on failure.
    pub final_outputs: Vec<FinalOutput>,
    /// Per-node records in topological order. Empty on failure.
    pub node_results: Vec<NodeExecution>,
}

fn default_schema_version() -> String {
    ENGINE_SCHEMA_VERSION.to_string()
}

impl ChainExecutionResult {
    /// A refused execution. Carries no partial results.
    pub fn failure(
        error: String,
        chain_fingerprint: String,
        batch_ref: Option<String>,
        input_kg: f64,
    ) -> Self {
        Self {
            success: false,
            cost_method: CHAIN_COST_METHOD.to_string(),
            schema_version: default_schema_version(),
            error: Some(error),
            chain_fingerprint,
            batch_ref,
            input_kg,
            final_outputs: Vec::new(),
            node_results: Vec::new(),
        }
    }

    /// Find a final output by part code.
    pub fn final_output(&self, part_code: &str) -> Option<&FinalOutput> {
        self.final_outputs.iter().find(|o| o.part_code == part_code)
    }

    /// Sum of final output costs in minor units, saturating at the `i64` range.
    pub fn total_cost_minor(&self) -> i64 {
        self.final_outputs
            .iter()
            .fold(0i64, |acc, o| acc.saturating_add(o.allocated_cost_minor))
    }

    /// Sum of final output weights.
    pub fn total_output_kg(&self) -> f64 {
        self.final_outputs.iter().map(|o| o.weight_kg).sum()
    }

    /// Execution record of a node.
    pub fn node_result(&self, node_id: &NodeId) -> Option<&NodeExecution> {
        self.node_results
            .iter()
            .find(|r| &r.allocation.node_id == node_id)
    }
}

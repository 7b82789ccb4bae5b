//! Per-node allocation results.

use serde::{Deserialize, Serialize};

use super::node::NodeId;

/// Cost and weight assigned to one output of a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputAllocation {
    /// Output part code.
    pub part_code: String,
    /// Allocated share of the node's processing cost.
    pub allocated_cost_eur: f64,
    /// Allocated share in currency minor units (exact).
    pub allocated_cost_minor: i64,
    /// Physical weight of the output.
    pub weight_kg: f64,
    /// Declared yield, in percent.
    pub yield_pct: f64,
    /// Whether the output is a by-product.
    pub is_by_product: bool,
}

/// Result of running the allocator on one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeAllocationResult {
    /// Allocated node.
    pub node_id: NodeId,
    /// Weight that entered the node.
    pub input_kg: f64,
    /// Allocation per declared output, in declaration order.
    pub outputs: Vec<OutputAllocation>,
    /// Processing cost incurred by the node.
    pub total_cost_eur: f64,
    /// Processing cost in currency minor units (exact).
    pub total_cost_minor: i64,
    /// Unmodeled loss, in percent.
    pub loss_pct: f64,
    /// Unmodeled loss, in kilograms.
    pub loss_kg: f64,
}

impl NodeAllocationResult {
    /// Sum of allocated output costs in minor units, saturating at the `i64` range.
    pub fn allocated_minor(&self) -> i64 {
        self.outputs
            .iter()
            .fold(0i64, |acc, o| acc.saturating_add(o.allocated_cost_minor))
    }

    /// Sum of allocated output costs.
    pub fn allocated_eur(&self) -> f64 {
        self.outputs.iter().map(|o| o.allocated_cost_eur).sum()
    }

    /// Difference between incurred and allocated cost. Zero when reconciled.
    pub fn reconciliation_error_minor(&self) -> i64 {
        self.total_cost_minor.saturating_sub(self.allocated_minor())
    }

    /// Sum of output weights.
    pub fn output_kg(&self) -> f64 {
        self.outputs.iter().map(|o| o.weight_kg).sum()
    }

    /// Look up an output allocation by part code.
    pub fn output(&self, part_code: &str) -> Option<&OutputAllocation> {
        self.outputs.iter().find(|o| o.part_code == part_code)
    }
}

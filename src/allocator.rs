//! Node cost allocator.
//!
//! Splits one node's processing cost across its declared outputs in
//! proportion to each output's share of the total output weight. Loss
//! carries no cost.

use tracing::debug;

use crate::currency::{apportion, Currency};
use crate::policy::CostingPolicyV1;
use crate::types::{NodeAllocationResult, NodeId, OutputAllocation, ProcessNode};

/// Error type for allocator operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AllocationError {
    /// Input weight is negative or not a number.
    #[error("Invalid input weight for node '{node_id}': {input_kg} kg")]
    InvalidInputWeight {
        /// Allocated node.
        node_id: NodeId,
        /// Offending weight.
        input_kg: f64,
    },
    /// Cost model produced a cost that is not finite or does not fit in minor units.
    #[error("Node '{0}' has a cost model outside the representable range")]
    InvalidCostModel(NodeId),
    /// No output can carry the node's cost.
    #[error("Node '{0}' declares no output with positive yield")]
    NoPositiveYield(NodeId),
}

/// Yield-proportional cost allocator for a single node.
///
/// All currency math runs on integer minor units, so the allocated shares
/// always sum to the node's cost exactly.
#[derive(Debug, Clone, Copy)]
pub struct NodeCostAllocator {
    currency: Currency,
    tolerance_eur: f64,
}

impl NodeCostAllocator {
    /// Create an allocator for the given policy.
    pub fn new(policy: &CostingPolicyV1) -> Self {
        Self {
            currency: policy.currency(),
            tolerance_eur: policy.reconciliation_tolerance_eur,
        }
    }

    /// Working currency.
    pub fn currency(&self) -> Currency {
        self.currency
    }

    /// Allocate `node`'s processing cost for `input_kg` kilograms of input.
    pub fn allocate(
        &self,
        node: &ProcessNode,
        input_kg: f64,
    ) -> Result<NodeAllocationResult, AllocationError> {
        if !input_kg.is_finite() || input_kg < 0.0 {
            return Err(AllocationError::InvalidInputWeight {
                node_id: node.id.clone(),
                input_kg,
            });
        }

        let total_cost_minor = self
            .currency
            .checked_to_minor(node.processing_cost(input_kg))
            .ok_or_else(|| AllocationError::InvalidCostModel(node.id.clone()))?;

        let shares = self.cost_shares(node, total_cost_minor)?;

        let outputs: Vec<OutputAllocation> = node
            .outputs
            .iter()
            .zip(shares)
            .map(|(output, minor)| OutputAllocation {
                part_code: output.part_code.clone(),
                allocated_cost_eur: self.currency.to_major(minor),
                allocated_cost_minor: minor,
                weight_kg: input_kg * output.yield_pct / 100.0,
                yield_pct: output.yield_pct,
                is_by_product: output.is_by_product,
            })
            .collect();

        let loss_pct = node.loss_pct();
        let result = NodeAllocationResult {
            node_id: node.id.clone(),
            input_kg,
            outputs,
            total_cost_eur: self.currency.to_major(total_cost_minor),
            total_cost_minor,
            loss_pct,
            loss_kg: input_kg * loss_pct / 100.0,
        };

        debug!(
            node_id = %node.id,
            input_kg,
            total_cost_eur = result.total_cost_eur,
            loss_pct,
            outputs = result.outputs.len(),
            "Allocated node cost"
        );

        Ok(result)
    }

    /// Split `total_minor` across `node`'s outputs by yield share.
    ///
    /// Every output of a node receives the same fraction of the input, so the
    /// yield share equals the weight share and is defined even at zero input.
    pub fn cost_shares(
        &self,
        node: &ProcessNode,
        total_minor: i64,
    ) -> Result<Vec<i64>, AllocationError> {
        let weights: Vec<f64> = node.outputs.iter().map(|o| o.yield_pct).collect();
        if !weights.iter().any(|w| w.is_finite() && *w > 0.0) {
            return Err(AllocationError::NoPositiveYield(node.id.clone()));
        }
        Ok(apportion(total_minor, &weights))
    }

    /// Whether an allocation reconciles within the policy tolerance.
    pub fn is_reconciled(&self, result: &NodeAllocationResult) -> bool {
        (result.allocated_eur() - result.total_cost_eur).abs() <= self.tolerance_eur
    }
}

impl Default for NodeCostAllocator {
    fn default() -> Self {
        Self::new(&CostingPolicyV1::default())
    }
}

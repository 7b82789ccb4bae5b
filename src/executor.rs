//! Chain executor.
//!
//! Propagates weight and accumulated cost from a chain's entry nodes through
//! every node to every leaf output (`chain_yield_proportional`).
//!
//! ## Algorithm
//!
//! 1. Validate the chain and order its nodes topologically
//! 2. Assign the input weight to the entry node(s)
//! 3. For each node in order:
//!    - Allocate the node's own processing cost across its outputs
//!    - Split the inherited upstream cost across the same outputs, per
//!      contributing node, with the same exact apportionment
//!    - Forward consumed outputs (weight + cost) to downstream nodes
//!    - Record unconsumed outputs as final outputs
//! 4. Return final outputs and per-node records, or nothing at all on failure
//!
//! Every currency amount is tracked in integer minor units per contributing
//! node, so the final outputs' costs sum to the nodes' costs exactly and
//! each final output carries an exact per-node breakdown.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::allocator::{AllocationError, NodeCostAllocator};
use crate::currency::apportion;
use crate::graph::split_flow;
use crate::policy::{CostingPolicyV1, EntrySplit};
use crate::types::{
    ChainExecutionResult, ChainViolation, CostContribution, FinalOutput, NodeExecution, NodeId,
    ProcessChain, ProcessNode, CHAIN_COST_METHOD,
};
use crate::validator::{GraphValidator, ValidatedChain};
use crate::ENGINE_SCHEMA_VERSION;

/// Error type for executor operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExecutionError {
    /// The chain failed validation.
    #[error("Invalid chain: {0}")]
    InvalidChain(#[from] ChainViolation),
    /// Input weight is not a positive number.
    #[error("Input weight must be positive, got {0} kg")]
    InvalidInputWeight(f64),
    /// The policy refuses chains with several entry nodes.
    #[error("Chain has {0} entry nodes; supply explicit entry weights")]
    MultipleEntries(usize),
    /// An entry weight names a node that is not an entry node.
    #[error("Node '{0}' is not an entry node of the chain")]
    UnknownEntry(NodeId),
    /// An entry node has no weight assigned.
    #[error("No input weight assigned to entry node '{0}'")]
    MissingEntry(NodeId),
    /// A pinned input disagrees with the propagated weight.
    #[error("Pinned input '{part_code}' of node '{node_id}' requires {required_kg} kg, chain delivers {actual_kg} kg")]
    PinnedInputMismatch {
        /// Consuming node.
        node_id: NodeId,
        /// Pinned input.
        part_code: String,
        /// Pinned weight.
        required_kg: f64,
        /// Propagated weight.
        actual_kg: f64,
    },
    /// A pinned edge flow disagrees with the propagated weight.
    #[error("Pinned flow on edge '{edge_id}' is {pinned_kg} kg, chain delivers {actual_kg} kg")]
    FlowMismatch {
        /// Offending edge.
        edge_id: String,
        /// Pinned weight.
        pinned_kg: f64,
        /// Propagated weight.
        actual_kg: f64,
    },
    /// Allocation failed at a node.
    #[error("Allocation failed: {0}")]
    Allocation(#[from] AllocationError),
    /// Accumulated cost no longer fits in minor units.
    #[error("Accumulated cost at node '{0}' exceeds the representable range")]
    CostOverflow(NodeId),
}

/// Sum minor-unit amounts, failing instead of wrapping.
fn checked_total<'a>(amounts: impl IntoIterator<Item = &'a i64>) -> Option<i64> {
    amounts
        .into_iter()
        .try_fold(0i64, |acc, minor| acc.checked_add(*minor))
}

/// Add `minor` to the amount held for `node_id`.
fn credit(costs: &mut BTreeMap<NodeId, i64>, node_id: &NodeId, minor: i64) -> Option<()> {
    let slot = costs.entry(node_id.clone()).or_insert(0);
    *slot = slot.checked_add(minor)?;
    Some(())
}

/// Material and cost arriving at a node.
#[derive(Debug, Default)]
struct Inflow {
    kg: f64,
    by_part: BTreeMap<String, f64>,
    /// Accumulated cost per contributing node, in minor units.
    cost: BTreeMap<NodeId, i64>,
    /// Path of the heaviest incoming stream.
    path: Vec<NodeId>,
    path_kg: f64,
}

impl Inflow {
    fn entry(node: &ProcessNode, kg: f64) -> Self {
        let pins: Option<Vec<f64>> = node.inputs.iter().map(|i| i.required_kg).collect();
        let shares: Vec<f64> = match pins {
            Some(pins) if pins.iter().sum::<f64>() > 0.0 => {
                let sum: f64 = pins.iter().sum();
                pins.iter().map(|p| kg * p / sum).collect()
            }
            _ => vec![kg / node.inputs.len().max(1) as f64; node.inputs.len()],
        };

        Self {
            kg,
            by_part: node
                .inputs
                .iter()
                .map(|i| i.part_code.clone())
                .zip(shares)
                .collect(),
            cost: BTreeMap::new(),
            path: Vec::new(),
            path_kg: 0.0,
        }
    }

    fn receive(
        &mut self,
        part_code: &str,
        kg: f64,
        cost: BTreeMap<NodeId, i64>,
        path: &[NodeId],
    ) -> Option<()> {
        self.kg += kg;
        *self.by_part.entry(part_code.to_string()).or_insert(0.0) += kg;
        for (node_id, minor) in &cost {
            credit(&mut self.cost, node_id, *minor)?;
        }
        if self.path.is_empty() || kg > self.path_kg {
            self.path = path.to_vec();
            self.path_kg = kg;
        }
        Some(())
    }
}

/// Executor for process chains.
///
/// Holds no mutable state: one executor can run any number of chains,
/// concurrently, from any number of threads.
#[derive(Debug, Clone, Default)]
pub struct ChainExecutor {
    policy: CostingPolicyV1,
    validator: GraphValidator,
    allocator: NodeCostAllocator,
    batch_ref: Option<String>,
}

impl ChainExecutor {
    /// Create an executor for the given policy.
    pub fn new(policy: CostingPolicyV1) -> Self {
        Self {
            validator: GraphValidator::new(policy.clone()),
            allocator: NodeCostAllocator::new(&policy),
            policy,
            batch_ref: None,
        }
    }

    /// Echo a caller batch reference in every result.
    pub fn with_batch_ref(mut self, batch_ref: impl Into<String>) -> Self {
        self.batch_ref = Some(batch_ref.into());
        self
    }

    /// Get the policy.
    pub fn policy(&self) -> &CostingPolicyV1 {
        &self.policy
    }

    /// Execute a chain on `input_kg` kilograms, returning the value-shaped outcome.
    pub fn execute(&self, chain: &ProcessChain, input_kg: f64) -> ChainExecutionResult {
        self.try_execute(chain, input_kg)
            .unwrap_or_else(|e| self.failure(chain, input_kg, e))
    }

    /// Execute a chain with explicit per-entry-node weights.
    pub fn execute_with_entry_weights(
        &self,
        chain: &ProcessChain,
        entry_weights: &BTreeMap<NodeId, f64>,
    ) -> ChainExecutionResult {
        let input_kg: f64 = entry_weights.values().sum();
        self.try_execute_with_entry_weights(chain, entry_weights)
            .unwrap_or_else(|e| self.failure(chain, input_kg, e))
    }

    /// Execute a chain on `input_kg` kilograms.
    ///
    /// A single entry node receives the whole weight. Several entry nodes are
    /// handled according to the policy's [`EntrySplit`].
    pub fn try_execute(
        &self,
        chain: &ProcessChain,
        input_kg: f64,
    ) -> Result<ChainExecutionResult, ExecutionError> {
        if !input_kg.is_finite() || input_kg <= 0.0 {
            return Err(ExecutionError::InvalidInputWeight(input_kg));
        }
        let validated = self.validator.check(chain)?;

        let entries = validated.index().entry_nodes();
        if entries.len() > 1 {
            match self.policy.entry_split {
                EntrySplit::Reject => return Err(ExecutionError::MultipleEntries(entries.len())),
                EntrySplit::Even => warn!(
                    chain_version = chain.version,
                    entries = entries.len(),
                    input_kg,
                    "Splitting input evenly across entry nodes"
                ),
            }
        }

        let share = input_kg / entries.len().max(1) as f64;
        let weights: BTreeMap<NodeId, f64> =
            entries.into_iter().map(|id| (id.clone(), share)).collect();
        self.run(&validated, &weights)
    }

    /// Execute a chain with explicit per-entry-node weights.
    ///
    /// Every entry node must be named, and only entry nodes may be named.
    pub fn try_execute_with_entry_weights(
        &self,
        chain: &ProcessChain,
        entry_weights: &BTreeMap<NodeId, f64>,
    ) -> Result<ChainExecutionResult, ExecutionError> {
        let total: f64 = entry_weights.values().sum();
        if entry_weights
            .values()
            .any(|kg| !kg.is_finite() || *kg < 0.0)
            || !total.is_finite()
            || total <= 0.0
        {
            return Err(ExecutionError::InvalidInputWeight(total));
        }

        let validated = self.validator.check(chain)?;
        let entries = validated.index().entry_nodes();
        for id in entry_weights.keys() {
            if !entries.contains(&id) {
                return Err(ExecutionError::UnknownEntry(id.clone()));
            }
        }
        for id in &entries {
            if !entry_weights.contains_key(*id) {
                return Err(ExecutionError::MissingEntry((*id).clone()));
            }
        }

        self.run(&validated, entry_weights)
    }

    /// Execute an already validated chain.
    pub fn run(
        &self,
        validated: &ValidatedChain<'_>,
        entry_weights: &BTreeMap<NodeId, f64>,
    ) -> Result<ChainExecutionResult, ExecutionError> {
        let chain = validated.chain();
        let index = validated.index();
        let currency = self.allocator.currency();

        let mut inflows: BTreeMap<NodeId, Inflow> = BTreeMap::new();
        for (id, kg) in entry_weights {
            if let Some(node) = index.node(id) {
                inflows.insert(id.clone(), Inflow::entry(node, *kg));
            }
        }

        let mut final_outputs = Vec::new();
        let mut node_results = Vec::with_capacity(index.num_nodes());
        let mut incurred_minor: i64 = 0;

        for id in validated.topological_order() {
            let Some(node) = index.node(id) else { continue };
            let mut inflow = inflows.remove(*id).unwrap_or_default();
            self.check_pinned_inputs(node, &inflow)?;

            let allocation = self.allocator.allocate(node, inflow.kg)?;
            let overflow = || ExecutionError::CostOverflow(node.id.clone());
            let inherited_minor = checked_total(inflow.cost.values()).ok_or_else(overflow)?;
            incurred_minor = incurred_minor
                .checked_add(allocation.total_cost_minor)
                .ok_or_else(overflow)?;

            // Per output: contributing node -> minor units.
            let mut contributions: Vec<BTreeMap<NodeId, i64>> =
                vec![BTreeMap::new(); node.outputs.len()];
            for (contributor, minor) in &inflow.cost {
                let shares = self.allocator.cost_shares(node, *minor)?;
                for (slot, share) in contributions.iter_mut().zip(shares) {
                    if share != 0 {
                        slot.insert(contributor.clone(), share);
                    }
                }
            }
            for (slot, output) in contributions.iter_mut().zip(&allocation.outputs) {
                if output.allocated_cost_minor != 0 {
                    credit(slot, &node.id, output.allocated_cost_minor).ok_or_else(overflow)?;
                }
            }

            inflow.path.push(node.id.clone());
            let path = inflow.path;

            for ((output, allocated), contribution) in node
                .outputs
                .iter()
                .zip(&allocation.outputs)
                .zip(contributions)
            {
                let consumers = index.consumers(id, &output.part_code);
                if consumers.is_empty() {
                    let cost_minor = checked_total(contribution.values()).ok_or_else(overflow)?;
                    final_outputs.push(FinalOutput {
                        part_code: output.part_code.clone(),
                        node_id: node.id.clone(),
                        weight_kg: allocated.weight_kg,
                        allocated_cost_eur: currency.to_major(cost_minor),
                        allocated_cost_minor: cost_minor,
                        is_by_product: output.is_by_product,
                        path: path.clone(),
                        cost_breakdown: contribution
                            .into_iter()
                            .map(|(node_id, minor)| CostContribution {
                                node_id,
                                cost_eur: currency.to_major(minor),
                                cost_minor: minor,
                            })
                            .collect(),
                    });
                    continue;
                }

                let flows = split_flow(allocated.weight_kg, &consumers);
                for (edge, kg) in consumers.iter().zip(&flows) {
                    if let Some(pinned) = edge.flow_kg {
                        if !self.policy.flows_agree(pinned, *kg) {
                            return Err(ExecutionError::FlowMismatch {
                                edge_id: edge.id.clone(),
                                pinned_kg: pinned,
                                actual_kg: *kg,
                            });
                        }
                    }
                }

                let mut edge_costs: Vec<BTreeMap<NodeId, i64>> =
                    vec![BTreeMap::new(); consumers.len()];
                for (contributor, minor) in &contribution {
                    for (slot, share) in edge_costs.iter_mut().zip(apportion(*minor, &flows)) {
                        slot.insert(contributor.clone(), share);
                    }
                }

                for ((edge, kg), cost) in consumers.iter().zip(flows).zip(edge_costs) {
                    inflows
                        .entry(edge.target_node_id.clone())
                        .or_default()
                        .receive(&edge.part_code, kg, cost, &path)
                        .ok_or_else(|| ExecutionError::CostOverflow(edge.target_node_id.clone()))?;
                }
            }

            debug!(
                node_id = %node.id,
                entity = %node.entity,
                input_kg = allocation.input_kg,
                own_cost_eur = allocation.total_cost_eur,
                inherited_cost_eur = currency.to_major(inherited_minor),
                "Executed node"
            );

            node_results.push(NodeExecution {
                inherited_cost_eur: currency.to_major(inherited_minor),
                inherited_cost_minor: inherited_minor,
                allocation,
            });
        }

        let result = ChainExecutionResult {
            success: true,
            cost_method: CHAIN_COST_METHOD.to_string(),
            schema_version: ENGINE_SCHEMA_VERSION.to_string(),
            error: None,
            chain_fingerprint: chain.fingerprint(),
            batch_ref: self.batch_ref.clone(),
            input_kg: entry_weights.values().sum(),
            final_outputs,
            node_results,
        };

        info!(
            chain_version = chain.version,
            batch_ref = self.batch_ref.as_deref().unwrap_or(""),
            nodes = result.node_results.len(),
            final_outputs = result.final_outputs.len(),
            input_kg = result.input_kg,
            total_cost_eur = currency.to_major(incurred_minor),
            "Chain executed"
        );

        Ok(result)
    }

    fn check_pinned_inputs(&self, node: &ProcessNode, inflow: &Inflow) -> Result<(), ExecutionError> {
        for input in &node.inputs {
            let Some(required_kg) = input.required_kg else { continue };
            let actual_kg = inflow.by_part.get(&input.part_code).copied().unwrap_or(0.0);
            if !self.policy.flows_agree(actual_kg, required_kg) {
                return Err(ExecutionError::PinnedInputMismatch {
                    node_id: node.id.clone(),
                    part_code: input.part_code.clone(),
                    required_kg,
                    actual_kg,
                });
            }
        }
        Ok(())
    }

    fn failure(&self, chain: &ProcessChain, input_kg: f64, error: ExecutionError) -> ChainExecutionResult {
        warn!(
            chain_version = chain.version,
            input_kg,
            error = %error,
            "Chain execution refused"
        );
        ChainExecutionResult::failure(
            error.to_string(),
            chain.fingerprint(),
            self.batch_ref.clone(),
            input_kg,
        )
    }
}

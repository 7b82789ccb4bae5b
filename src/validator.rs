//! Graph validator.
//!
//! Decides whether a chain is a legal production plan. Checks run in a fixed
//! order and the first failure wins:
//!
//! 0. Reference integrity (unique ids, edges naming existing nodes and parts)
//! 1. Acyclicity
//! 2. Depth bound
//! 3. By-product processability
//! 4. Per-node mass balance (yields, pinned flows)
//! 5. Stage ordering
//!
//! A chain that passes is wrapped in a [`ValidatedChain`], the only input the
//! executor's core accepts.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::canonical::quantize;
use crate::graph::{split_flow, ChainIndex};
use crate::policy::CostingPolicyV1;
use crate::types::{ChainViolation, NodeId, ProcessChain, ValidationResult};

/// A chain that passed every validation check.
///
/// Can only be obtained from [`GraphValidator::check`].
#[derive(Debug, Clone)]
pub struct ValidatedChain<'a> {
    chain: &'a ProcessChain,
    index: ChainIndex<'a>,
    order: Vec<&'a NodeId>,
    depth: usize,
}

impl<'a> ValidatedChain<'a> {
    /// The underlying chain.
    pub fn chain(&self) -> &'a ProcessChain {
        self.chain
    }

    /// Adjacency index of the chain.
    pub fn index(&self) -> &ChainIndex<'a> {
        &self.index
    }

    /// Nodes in topological order.
    pub fn topological_order(&self) -> &[&'a NodeId] {
        &self.order
    }

    /// Longest entry-to-leaf path, in edges.
    pub fn depth(&self) -> usize {
        self.depth
    }
}

/// Validator for process chains.
#[derive(Debug, Clone, Default)]
pub struct GraphValidator {
    policy: CostingPolicyV1,
}

impl GraphValidator {
    /// Create a validator for the given policy.
    pub fn new(policy: CostingPolicyV1) -> Self {
        Self { policy }
    }

    /// Get the policy.
    pub fn policy(&self) -> &CostingPolicyV1 {
        &self.policy
    }

    /// Validate a chain, returning the value-shaped outcome.
    pub fn validate(&self, chain: &ProcessChain) -> ValidationResult {
        self.check(chain).map(|_| ()).into()
    }

    /// Validate a chain, returning the first violation or a [`ValidatedChain`].
    pub fn check<'a>(&self, chain: &'a ProcessChain) -> Result<ValidatedChain<'a>, ChainViolation> {
        let outcome = self.run_checks(chain);
        match &outcome {
            Ok(validated) => debug!(
                chain_version = chain.version,
                nodes = chain.num_nodes(),
                edges = chain.num_edges(),
                depth = validated.depth,
                "Chain validated"
            ),
            Err(violation) => warn!(
                chain_version = chain.version,
                mass_balance = violation.is_mass_balance(),
                error = %violation,
                "Chain rejected"
            ),
        }
        outcome
    }

    fn run_checks<'a>(&self, chain: &'a ProcessChain) -> Result<ValidatedChain<'a>, ChainViolation> {
        let index = ChainIndex::build(chain)?;

        if let Some(path) = index.find_cycle() {
            return Err(ChainViolation::CycleDetected { path });
        }

        let order = index.topological_order()?;
        let depth = index.depth()?;
        if depth > self.policy.max_chain_depth {
            return Err(ChainViolation::DepthExceeded {
                depth,
                max: self.policy.max_chain_depth,
            });
        }

        check_by_products(chain, &index)?;
        check_yields(&index)?;
        self.check_pinned_flows(&index, &order)?;
        check_stage_order(chain, &index)?;

        Ok(ValidatedChain {
            chain,
            index,
            order,
            depth,
        })
    }

    /// Compare pinned edge flows against statically derivable flows.
    ///
    /// A node's input weight is known when every input pins `required_kg`, or
    /// when every incoming edge's flow is known. An edge's flow is known from
    /// its source's known weight, or failing that from its own pin.
    fn check_pinned_flows(
        &self,
        index: &ChainIndex<'_>,
        order: &[&NodeId],
    ) -> Result<(), ChainViolation> {
        let mut edge_kg: BTreeMap<&str, f64> = BTreeMap::new();

        for id in order {
            let Some(node) = index.node(id) else { continue };

            let incoming = index.incoming(id);
            let known = node.pinned_input_kg().or_else(|| {
                if incoming.is_empty() {
                    return None;
                }
                incoming
                    .iter()
                    .map(|e| edge_kg.get(e.id.as_str()).copied())
                    .sum::<Option<f64>>()
            });

            for output in &node.outputs {
                let consumers = index.consumers(id, &output.part_code);
                match known {
                    Some(kg) => {
                        let implied = kg * output.yield_pct / 100.0;
                        let shares = split_flow(implied, &consumers);
                        for (edge, share) in consumers.iter().zip(shares) {
                            if let Some(pinned) = edge.flow_kg {
                                if !self.policy.flows_agree(pinned, share) {
                                    return Err(ChainViolation::FlowMismatch {
                                        edge_id: edge.id.clone(),
                                        source_node: node.id.clone(),
                                        pinned_kg: pinned,
                                        implied_kg: share,
                                    });
                                }
                            }
                            edge_kg.insert(edge.id.as_str(), share);
                        }
                    }
                    None => {
                        for edge in &consumers {
                            if let Some(pinned) = edge.flow_kg {
                                edge_kg.insert(edge.id.as_str(), pinned);
                            }
                        }
                    }
                }
            }
        }

        debug!(derived_edges = edge_kg.len(), "Pinned flows checked");
        Ok(())
    }
}

fn check_by_products(chain: &ProcessChain, index: &ChainIndex<'_>) -> Result<(), ChainViolation> {
    for edge in &chain.edges {
        let output = index
            .node(&edge.source_node_id)
            .and_then(|n| n.output(&edge.part_code));
        if let Some(output) = output {
            if !output.is_processable() {
                return Err(ChainViolation::NonProcessableByProduct {
                    edge_id: edge.id.clone(),
                    part_code: edge.part_code.clone(),
                    source_node: edge.source_node_id.clone(),
                    target_node: edge.target_node_id.clone(),
                });
            }
        }
    }
    Ok(())
}

fn check_yields(index: &ChainIndex<'_>) -> Result<(), ChainViolation> {
    for node in index.nodes() {
        for output in &node.outputs {
            if !output.yield_pct.is_finite() || output.yield_pct < 0.0 || output.yield_pct > 100.0 {
                return Err(ChainViolation::InvalidYield {
                    node_id: node.id.clone(),
                    part_code: output.part_code.clone(),
                    yield_pct: output.yield_pct,
                });
            }
        }

        // Compare quantized so 35 + 43 + 10.4 + 11.6 counts as exactly 100.
        let total_pct = node.total_yield_pct();
        if quantize(total_pct) > quantize(100.0) {
            return Err(ChainViolation::YieldsExceed100 {
                node_id: node.id.clone(),
                total_pct,
            });
        }

        if !node.outputs.iter().any(|o| o.yield_pct > 0.0) {
            return Err(ChainViolation::NoPositiveYield(node.id.clone()));
        }
    }
    Ok(())
}

fn check_stage_order(chain: &ProcessChain, index: &ChainIndex<'_>) -> Result<(), ChainViolation> {
    for edge in &chain.edges {
        let (Some(source), Some(target)) = (
            index.node(&edge.source_node_id),
            index.node(&edge.target_node_id),
        ) else {
            continue;
        };
        if !source.stage_type.can_feed(target.stage_type) {
            return Err(ChainViolation::InvalidTransition {
                edge_id: edge.id.clone(),
                from: source.stage_type,
                to: target.stage_type,
                source_node: source.id.clone(),
                target_node: target.id.clone(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NodeInput, NodeOutput, ProcessEdge, ProcessNode, StageType};

    fn primal() -> ProcessNode {
        ProcessNode::new("primal", StageType::PrimalCut)
            .with_input(NodeInput::new("carcass"))
            .with_output(NodeOutput::product("breast_cap", 35.0))
            .with_output(NodeOutput::product("legs", 43.0))
            .with_output(NodeOutput::product("wings", 10.4))
            .with_output(NodeOutput::by_product("back", 11.6, false))
            .with_costs(0.10, 50.0)
    }

    fn filet() -> ProcessNode {
        ProcessNode::new("filet", StageType::SubCut)
            .with_input(NodeInput::new("breast_cap"))
            .with_output(NodeOutput::product("filet", 85.0))
            .with_output(NodeOutput::by_product("breast_rest", 13.0, false))
            .with_costs(0.50, 25.0)
    }

    fn scenario() -> ProcessChain {
        ProcessChain::new(
            1,
            vec![primal(), filet()],
            vec![ProcessEdge::new("e1", "primal", "filet", "breast_cap")],
        )
    }

    #[test]
    fn test_scenario_is_valid() {
        let result = GraphValidator::default().validate(&scenario());
        assert!(result.valid, "{:?}", result.error);
    }

    #[test]
    fn test_yields_summing_to_100_pass() {
        // 35 + 43 + 10.4 + 11.6 is not exactly 100.0 in binary floating point
        let chain = scenario();
        let validated = GraphValidator::default().check(&chain).unwrap();
        assert_eq!(validated.depth(), 1);
        assert_eq!(validated.topological_order().len(), 2);
    }

    #[test]
    fn test_overfull_node_rejected() {
        let mut chain = scenario();
        chain.nodes[1].outputs[1].yield_pct = 20.0;
        let result = GraphValidator::default().validate(&chain);
        assert!(!result.valid);
        assert!(result.error.unwrap().contains("outputs exceed 100%"));
    }

    #[test]
    fn test_pinned_flow_uses_pinned_entry_input() {
        let mut chain = scenario();
        chain.nodes[0].inputs[0].required_kg = Some(1728.0);

        chain.edges[0].flow_kg = Some(604.8);
        assert!(GraphValidator::default().validate(&chain).valid);

        chain.edges[0].flow_kg = Some(650.0);
        let err = GraphValidator::default().check(&chain).unwrap_err();
        assert!(matches!(err, ChainViolation::FlowMismatch { .. }));
    }

    #[test]
    fn test_pinned_flow_without_known_source_is_unchecked() {
        let mut chain = scenario();
        chain.edges[0].flow_kg = Some(12_345.0);
        assert!(GraphValidator::default().validate(&chain).valid);
    }

    #[test]
    fn test_pins_propagate_downstream() {
        let mut chain = scenario();
        let pack = ProcessNode::new("pack", StageType::Packaging)
            .with_input(NodeInput::new("filet"))
            .with_output(NodeOutput::product("filet_tray", 100.0));
        chain.nodes.push(pack);
        // Unknown entry weight; pinned breast_cap flow anchors the filet node.
        chain.edges[0].flow_kg = Some(604.8);
        chain.edges.push(ProcessEdge::new("e2", "filet", "pack", "filet").with_flow_kg(514.08));
        assert!(GraphValidator::default().validate(&chain).valid);

        chain.edges[1].flow_kg = Some(400.0);
        assert!(!GraphValidator::default().validate(&chain).valid);
    }

    #[test]
    fn test_check_order_cycle_before_yields() {
        // Both cyclic and overfull: the cycle is reported.
        let a = ProcessNode::new("a", StageType::SubCut)
            .with_input(NodeInput::new("x"))
            .with_output(NodeOutput::product("y", 80.0))
            .with_output(NodeOutput::product("z", 80.0));
        let b = ProcessNode::new("b", StageType::SubCut)
            .with_input(NodeInput::new("y"))
            .with_output(NodeOutput::product("x", 50.0));
        let chain = ProcessChain::new(
            1,
            vec![a, b],
            vec![
                ProcessEdge::new("e1", "a", "b", "y"),
                ProcessEdge::new("e2", "b", "a", "x"),
            ],
        );
        let result = GraphValidator::default().validate(&chain);
        assert!(result.error.unwrap().starts_with("Cycle detected"));
    }

    #[test]
    fn test_negative_yield_rejected() {
        let mut chain = scenario();
        chain.nodes[0].outputs[2].yield_pct = -1.0;
        let err = GraphValidator::default().check(&chain).unwrap_err();
        assert!(matches!(err, ChainViolation::InvalidYield { .. }));
        assert!(err.is_mass_balance());
    }
}

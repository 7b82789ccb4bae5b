//! Golden tests for the process-chain engine.
//!
//! These tests pin down the published scenarios, determinism, and the
//! fail-fast contract of the chain executor.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;

use process_chain::{
    allocate, execute, validate, ChainExecutor, CostingPolicyV1, EntrySplit, ExecutionError,
    GraphValidator, NodeId, NodeInput, NodeOutput, ProcessChain, ProcessEdge, ProcessNode,
    ProcessingEntity, StageType, CHAIN_COST_METHOD, ENGINE_SCHEMA_VERSION,
};

// ─────────────────────────────────────────────────────────────────────────────
// Test Helpers
// ─────────────────────────────────────────────────────────────────────────────

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

/// Whole bird → primal cut → filet cut.
fn breast_chain() -> ProcessChain {
    ProcessChain::new(
        1,
        vec![primal(), filet()],
        vec![ProcessEdge::new("e1", "primal", "filet", "breast_cap")],
    )
}

fn sub_cut(id: &str, input: &str, output: &str, yield_pct: f64) -> ProcessNode {
    ProcessNode::new(id, StageType::SubCut)
        .with_input(NodeInput::new(input))
        .with_output(NodeOutput::product(output, yield_pct))
        .with_costs(0.05, 1.0)
}

/// `n` sub-cut nodes in a line: depth `n - 1`.
fn linear_chain(n: usize) -> ProcessChain {
    let nodes = (0..n)
        .map(|i| {
            sub_cut(
                &format!("n{:02}", i),
                &format!("p{}", i),
                &format!("p{}", i + 1),
                90.0,
            )
        })
        .collect();
    let edges = (1..n)
        .map(|i| {
            ProcessEdge::new(
                format!("e{}", i),
                format!("n{:02}", i - 1),
                format!("n{:02}", i),
                format!("p{}", i),
            )
        })
        .collect();
    ProcessChain::new(1, nodes, edges)
}

/// Two primal lines merging into one filet node.
fn two_entry_chain() -> ProcessChain {
    let line = |id: &str| {
        ProcessNode::new(id, StageType::PrimalCut)
            .with_input(NodeInput::new("carcass"))
            .with_output(NodeOutput::product("breast_cap", 50.0))
            .with_output(NodeOutput::product("legs", 50.0))
            .with_costs(0.10, 10.0)
    };
    let merge = ProcessNode::new("merge", StageType::SubCut)
        .with_input(NodeInput::new("breast_cap"))
        .with_output(NodeOutput::product("filet", 90.0))
        .with_costs(0.20, 5.0);

    ProcessChain::new(
        1,
        vec![line("line_a"), line("line_b"), merge],
        vec![
            ProcessEdge::new("ea", "line_a", "merge", "breast_cap"),
            ProcessEdge::new("eb", "line_b", "merge", "breast_cap"),
        ],
    )
}

fn node_total_minor(result: &process_chain::ChainExecutionResult) -> i64 {
    result
        .node_results
        .iter()
        .map(|r| r.allocation.total_cost_minor)
        .sum()
}

// ─────────────────────────────────────────────────────────────────────────────
// SCENARIO TESTS
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_filet_allocation_scenario() {
    let result = allocate(&filet(), 100.0).unwrap();

    assert!((result.total_cost_eur - 75.0).abs() < 1e-9);
    assert!((result.loss_pct - 2.0).abs() < 1e-9);
    assert!((result.loss_kg - 2.0).abs() < 1e-9);

    let filet = result.output("filet").unwrap();
    assert!((filet.weight_kg - 85.0).abs() < 1e-9);
    assert!((filet.allocated_cost_eur - 65.05).abs() < 0.01);

    let rest = result.output("breast_rest").unwrap();
    assert!((rest.weight_kg - 13.0).abs() < 1e-9);
    assert!((rest.allocated_cost_eur - 9.95).abs() < 0.01);

    assert!((result.allocated_eur() - result.total_cost_eur).abs() <= 0.01);
}

#[test]
fn test_breast_chain_scenario() {
    let result = execute(&breast_chain(), 1728.0);
    assert!(result.success, "{:?}", result.error);

    let filet = result.final_output("filet").unwrap();
    assert!((filet.weight_kg - 514.08).abs() < 1e-6);
    let legs = result.final_output("legs").unwrap();
    assert!((legs.weight_kg - 743.04).abs() < 1e-6);
    let wings = result.final_output("wings").unwrap();
    assert!((wings.weight_kg - 179.712).abs() < 1e-6);

    // primal: 0.10 * 1728 + 50 = 222.80, of which breast_cap carries 35%
    let primal = result.node_result(&NodeId::from("primal")).unwrap();
    assert_eq!(primal.allocation.total_cost_minor, 22_280);
    assert_eq!(
        primal.allocation.output("breast_cap").unwrap().allocated_cost_minor,
        7_798
    );

    // filet: 0.50 * 604.8 + 25 = 327.40 own cost plus 77.98 inherited
    let filet_node = result.node_result(&NodeId::from("filet")).unwrap();
    assert!((filet_node.allocation.input_kg - 604.8).abs() < 1e-9);
    assert_eq!(filet_node.allocation.total_cost_minor, 32_740);
    assert_eq!(filet_node.inherited_cost_minor, 7_798);

    // 77.98 * 85/98 + 327.40 * 85/98 = 67.64 + 283.98
    assert_eq!(filet.allocated_cost_minor, 35_162);
    assert!((filet.allocated_cost_eur - 351.62).abs() < 1e-9);
}

#[test]
fn test_cost_method_discriminator() {
    let ok = execute(&breast_chain(), 1728.0);
    let failed = execute(&breast_chain(), -1.0);
    assert_eq!(ok.cost_method, "chain_yield_proportional");
    assert_eq!(failed.cost_method, CHAIN_COST_METHOD);

    let json = serde_json::to_value(&ok).unwrap();
    assert_eq!(json["cost_method"], "chain_yield_proportional");
    assert_eq!(json["schema_version"], ENGINE_SCHEMA_VERSION);
}

// ─────────────────────────────────────────────────────────────────────────────
// CONSERVATION TESTS
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_cost_is_conserved_exactly() {
    let result = execute(&breast_chain(), 1728.0);
    assert_eq!(result.total_cost_minor(), node_total_minor(&result));
    assert_eq!(result.total_cost_minor(), 22_280 + 32_740);
}

#[test]
fn test_mass_is_conserved() {
    let result = execute(&breast_chain(), 1728.0);
    let lost: f64 = result.node_results.iter().map(|r| r.allocation.loss_kg).sum();
    assert!((result.total_output_kg() + lost - 1728.0).abs() < 1e-6);
}

#[test]
fn test_breakdown_sums_per_node() {
    let result = execute(&breast_chain(), 1728.0);

    for node in &result.node_results {
        let contributed: i64 = result
            .final_outputs
            .iter()
            .filter_map(|o| o.contribution(&node.allocation.node_id))
            .map(|c| c.cost_minor)
            .sum();
        assert_eq!(contributed, node.allocation.total_cost_minor);
    }
    for output in &result.final_outputs {
        let sum: i64 = output.cost_breakdown.iter().map(|c| c.cost_minor).sum();
        assert_eq!(sum, output.allocated_cost_minor);
    }
}

#[test]
fn test_fan_out_splits_weight_and_cost() {
    let mut chain = breast_chain();
    chain.nodes.push(
        ProcessNode::new("filet_b", StageType::SubCut)
            .with_input(NodeInput::new("breast_cap"))
            .with_output(NodeOutput::product("strips", 95.0))
            .with_costs(0.30, 10.0),
    );
    chain
        .edges
        .push(ProcessEdge::new("e2", "primal", "filet_b", "breast_cap"));

    let result = execute(&chain, 1728.0);
    assert!(result.success, "{:?}", result.error);

    let a = result.node_result(&NodeId::from("filet")).unwrap();
    let b = result.node_result(&NodeId::from("filet_b")).unwrap();
    assert!((a.allocation.input_kg - 302.4).abs() < 1e-9);
    assert!((b.allocation.input_kg - 302.4).abs() < 1e-9);
    assert_eq!(a.inherited_cost_minor + b.inherited_cost_minor, 7_798);
    assert_eq!(result.total_cost_minor(), node_total_minor(&result));
}

#[test]
fn test_pinned_fan_out_follows_pins() {
    let mut chain = breast_chain();
    chain.nodes.push(
        ProcessNode::new("filet_b", StageType::SubCut)
            .with_input(NodeInput::new("breast_cap"))
            .with_output(NodeOutput::product("strips", 95.0)),
    );
    chain.edges[0].flow_kg = Some(453.6);
    chain.edges.push(
        ProcessEdge::new("e2", "primal", "filet_b", "breast_cap").with_flow_kg(151.2),
    );

    let result = execute(&chain, 1728.0);
    assert!(result.success, "{:?}", result.error);
    let a = result.node_result(&NodeId::from("filet")).unwrap();
    assert!((a.allocation.input_kg - 453.6).abs() < 1e-9);

    // Same pins, wrong input weight: the pins no longer match the chain.
    let result = execute(&chain, 1000.0);
    assert!(!result.success);
    assert!(result.final_outputs.is_empty());
}

// ─────────────────────────────────────────────────────────────────────────────
// VALIDATION TESTS
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_packaging_feeds_nothing() {
    let pack = ProcessNode::new("pack", StageType::Packaging)
        .with_input(NodeInput::new("filet"))
        .with_output(NodeOutput::product("tray", 100.0));
    let trim = ProcessNode::new("trim", StageType::SubCut)
        .with_input(NodeInput::new("tray"))
        .with_output(NodeOutput::product("trimmed", 90.0));
    let chain = ProcessChain::new(
        1,
        vec![pack, trim],
        vec![ProcessEdge::new("e1", "pack", "trim", "tray")],
    );

    let result = validate(&chain);
    assert!(!result.valid);
    assert!(result
        .error
        .unwrap()
        .contains("Invalid transition from packaging to sub_cut"));
}

#[test]
fn test_stages_never_run_backwards() {
    let sub = sub_cut("sub", "breast_cap", "carcass", 90.0);
    let prim = ProcessNode::new("prim", StageType::PrimalCut)
        .with_input(NodeInput::new("carcass"))
        .with_output(NodeOutput::product("legs", 40.0));
    let chain = ProcessChain::new(
        1,
        vec![sub, prim],
        vec![ProcessEdge::new("e1", "sub", "prim", "carcass")],
    );

    let result = validate(&chain);
    assert!(result
        .error
        .unwrap()
        .contains("Invalid transition from sub_cut to primal_cut"));
}

#[test]
fn test_cycle_is_rejected() {
    let chain = ProcessChain::new(
        1,
        vec![sub_cut("a", "x", "y", 90.0), sub_cut("b", "y", "x", 90.0)],
        vec![
            ProcessEdge::new("e1", "a", "b", "y"),
            ProcessEdge::new("e2", "b", "a", "x"),
        ],
    );

    let result = validate(&chain);
    assert!(!result.valid);
    assert!(result.error.unwrap().contains("Cycle detected"));
    assert_eq!(
        result.offending_nodes,
        vec![NodeId::from("a"), NodeId::from("b")]
    );
}

#[test]
fn test_depth_limit() {
    assert!(validate(&linear_chain(11)).valid);

    let result = validate(&linear_chain(12));
    assert!(!result.valid);
    let error = result.error.unwrap();
    assert!(error.contains("exceeds maximum"));
    assert!(error.contains("11"));

    let relaxed = GraphValidator::new(CostingPolicyV1::default().with_max_chain_depth(11));
    assert!(relaxed.validate(&linear_chain(12)).valid);
}

#[test]
fn test_negative_tolerance_in_policy_file_is_clamped() {
    let policy: CostingPolicyV1 =
        serde_json::from_str(r#"{ "version": "costing_policy_v1", "mass_balance_tolerance": -0.5 }"#)
            .unwrap();
    assert_eq!(policy.mass_balance_tolerance, 0.0);

    let mut chain = breast_chain();
    chain.nodes[0].inputs[0].required_kg = Some(1728.0);

    assert!(GraphValidator::new(policy.clone()).validate(&chain).valid);
    let result = ChainExecutor::new(policy).execute(&chain, 1728.0);
    assert!(result.success, "{:?}", result.error);
}

#[test]
fn test_very_long_chain_is_rejected_by_depth() {
    let chain = linear_chain(50_000);

    let result = validate(&chain);
    assert!(!result.valid);
    let error = result.error.unwrap();
    assert!(error.contains("exceeds maximum"));
    assert!(error.contains("49999"));

    let executed = execute(&chain, 1_000.0);
    assert!(!executed.success);
    assert!(executed.final_outputs.is_empty());
}

#[test]
fn test_non_processable_by_product_cannot_feed() {
    let mut chain = breast_chain();
    chain.nodes.push(
        ProcessNode::new("render", StageType::SubCut)
            .with_input(NodeInput::new("back"))
            .with_output(NodeOutput::product("meal", 60.0)),
    );
    chain
        .edges
        .push(ProcessEdge::new("e2", "primal", "render", "back"));

    let result = validate(&chain);
    assert!(!result.valid);
    assert!(result.error.unwrap().contains("'back'"));

    // The same by-product marked processable is accepted.
    chain.nodes[0].outputs[3].processable_byproduct = Some(true);
    assert!(validate(&chain).valid);
}

#[test]
fn test_annotated_marks_offending_nodes() {
    let mut chain = breast_chain();
    chain.nodes[1].outputs[1].yield_pct = 20.0;

    let result = validate(&chain);
    let annotated = chain.annotated(&result);

    assert!(annotated.nodes[0].is_valid);
    assert!(!annotated.nodes[1].is_valid);
    assert_eq!(annotated.nodes[1].validation_errors.len(), 1);
    // The input chain is untouched.
    assert!(chain.nodes[1].is_valid);
}

// ─────────────────────────────────────────────────────────────────────────────
// FAIL-FAST TESTS
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_invalid_chain_yields_no_partial_results() {
    let mut chain = breast_chain();
    chain.nodes[0].outputs[1].yield_pct = 60.0;

    let result = execute(&chain, 1728.0);
    assert!(!result.success);
    assert!(result.error.unwrap().contains("outputs exceed 100%"));
    assert!(result.final_outputs.is_empty());
    assert!(result.node_results.is_empty());
}

#[test]
fn test_non_positive_input_is_rejected() {
    for kg in [-1728.0, 0.0, f64::INFINITY] {
        let result = execute(&breast_chain(), kg);
        assert!(!result.success);
        assert!(result.final_outputs.is_empty());
    }

    let err = ChainExecutor::default()
        .try_execute(&breast_chain(), -5.0)
        .unwrap_err();
    assert_eq!(err, ExecutionError::InvalidInputWeight(-5.0));
}

// ─────────────────────────────────────────────────────────────────────────────
// MULTI-ENTRY TESTS
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_multi_entry_even_split() {
    let result = execute(&two_entry_chain(), 1000.0);
    assert!(result.success, "{:?}", result.error);

    for id in ["line_a", "line_b"] {
        let node = result.node_result(&NodeId::from(id)).unwrap();
        assert!((node.allocation.input_kg - 500.0).abs() < 1e-9);
    }
    let merge = result.node_result(&NodeId::from("merge")).unwrap();
    assert!((merge.allocation.input_kg - 500.0).abs() < 1e-9);
    assert_eq!(result.total_cost_minor(), node_total_minor(&result));
}

#[test]
fn test_multi_entry_rejected_by_policy() {
    let executor =
        ChainExecutor::new(CostingPolicyV1::default().with_entry_split(EntrySplit::Reject));
    let err = executor.try_execute(&two_entry_chain(), 1000.0).unwrap_err();
    assert_eq!(err, ExecutionError::MultipleEntries(2));
}

#[test]
fn test_explicit_entry_weights() {
    let executor = ChainExecutor::default();
    let weights: BTreeMap<NodeId, f64> =
        [(NodeId::from("line_a"), 200.0), (NodeId::from("line_b"), 800.0)]
            .into_iter()
            .collect();

    let result = executor.execute_with_entry_weights(&two_entry_chain(), &weights);
    assert!(result.success, "{:?}", result.error);
    assert!((result.input_kg - 1000.0).abs() < 1e-9);

    let filet = result.final_output("filet").unwrap();
    assert!((filet.weight_kg - 450.0).abs() < 1e-9);
    // Lineage follows the heavier stream.
    assert_eq!(filet.path, vec![NodeId::from("line_b"), NodeId::from("merge")]);
    assert!(filet.contribution(&NodeId::from("line_a")).is_some());

    let mut missing = weights.clone();
    missing.remove(&NodeId::from("line_b"));
    assert_eq!(
        executor
            .try_execute_with_entry_weights(&two_entry_chain(), &missing)
            .unwrap_err(),
        ExecutionError::MissingEntry(NodeId::from("line_b"))
    );

    let mut extra = weights;
    extra.insert(NodeId::from("merge"), 10.0);
    assert_eq!(
        executor
            .try_execute_with_entry_weights(&two_entry_chain(), &extra)
            .unwrap_err(),
        ExecutionError::UnknownEntry(NodeId::from("merge"))
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// DETERMINISM TESTS
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_execution_determinism() {
    let chain = breast_chain();
    let executor = ChainExecutor::default();
    let first = executor.execute(&chain, 1728.0);

    for _ in 0..100 {
        assert_eq!(executor.execute(&chain, 1728.0), first);
    }
}

#[test]
fn test_fingerprint_ignores_order_and_timestamps() {
    let chain = breast_chain();
    let mut shuffled = breast_chain();
    shuffled.nodes.reverse();
    shuffled.created_at = chain.created_at - chrono::Duration::days(3);

    assert_eq!(chain.fingerprint(), shuffled.fingerprint());

    let mut changed = breast_chain();
    changed.nodes[1].outputs[0].yield_pct = 84.0;
    assert_ne!(chain.fingerprint(), changed.fingerprint());

    let result = execute(&chain, 1728.0);
    assert_eq!(result.chain_fingerprint, chain.fingerprint());
}

#[test]
fn test_concurrent_execution_is_consistent() {
    let chain = Arc::new(breast_chain());
    let executor = Arc::new(ChainExecutor::default().with_batch_ref("batch-17"));
    let expected = executor.execute(&chain, 1728.0);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let chain = Arc::clone(&chain);
            let executor = Arc::clone(&executor);
            thread::spawn(move || executor.execute(&chain, 1728.0))
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), expected);
    }
    assert_eq!(expected.batch_ref.as_deref(), Some("batch-17"));
}

// ─────────────────────────────────────────────────────────────────────────────
// SERIALIZATION TESTS
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_chain_from_json() {
    let json = r#"{
        "version": 3,
        "nodes": [
            {
                "id": "primal",
                "stage_type": "primal_cut",
                "inputs": [{ "part_code": "carcass" }],
                "outputs": [
                    { "part_code": "breast_cap", "yield_pct": 35.0 },
                    { "part_code": "legs", "yield_pct": 43.0 },
                    { "part_code": "wings", "yield_pct": 10.4 },
                    { "part_code": "back", "yield_pct": 11.6,
                      "is_by_product": true, "processable_byproduct": false }
                ],
                "variable_cost_per_kg": 0.10,
                "fixed_cost_per_execution": 50.0
            },
            {
                "id": "filet",
                "stage_type": "sub_cut",
                "entity": { "contractor": "Slachterij Noord" },
                "inputs": [{ "part_code": "breast_cap" }],
                "outputs": [
                    { "part_code": "filet", "yield_pct": 85.0 },
                    { "part_code": "breast_rest", "yield_pct": 13.0, "is_by_product": true }
                ],
                "variable_cost_per_kg": 0.50,
                "fixed_cost_per_execution": 25.0
            }
        ],
        "edges": [
            { "id": "e1", "source_node_id": "primal", "target_node_id": "filet",
              "part_code": "breast_cap" }
        ]
    }"#;

    let chain: ProcessChain = serde_json::from_str(json).unwrap();
    assert_eq!(chain.version, 3);
    assert_eq!(chain.nodes[0].entity, ProcessingEntity::Internal);
    assert_eq!(
        chain.nodes[1].entity,
        ProcessingEntity::Contractor("Slachterij Noord".to_string())
    );
    assert!(validate(&chain).valid);

    let result = execute(&chain, 1728.0);
    assert!(result.success);
    assert_eq!(
        result.final_output("filet").unwrap().allocated_cost_minor,
        35_162
    );
}

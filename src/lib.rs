//! # process-chain
//!
//! Deterministic cost allocation for multi-stage meat processing chains.
//!
//! The engine answers one question:
//!
//! > Given a plan of cutting stages and an input weight, what does each
//! > finished part **cost**, once every upstream stage is paid for?
//!
//! ## Core Contract
//!
//! 1. Validate a chain: acyclic, bounded depth, processable by-products only,
//!    mass-balanced nodes, stages in forward order
//! 2. Allocate each node's processing cost across its outputs by weight share
//! 3. Execute the chain, compounding inherited cost down to every leaf output
//!
//! ## Architecture
//!
//! ```text
//! ProcessChain → GraphValidator → ValidatedChain → ChainExecutor → ChainExecutionResult
//!                                                       ↓
//!                                              NodeCostAllocator (per node)
//! ```
//!
//! ## Determinism Guarantees
//!
//! - Same chain + same input weight + same policy → identical result
//! - Currency is apportioned in integer minor units: allocations reconcile
//!   exactly, at every node and across the chain
//! - Traversal order is canonical (topological, ties by node id)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod types;
pub mod policy;
pub mod currency;
pub mod canonical;
pub mod graph;
pub mod validator;
pub mod allocator;
pub mod executor;
pub mod cache;

// Re-exports
pub use types::{
    StageType, NodeId, ProcessingEntity, NodeInput, NodeOutput, ProcessNode, ProcessEdge,
    ProcessChain, ChainViolation, ValidationResult, OutputAllocation, NodeAllocationResult,
    CostContribution, FinalOutput, NodeExecution, ChainExecutionResult, CHAIN_COST_METHOD,
};
pub use policy::{CostingPolicyV1, EntrySplit};
pub use currency::{apportion, Currency};
pub use canonical::{to_canonical_bytes, canonical_hash, canonical_hash_hex};
pub use graph::ChainIndex;
pub use validator::{GraphValidator, ValidatedChain};
pub use allocator::{AllocationError, NodeCostAllocator};
pub use executor::{ChainExecutor, ExecutionError};
pub use cache::{CacheConfig, CacheStats, CachedValidation, ValidationCache};

/// Default policy identifier.
pub const DEFAULT_POLICY_VERSION: &str = "costing_policy_v1";

/// Schema version of serialized results.
pub const ENGINE_SCHEMA_VERSION: &str = "1.0.0";

/// Validate a chain under the default policy.
pub fn validate(chain: &ProcessChain) -> ValidationResult {
    GraphValidator::default().validate(chain)
}

/// Allocate one node's processing cost for `input_kg` kilograms of input.
pub fn allocate(node: &ProcessNode, input_kg: f64) -> Result<NodeAllocationResult, AllocationError> {
    NodeCostAllocator::default().allocate(node, input_kg)
}

/// Execute a chain on `input_kg` kilograms under the default policy.
pub fn execute(chain: &ProcessChain, input_kg: f64) -> ChainExecutionResult {
    ChainExecutor::default().execute(chain, input_kg)
}

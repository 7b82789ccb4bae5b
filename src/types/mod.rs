//! Core types for the process-chain engine.

pub mod stage;
pub mod node;
pub mod edge;
pub mod chain;
pub mod validation;
pub mod allocation;
pub mod execution;

pub use stage::StageType;
pub use node::{NodeId, ProcessingEntity, NodeInput, NodeOutput, ProcessNode};
pub use edge::ProcessEdge;
pub use chain::ProcessChain;
pub use validation::{ChainViolation, ValidationResult};
pub use allocation::{OutputAllocation, NodeAllocationResult};
pub use execution::{
    CostContribution, FinalOutput, NodeExecution, ChainExecutionResult, CHAIN_COST_METHOD,
};

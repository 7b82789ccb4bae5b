//! Costing policy definitions.

pub mod v1;

pub use v1::{
    CostingPolicyV1, EntrySplit, DEFAULT_MASS_BALANCE_TOLERANCE, DEFAULT_MAX_CHAIN_DEPTH,
    DEFAULT_RECONCILIATION_TOLERANCE_EUR,
};

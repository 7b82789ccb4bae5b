//! CostingPolicy v1: the published engine constants.
//!
//! ## Float Normalization for Deterministic Hashing
//!
//! Tolerances are quantized to integers before hashing (multiply by
//! 1,000,000 and round to i64), so identical policies hash identically
//! regardless of how their floats were produced.

use serde::{Deserialize, Serialize};
use crate::canonical::{canonical_hash_hex, quantize};
use crate::currency::Currency;
use crate::DEFAULT_POLICY_VERSION;

/// Default maximum chain depth, in edges.
pub const DEFAULT_MAX_CHAIN_DEPTH: usize = 10;

/// Default allocation reconciliation tolerance, in currency units.
pub const DEFAULT_RECONCILIATION_TOLERANCE_EUR: f64 = 0.01;

/// Default relative tolerance between pinned and yield-implied flows.
pub const DEFAULT_MASS_BALANCE_TOLERANCE: f64 = 0.001;

/// How `input_kg` is apportioned when a chain has several entry nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntrySplit {
    /// Every entry node receives an equal share.
    #[default]
    Even,
    /// Refuse to execute chains with more than one entry node.
    Reject,
}

/// Quantized policy parameters for deterministic hashing.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct QuantizedPolicyParams {
    version: String,
    max_chain_depth: usize,
    reconciliation_tolerance_eur: i64,
    mass_balance_tolerance: i64,
    currency_decimals: u32,
    entry_split: EntrySplit,
}

/// Costing policy version 1.
///
/// ## Parameters
///
/// - `max_chain_depth`: Longest allowed entry-to-leaf path, in edges
/// - `reconciliation_tolerance_eur`: Max discrepancy between a node's cost and its allocations
/// - `mass_balance_tolerance`: Relative tolerance for pinned flows (0.001 = 0.1%)
/// - `currency_decimals`: Working currency precision
/// - `entry_split`: Apportionment of input weight over several entry nodes
///
/// Deserialized policies go through the same clamping as [`CostingPolicyV1::new`];
/// absent fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "PolicyFile")]
pub struct CostingPolicyV1 {
    /// Policy version identifier.
    pub version: String,
    /// Maximum chain depth.
    pub max_chain_depth: usize,
    /// Allocation reconciliation tolerance.
    pub reconciliation_tolerance_eur: f64,
    /// Relative tolerance for pinned flows.
    pub mass_balance_tolerance: f64,
    /// Working currency precision, in decimals.
    pub currency_decimals: u32,
    /// Multi-entry apportionment.
    pub entry_split: EntrySplit,
}

/// Policy as written in a policy file, before clamping.
#[derive(Deserialize)]
#[serde(default)]
struct PolicyFile {
    version: String,
    max_chain_depth: usize,
    reconciliation_tolerance_eur: f64,
    mass_balance_tolerance: f64,
    currency_decimals: u32,
    entry_split: EntrySplit,
}

impl Default for PolicyFile {
    fn default() -> Self {
        let policy = CostingPolicyV1::default();
        Self {
            version: policy.version,
            max_chain_depth: policy.max_chain_depth,
            reconciliation_tolerance_eur: policy.reconciliation_tolerance_eur,
            mass_balance_tolerance: policy.mass_balance_tolerance,
            currency_decimals: policy.currency_decimals,
            entry_split: policy.entry_split,
        }
    }
}

impl From<PolicyFile> for CostingPolicyV1 {
    fn from(file: PolicyFile) -> Self {
        Self {
            version: file.version,
            entry_split: file.entry_split,
            ..Self::new(
                file.max_chain_depth,
                file.reconciliation_tolerance_eur,
                file.mass_balance_tolerance,
                file.currency_decimals,
            )
        }
    }
}

impl CostingPolicyV1 {
    /// Create a new policy with custom parameters.
    ///
    /// Negative or non-finite tolerances are clamped to zero.
    pub fn new(
        max_chain_depth: usize,
        reconciliation_tolerance_eur: f64,
        mass_balance_tolerance: f64,
        currency_decimals: u32,
    ) -> Self {
        Self {
            version: DEFAULT_POLICY_VERSION.to_string(),
            max_chain_depth,
            reconciliation_tolerance_eur: non_negative(reconciliation_tolerance_eur),
            mass_balance_tolerance: non_negative(mass_balance_tolerance),
            currency_decimals: Currency::with_decimals(currency_decimals).decimals(),
            entry_split: EntrySplit::default(),
        }
    }

    /// Same policy with a different depth bound.
    pub fn with_max_chain_depth(mut self, max_chain_depth: usize) -> Self {
        self.max_chain_depth = max_chain_depth;
        self
    }

    /// Same policy with a different multi-entry convention.
    pub fn with_entry_split(mut self, entry_split: EntrySplit) -> Self {
        self.entry_split = entry_split;
        self
    }

    /// Get the policy ID.
    pub fn policy_id(&self) -> &str {
        &self.version
    }

    /// Working currency.
    pub fn currency(&self) -> Currency {
        Currency::with_decimals(self.currency_decimals)
    }

    /// Whether `actual` agrees with `expected` within the mass-balance tolerance.
    pub fn flows_agree(&self, actual: f64, expected: f64) -> bool {
        let diff = (actual - expected).abs();
        if expected.abs() <= f64::EPSILON {
            return diff <= f64::EPSILON;
        }
        diff / expected.abs() <= self.mass_balance_tolerance
    }

    /// Compute a hash of the policy parameters.
    pub fn params_hash(&self) -> String {
        canonical_hash_hex(&self.to_quantized())
    }

    fn to_quantized(&self) -> QuantizedPolicyParams {
        QuantizedPolicyParams {
            version: self.version.clone(),
            max_chain_depth: self.max_chain_depth,
            reconciliation_tolerance_eur: quantize(self.reconciliation_tolerance_eur),
            mass_balance_tolerance: quantize(self.mass_balance_tolerance),
            currency_decimals: self.currency_decimals,
            entry_split: self.entry_split,
        }
    }
}

fn non_negative(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

impl Default for CostingPolicyV1 {
    fn default() -> Self {
        Self {
            version: DEFAULT_POLICY_VERSION.to_string(),
            max_chain_depth: DEFAULT_MAX_CHAIN_DEPTH,
            reconciliation_tolerance_eur: DEFAULT_RECONCILIATION_TOLERANCE_EUR,
            mass_balance_tolerance: DEFAULT_MASS_BALANCE_TOLERANCE,
            currency_decimals: 2,
            entry_split: EntrySplit::Even,
        }
    }
}

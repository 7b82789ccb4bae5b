//! Process node types.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::stage::StageType;

/// Identifier of a node within a chain.
///
/// Wraps a string and implements `Ord` for deterministic ordering.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Create a new NodeId.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Party performing a processing step. Part of the chain fingerprint, never of the cost.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingEntity {
    /// The processor's own operation.
    Internal,
    /// An external contractor.
    Contractor(String),
}

impl Default for ProcessingEntity {
    fn default() -> Self {
        Self::Internal
    }
}

impl fmt::Display for ProcessingEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Internal => write!(f, "internal"),
            Self::Contractor(name) => write!(f, "contractor:{}", name),
        }
    }
}

/// Material entering a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeInput {
    /// Part code of the incoming material.
    pub part_code: String,
    /// Pinned quantity. When absent the weight is derived from upstream flow.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_kg: Option<f64>,
}

impl NodeInput {
    /// Input whose weight is derived from upstream flow.
    pub fn new(part_code: impl Into<String>) -> Self {
        Self {
            part_code: part_code.into(),
            required_kg: None,
        }
    }

    /// Input with a pinned quantity.
    pub fn pinned(part_code: impl Into<String>, required_kg: f64) -> Self {
        Self {
            part_code: part_code.into(),
            required_kg: Some(required_kg),
        }
    }
}

/// Material leaving a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeOutput {
    /// Part code of the produced material.
    pub part_code: String,
    /// Share of the node's input weight, in percent (0-100).
    pub yield_pct: f64,
    /// Whether this output is a by-product rather than a primary product.
    #[serde(default)]
    pub is_by_product: bool,
    /// Whether a by-product may be processed further. Ignored for primary products.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processable_byproduct: Option<bool>,
}

impl NodeOutput {
    /// Primary product output.
    pub fn product(part_code: impl Into<String>, yield_pct: f64) -> Self {
        Self {
            part_code: part_code.into(),
            yield_pct,
            is_by_product: false,
            processable_byproduct: None,
        }
    }

    /// By-product output with explicit processability.
    pub fn by_product(part_code: impl Into<String>, yield_pct: f64, processable: bool) -> Self {
        Self {
            part_code: part_code.into(),
            yield_pct,
            is_by_product: true,
            processable_byproduct: Some(processable),
        }
    }

    /// Whether this output may feed a downstream node.
    ///
    /// Primary products always may; by-products default to processable
    /// unless explicitly marked otherwise.
    pub fn is_processable(&self) -> bool {
        !self.is_by_product || self.processable_byproduct.unwrap_or(true)
    }
}

/// One processing step in a chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessNode {
    /// Unique identifier within the chain.
    pub id: NodeId,
    /// Stage category.
    pub stage_type: StageType,
    /// Performing party.
    #[serde(default)]
    pub entity: ProcessingEntity,
    /// Declared inputs, in order.
    #[serde(default)]
    pub inputs: Vec<NodeInput>,
    /// Declared outputs, in order.
    #[serde(default)]
    pub outputs: Vec<NodeOutput>,
    /// Variable processing cost per kilogram of input.
    #[serde(default)]
    pub variable_cost_per_kg: f64,
    /// Fixed processing cost per execution.
    #[serde(default)]
    pub fixed_cost_per_execution: f64,
    /// Cached outcome of the last validation pass. Not authoritative.
    #[serde(default = "default_true")]
    pub is_valid: bool,
    /// Cached errors of the last validation pass. Not authoritative.
    #[serde(default)]
    pub validation_errors: Vec<String>,
}

fn default_true() -> bool {
    true
}

impl ProcessNode {
    /// Create a node with no inputs, outputs or cost.
    pub fn new(id: impl Into<NodeId>, stage_type: StageType) -> Self {
        Self {
            id: id.into(),
            stage_type,
            entity: ProcessingEntity::Internal,
            inputs: Vec::new(),
            outputs: Vec::new(),
            variable_cost_per_kg: 0.0,
            fixed_cost_per_execution: 0.0,
            is_valid: true,
            validation_errors: Vec::new(),
        }
    }

    /// Set the performing party.
    pub fn with_entity(mut self, entity: ProcessingEntity) -> Self {
        self.entity = entity;
        self
    }

    /// Add an input.
    pub fn with_input(mut self, input: NodeInput) -> Self {
        self.inputs.push(input);
        self
    }

    /// Add an output.
    pub fn with_output(mut self, output: NodeOutput) -> Self {
        self.outputs.push(output);
        self
    }

    /// Set the cost model.
    pub fn with_costs(mut self, variable_cost_per_kg: f64, fixed_cost_per_execution: f64) -> Self {
        self.variable_cost_per_kg = variable_cost_per_kg;
        self.fixed_cost_per_execution = fixed_cost_per_execution;
        self
    }

    /// Look up a declared output by part code.
    pub fn output(&self, part_code: &str) -> Option<&NodeOutput> {
        self.outputs.iter().find(|o| o.part_code == part_code)
    }

    /// Look up a declared input by part code.
    pub fn input(&self, part_code: &str) -> Option<&NodeInput> {
        self.inputs.iter().find(|i| i.part_code == part_code)
    }

    /// Sum of all output yields, in percent.
    pub fn total_yield_pct(&self) -> f64 {
        self.outputs.iter().map(|o| o.yield_pct).sum()
    }

    /// Unmodeled loss, in percent.
    pub fn loss_pct(&self) -> f64 {
        100.0 - self.total_yield_pct()
    }

    /// Cost incurred by one execution on `input_kg` kilograms.
    pub fn processing_cost(&self, input_kg: f64) -> f64 {
        self.variable_cost_per_kg * input_kg + self.fixed_cost_per_execution
    }

    /// Sum of pinned input quantities, if every input pins one.
    pub fn pinned_input_kg(&self) -> Option<f64> {
        if self.inputs.is_empty() {
            return None;
        }
        self.inputs.iter().map(|i| i.required_kg).sum()
    }
}

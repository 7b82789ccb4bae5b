//! Stage categories for process nodes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Category of a processing stage.
///
/// Stages are ranked: material may only flow from a stage to a stage of
/// equal or higher rank, and nothing flows out of a terminal stage.
///
/// | Stage | Rank | Terminal |
/// |-------|------|----------|
/// | `primal_cut` | 0 | no |
/// | `sub_cut` | 1 | no |
/// | `packaging` | 2 | yes |
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageType {
    /// Splitting a whole carcass into primal parts.
    PrimalCut,
    /// Further cutting of a primal part.
    SubCut,
    /// Packing finished product. Terminal.
    Packaging,
}

impl StageType {
    /// Ordering rank of the stage.
    pub fn rank(&self) -> u8 {
        match self {
            Self::PrimalCut => 0,
            Self::SubCut => 1,
            Self::Packaging => 2,
        }
    }

    /// Whether material may leave this stage towards another node.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Packaging)
    }

    /// Whether an edge from `self` into `target` respects stage ordering.
    pub fn can_feed(&self, target: StageType) -> bool {
        !self.is_terminal() && self.rank() <= target.rank()
    }

    /// Parse stage type from string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "primal_cut" => Some(Self::PrimalCut),
            "sub_cut" => Some(Self::SubCut),
            "packaging" => Some(Self::Packaging),
            _ => None,
        }
    }
}

impl fmt::Display for StageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PrimalCut => write!(f, "primal_cut"),
            Self::SubCut => write!(f, "sub_cut"),
            Self::Packaging => write!(f, "packaging"),
        }
    }
}

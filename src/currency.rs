//! Fixed-point currency arithmetic.
//!
//! All cost math inside the engine runs on integer minor units (cents at the
//! default precision of 2 decimals). Floats only appear at the boundary:
//! cost models are quantized on the way in, results are converted back on
//! the way out.
//!
//! ## Apportionment
//!
//! [`apportion`] splits an integer amount across weighted recipients so that
//! the parts sum to the amount exactly. Each share is rounded to the nearest
//! minor unit and the residual is assigned to the largest share. Because the
//! split is exact at every node, chaining any number of nodes cannot drift.

use serde::{Deserialize, Serialize};

/// Working currency precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Currency {
    decimals: u32,
}

impl Currency {
    /// Currency with the given number of decimals (capped at 9).
    pub fn with_decimals(decimals: u32) -> Self {
        Self {
            decimals: decimals.min(9),
        }
    }

    /// Number of decimals.
    pub fn decimals(&self) -> u32 {
        self.decimals
    }

    /// Minor units per major unit.
    pub fn factor(&self) -> f64 {
        10f64.powi(self.decimals as i32)
    }

    /// Quantize a major-unit amount to minor units.
    ///
    /// Saturates at the `i64` range; use [`Currency::checked_to_minor`] for
    /// amounts that are not known to be small.
    pub fn to_minor(&self, amount: f64) -> i64 {
        (amount * self.factor()).round() as i64
    }

    /// Quantize a major-unit amount to minor units, or `None` if the amount
    /// is not finite or does not fit an `i64` of minor units.
    pub fn checked_to_minor(&self, amount: f64) -> Option<i64> {
        let scaled = (amount * self.factor()).round();
        (scaled.is_finite() && scaled.abs() < i64::MAX as f64).then_some(scaled as i64)
    }

    /// Convert minor units back to a major-unit amount.
    pub fn to_major(&self, minor: i64) -> f64 {
        minor as f64 / self.factor()
    }

    /// One minor unit expressed in major units.
    pub fn smallest_unit(&self) -> f64 {
        1.0 / self.factor()
    }
}

impl Default for Currency {
    fn default() -> Self {
        Self::with_decimals(2)
    }
}

/// Split `total` minor units across `weights`, exactly.
///
/// Negative and non-finite weights count as zero. If no weight is positive
/// the amount is split evenly. The returned parts always sum to `total`.
pub fn apportion(total: i64, weights: &[f64]) -> Vec<i64> {
    if weights.is_empty() {
        return Vec::new();
    }

    let clean: Vec<f64> = weights
        .iter()
        .map(|w| if w.is_finite() && *w > 0.0 { *w } else { 0.0 })
        .collect();
    let sum: f64 = clean.iter().sum();
    let basis: Vec<f64> = if sum > 0.0 {
        clean
    } else {
        vec![1.0; weights.len()]
    };
    let basis_sum: f64 = basis.iter().sum();

    let mut parts: Vec<i64> = basis
        .iter()
        .map(|w| ((total as f64) * w / basis_sum).round() as i64)
        .collect();

    // Widened: rounded parts of a near-limit total may overshoot i64.
    let residual = total as i128 - parts.iter().map(|p| *p as i128).sum::<i128>();
    if residual != 0 {
        let largest = largest_index(&parts);
        parts[largest] = (parts[largest] as i128 + residual) as i64;
    }
    parts
}

/// Index of the largest part. Ties resolve to the first.
fn largest_index(parts: &[i64]) -> usize {
    let mut best = 0;
    for (i, part) in parts.iter().enumerate() {
        if *part > parts[best] {
            best = i;
        }
    }
    best
}

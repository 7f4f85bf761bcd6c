//! Discretization of the unit trait interval.

use serde::{Deserialize, Serialize};

/// `n + 1` equally spaced bin edges covering `[0, 1]`.
pub fn edge_values(n: usize) -> Vec<f64> {
    (0..=n).map(|i| i as f64 / n as f64).collect()
}

/// The `n` bin midpoints, from `dx` to `1 - dx` with `dx = 1 / (2n)`.
pub fn trait_vec(n: usize) -> Vec<f64> {
    let dx = 0.5 / n as f64;
    (0..n).map(|i| dx + 2.0 * dx * i as f64).collect()
}

/// Edges and midpoints of a discretized trait.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraitGrid {
    edges: Vec<f64>,
    mids: Vec<f64>,
}

impl TraitGrid {
    pub fn new(n: usize) -> Self {
        Self {
            edges: edge_values(n),
            mids: trait_vec(n),
        }
    }

    pub fn len(&self) -> usize {
        self.mids.len()
    }

    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    pub fn mids(&self) -> &[f64] {
        &self.mids
    }
}

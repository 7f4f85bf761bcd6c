use crate::dist::Distribution;
use crate::error::{SimError, SimResult};
use crate::grid::TraitGrid;
use statrs::distribution::{ContinuousCDF, Normal};

/// Mutation operator over a trait grid.
///
/// Column `j` holds the offspring distribution of parent bin `j`: a fraction
/// `1 - p` stays in bin `j` and a fraction `p` disperses following a Gaussian
/// clipped at the ends of the unit interval.
#[derive(Debug, Clone)]
pub struct DispersalKernel {
    n: usize,
    // Column-major.
    entries: Vec<f64>,
}

impl DispersalKernel {
    pub fn new(grid: &TraitGrid, p: f64, mutation_scale: f64) -> SimResult<Self> {
        if !(0.0..=1.0).contains(&p) {
            return Err(SimError::Configuration(format!(
                "mutation proportion must be in [0, 1], but is {p}"
            )));
        }
        if !(mutation_scale > 0.0 && mutation_scale.is_finite()) {
            return Err(SimError::Configuration(format!(
                "mutation scale must be positive, but is {mutation_scale}"
            )));
        }

        let n = grid.len();
        let mut entries = Vec::with_capacity(n * n);
        for parent in 0..n {
            let dispersing = dispersal(grid, parent, mutation_scale)?;
            for (child, disp) in dispersing.into_iter().enumerate() {
                let stays = if child == parent { 1.0 } else { 0.0 };
                entries.push(p * disp + (1.0 - p) * stays);
            }
        }

        Ok(Self { n, entries })
    }

    pub fn column(&self, parent: usize) -> &[f64] {
        &self.entries[parent * self.n..(parent + 1) * self.n]
    }

    /// Offspring distribution of a parent distribution.
    pub fn apply(&self, dist: &Distribution) -> SimResult<Distribution> {
        if dist.len() != self.n {
            return Err(SimError::Configuration(format!(
                "distribution has {} bins but kernel has {}",
                dist.len(),
                self.n
            )));
        }
        let mut out = vec![0.0; self.n];
        for (parent, &mass) in dist.mass().iter().enumerate() {
            if mass == 0.0 {
                continue;
            }
            for (child, &k) in self.column(parent).iter().enumerate() {
                out[child] += k * mass;
            }
        }
        Distribution::normalised(out)
    }
}

/// Gaussian offspring mass per bin, with the tails folded into the end bins.
fn dispersal(grid: &TraitGrid, parent: usize, mutation_scale: f64) -> SimResult<Vec<f64>> {
    let normal = Normal::new(grid.mids()[parent], mutation_scale.sqrt())
        .map_err(|err| SimError::Configuration(err.to_string()))?;

    let cdf: Vec<f64> = grid.edges().iter().map(|&e| normal.cdf(e)).collect();
    let mut dispersing: Vec<f64> = cdf.windows(2).map(|c| c[1] - c[0]).collect();

    let bottom = cdf[0];
    let top = 1.0 - cdf[cdf.len() - 1];
    dispersing[0] += bottom;
    let last = dispersing.len() - 1;
    dispersing[last] += top;

    Ok(dispersing)
}

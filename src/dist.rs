//! Probability mass vectors over a trait grid and their initial builders.

use crate::error::{SimError, SimResult};
use crate::grid::edge_values;
use serde::{Deserialize, Serialize};
use statrs::distribution::{Beta, ContinuousCDF, Gamma};

/// Fraction of the pathogen population in each trait bin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Distribution {
    mass: Vec<f64>,
}

impl Distribution {
    /// Normalize non-negative weights to unit mass.
    pub fn normalised(weights: Vec<f64>) -> SimResult<Self> {
        if weights.iter().any(|&w| !(w >= 0.0) || !w.is_finite()) {
            return Err(SimError::InvalidShape(
                "weights must be finite and non-negative".to_string(),
            ));
        }
        let sum: f64 = weights.iter().sum();
        if sum <= 0.0 {
            return Err(SimError::InvalidShape("weights sum to zero".to_string()));
        }
        let mass = weights.into_iter().map(|w| w / sum).collect();
        Ok(Self { mass })
    }

    pub fn mass(&self) -> &[f64] {
        &self.mass
    }

    pub fn len(&self) -> usize {
        self.mass.len()
    }

    pub fn total(&self) -> f64 {
        self.mass.iter().sum()
    }

    pub fn mean(&self, trait_vec: &[f64]) -> f64 {
        self.mass.iter().zip(trait_vec).map(|(m, x)| m * x).sum()
    }

    pub fn variance(&self, trait_vec: &[f64]) -> f64 {
        let mean = self.mean(trait_vec);
        self.mass
            .iter()
            .zip(trait_vec)
            .map(|(m, x)| m * (x - mean).powi(2))
            .sum()
    }
}

fn check_shape(a: f64, b: f64) -> SimResult<()> {
    if !(a > 0.0 && b > 0.0 && a.is_finite() && b.is_finite()) {
        return Err(SimError::InvalidShape(format!(
            "shape parameters must be positive, but are a = {a}, b = {b}"
        )));
    }
    Ok(())
}

/// Gamma distribution (shape `a`, rate `b`) over fungicide curvatures.
///
/// Trait value `x` maps to curvature `log(1/x)`, so the bin at the lower trait
/// edge 0 extends to infinite curvature.
pub fn gamma_dist(n: usize, a: f64, b: f64) -> SimResult<Distribution> {
    check_shape(a, b)?;
    let gamma = Gamma::new(a, b).map_err(|err| SimError::InvalidShape(err.to_string()))?;

    let cdf = |x: f64| {
        let curv = (1.0 / x).ln();
        if curv.is_infinite() {
            1.0
        } else {
            gamma.cdf(curv)
        }
    };

    let edges = edge_values(n);
    let weights = edges.windows(2).map(|e| cdf(e[0]) - cdf(e[1])).collect();
    Distribution::normalised(weights)
}

/// Beta distribution over host-evasion trait values.
pub fn beta_dist(n: usize, a: f64, b: f64) -> SimResult<Distribution> {
    check_shape(a, b)?;
    let beta = Beta::new(a, b).map_err(|err| SimError::InvalidShape(err.to_string()))?;

    let edges = edge_values(n);
    let weights = edges
        .windows(2)
        .map(|e| beta.cdf(e[1]) - beta.cdf(e[0]))
        .collect();
    Distribution::normalised(weights)
}

/// All mass in bin `floor(mean * (n - 1))`.
pub fn initial_point_distribution(n: usize, mean: f64) -> SimResult<Distribution> {
    if n == 0 {
        return Err(SimError::InvalidShape("point mass needs at least one bin".to_string()));
    }
    if !(0.0..=1.0).contains(&mean) {
        return Err(SimError::InvalidShape(format!(
            "point mass location must be in [0, 1], but is {mean}"
        )));
    }
    let j = (mean * (n - 1) as f64).floor() as usize;
    let mut weights = vec![0.0; n];
    weights[j] = 1.0;
    Distribution::normalised(weights)
}

/// Gamma shape and rate from the fitted mean curvature and rate.
pub fn fung_dist_params(mu: f64, b: f64) -> (f64, f64) {
    (mu * b, b)
}

/// Beta shape parameters from the fitted mean trait value and `b`.
pub fn host_dist_params(mu: f64, b: f64) -> (f64, f64) {
    (b * mu / (1.0 - mu), b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::trait_vec;

    fn assert_unit_mass(dist: &Distribution) {
        assert!(dist.mass().iter().all(|&m| m >= 0.0));
        assert!((dist.total() - 1.0).abs() < 1e-9, "sum = {}", dist.total());
    }

    #[test]
    fn gamma_and_beta_sum_to_one() {
        for n in [1, 5, 50, 300] {
            for (a, b) in [(0.5, 0.5), (2.0, 3.0), (9.4 * 0.84, 0.84), (20.0, 1.5)] {
                assert_unit_mass(&gamma_dist(n, a, b).unwrap());
                assert_unit_mass(&beta_dist(n, a, b).unwrap());
            }
        }
    }

    #[test]
    fn non_positive_shapes_are_rejected() {
        assert!(matches!(gamma_dist(10, 0.0, 1.0), Err(SimError::InvalidShape(_))));
        assert!(matches!(gamma_dist(10, 1.0, -2.0), Err(SimError::InvalidShape(_))));
        assert!(matches!(beta_dist(10, -1.0, 1.0), Err(SimError::InvalidShape(_))));
        assert!(matches!(beta_dist(10, 1.0, f64::NAN), Err(SimError::InvalidShape(_))));
    }

    #[test]
    fn gamma_mass_sits_at_low_trait_for_high_curvature() {
        // Mean curvature 10 means strains are very sensitive, i.e. trait near 0.
        let (a, b) = fung_dist_params(10.0, 5.0);
        let dist = gamma_dist(100, a, b).unwrap();
        let mean = dist.mean(&trait_vec(100));
        assert!(mean < 0.01, "mean = {mean}");
    }

    #[test]
    fn beta_mean_matches_fitted_mean() {
        let (a, b) = host_dist_params(0.8, 4.0);
        let dist = beta_dist(500, a, b).unwrap();
        let mean = dist.mean(&trait_vec(500));
        assert!((mean - 0.8).abs() < 1e-3, "mean = {mean}");
    }

    #[test]
    fn point_distribution_is_an_indicator() {
        let n = 11;
        for mean in [0.0, 0.25, 0.5, 0.93, 1.0] {
            let dist = initial_point_distribution(n, mean).unwrap();
            let j = (mean * (n - 1) as f64).floor() as usize;
            for (i, &m) in dist.mass().iter().enumerate() {
                assert_eq!(m, if i == j { 1.0 } else { 0.0 });
            }
        }
        assert!(initial_point_distribution(n, 1.5).is_err());
        assert!(matches!(
            initial_point_distribution(0, 0.5),
            Err(SimError::InvalidShape(_))
        ));
    }

    #[test]
    fn variance_of_point_mass_is_zero() {
        let dist = initial_point_distribution(8, 0.5).unwrap();
        assert_eq!(dist.variance(&trait_vec(8)), 0.0);
    }
}

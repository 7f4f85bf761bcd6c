//! Yield and profit of a season.

use crate::params::Params;
use serde::{Deserialize, Serialize};

/// Pre-fitted mapping from final disease severity to yield (t/ha).
pub trait YieldModel {
    fn predict(&self, severity: f64) -> f64;
}

/// Yield falling linearly with severity from a disease-free maximum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinearYield {
    pub yield_max: f64,
    pub loss_slope: f64,
}

impl Default for LinearYield {
    fn default() -> Self {
        Self {
            yield_max: 10.0,
            loss_slope: 3.5,
        }
    }
}

impl YieldModel for LinearYield {
    fn predict(&self, severity: f64) -> f64 {
        (self.yield_max - self.loss_slope * severity).max(0.0)
    }
}

/// Revenue minus application and chemical costs.
///
/// Application costs are only paid when a positive dose is sprayed.
pub fn economic_yield(yld: f64, sprays: u32, dose: f64, params: &Params) -> f64 {
    let applied = if dose > 0.0 { 1.0 } else { 0.0 };
    let sprays = sprays as f64;

    let cost_application = params.application_cost_per_spray * sprays * applied;
    let cost_fungicide = params.chemical_cost_per_spray * sprays * dose;
    let revenue = params.wheat_price * yld;

    revenue - cost_application - cost_fungicide
}

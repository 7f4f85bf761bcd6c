//! Simulation data types.

use crate::dist::Distribution;
use serde::{Deserialize, Serialize};

/// Spray and cultivar tactic, applied at a constant dose every year.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Strategy {
    pub sprays: u32,
    pub host_on: bool,
    pub dose: f64,
}

impl Strategy {
    /// Label such as `spray_2_host_N`.
    pub fn key(&self) -> String {
        let spray = if self.sprays == 0 {
            "N".to_string()
        } else {
            self.sprays.to_string()
        };
        let host = if self.host_on { "Y" } else { "N" };
        format!("spray_{spray}_host_{host}")
    }
}

/// Outcome of one year of one strategy.
///
/// `run`, `year`, `dose` and `yld` are the columns downstream tools join on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YieldRecord {
    pub run: usize,
    pub sprays: u32,
    pub host_on: bool,
    pub dose: f64,
    pub year: usize,
    pub beta: f64,
    pub sev: f64,
    pub yld: f64,
    pub profit: f64,
}

/// Trait distributions of one strategy over the years.
///
/// Distribution `y` is the one infecting the crop in year `y`; the last entry
/// is the population left after the final year.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trajectory {
    pub strategy: Strategy,
    pub fung_dists: Vec<Distribution>,
    pub host_dists: Vec<Distribution>,
    pub records: Vec<YieldRecord>,
}

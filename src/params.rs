use serde::{Deserialize, Serialize};

/// Fungicide decay rate per degree-day.
pub const FUNG_DECAY_RATE: f64 = 6.91e-3;

/// Initial infected fraction of the host area.
pub const DEFAULT_I0: f64 = 9.8e-3;

/// Transmission rate used when a scenario does not set one.
pub const DEFAULT_BETA: f64 = 7.9e-3;

/// Disease pressures a multi-mode run draws its yearly transmission rate from.
pub const ALL_BETAS: [f64; 5] = [5.5e-3, 6.7e-3, 7.9e-3, 9.1e-3, 1.03e-2];

pub const MUTATION_PROP: f64 = 0.01;
pub const DEFAULT_MUTATION_SCALE: f64 = 1e-3;

/// Constants of the within-season epidemic and of the economics.
///
/// Times are in degree-days after sowing.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Params {
    /// First spray timing (GS32) and start of the simulated season.
    pub t_1: f64,
    /// Second spray timing (GS39).
    pub t_2: f64,
    /// Third spray timing (GS61) and onset of senescence.
    pub t_3: f64,
    /// End of the season (GS87).
    pub t_end: f64,

    pub host_growth_rate: f64,
    pub host_growth_initial_area: f64,

    /// Price of wheat per tonne.
    pub wheat_price: f64,
    /// Cost of applying one spray, independent of dose.
    pub application_cost_per_spray: f64,
    /// Cost of the chemical for one full-dose spray.
    pub chemical_cost_per_spray: f64,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            t_1: 1456.0,
            t_2: 1700.0,
            t_3: 2066.0,
            t_end: 2515.0,

            host_growth_rate: 1.26e-2,
            host_growth_initial_area: 0.05,

            wheat_price: 117.1,
            application_cost_per_spray: 5.0,
            chemical_cost_per_spray: 24.0,
        }
    }
}

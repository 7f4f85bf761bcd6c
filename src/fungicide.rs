//! Fungicide concentration and its effect on the infection rate of a strain.

use crate::params::{FUNG_DECAY_RATE, Params};
use serde::{Deserialize, Serialize};

/// Length of the full-dose window of [`FungicideModel::NoDecay`].
pub const NO_DECAY_WINDOW: f64 = 240.0;

/// How the trait value of a strain enters the dose response.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FungicideModel {
    /// Curvature `log(1/x)` from the trait, fixed asymptote `w`.
    Curvature { asymptote: f64 },
    /// Fixed curvature, asymptote equal to the trait value.
    Asymptote { curvature: f64 },
    /// Constant concentration for a fixed window after each spray.
    NoDecay,
}

impl Default for FungicideModel {
    fn default() -> Self {
        Self::Curvature { asymptote: 1.0 }
    }
}

/// Spray timings of a year with `num_sprays` sprays.
pub fn spray_schedule(num_sprays: u32, params: &Params) -> Vec<f64> {
    match num_sprays {
        1 => vec![params.t_2],
        2 => vec![params.t_2, params.t_3],
        3 => vec![params.t_1, params.t_2, params.t_3],
        _ => Vec::new(),
    }
}

/// Fungicide programme of a single year.
#[derive(Debug, Clone)]
pub struct Fungicide {
    model: FungicideModel,
    dose: f64,
    decay_rate: f64,
    sprays: Vec<f64>,
}

impl Fungicide {
    pub fn new(
        num_sprays: u32,
        dose: f64,
        decay_rate: Option<f64>,
        model: FungicideModel,
        params: &Params,
    ) -> Self {
        Self {
            model,
            dose,
            decay_rate: decay_rate.unwrap_or(FUNG_DECAY_RATE),
            sprays: spray_schedule(num_sprays, params),
        }
    }

    #[cfg(test)]
    pub fn sprays(&self) -> &[f64] {
        &self.sprays
    }

    pub fn concentration(&self, t: f64) -> f64 {
        match self.model {
            FungicideModel::NoDecay => {
                let in_window = self
                    .sprays
                    .iter()
                    .any(|&t_spray| t > t_spray && t < t_spray + NO_DECAY_WINDOW);
                if in_window { self.dose } else { 0.0 }
            }
            _ => self
                .sprays
                .iter()
                .filter(|&&t_spray| t > t_spray)
                .map(|&t_spray| self.dose * (-self.decay_rate * (t - t_spray)).exp())
                .sum(),
        }
    }

    /// Factor by which the fungicide reduces the infection rate of a strain
    /// with the given trait value at time `t`.
    pub fn effect(&self, trait_value: f64, t: f64) -> f64 {
        self.effect_at_concentration(trait_value, self.concentration(t))
    }

    /// Same as [`Fungicide::effect`] for a precomputed concentration.
    pub fn effect_at_concentration(&self, trait_value: f64, concentration: f64) -> f64 {
        if concentration == 0.0 {
            return 1.0;
        }
        match self.model {
            FungicideModel::Curvature { asymptote } => {
                let curv = (1.0 / trait_value).ln();
                1.0 - asymptote + asymptote * (-curv * concentration).exp()
            }
            FungicideModel::Asymptote { curvature } => {
                let w = trait_value;
                1.0 - w + w * (-curvature * concentration).exp()
            }
            FungicideModel::NoDecay => {
                let curv = (1.0 / trait_value).ln();
                (-curv * concentration).exp()
            }
        }
    }

    /// Times in `(t_start, t_end)` at which the effect is discontinuous.
    pub fn breakpoints(&self, t_start: f64, t_end: f64) -> Vec<f64> {
        let mut points: Vec<f64> = self.sprays.clone();
        if self.model == FungicideModel::NoDecay {
            points.extend(self.sprays.iter().map(|t| t + NO_DECAY_WINDOW));
        }
        points.retain(|&t| t > t_start && t < t_end);
        points.sort_by(f64::total_cmp);
        points.dedup();
        points
    }
}

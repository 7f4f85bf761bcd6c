//! Error taxonomy of the simulation core.
//!
//! The core reports typed errors; the manager and the CLI wrap them with
//! [`anyhow::Context`].

use thiserror::Error;

pub type SimResult<T> = std::result::Result<T, SimError>;

#[derive(Debug, Error)]
pub enum SimError {
    /// Invalid parameters or an unmatched fitted-parameter lookup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A host attribute was requested from a configuration without host traits.
    #[error("host attribute `{0}` is unavailable because host traits are disabled")]
    HostDisabled(&'static str),

    /// The ODE integrator could not advance the state.
    #[error("integration failed at t = {t}: {reason}")]
    IntegrationFailure { t: f64, reason: String },

    /// Distribution builder called with unusable shape parameters.
    #[error("invalid shape parameters: {0}")]
    InvalidShape(String),

    /// A trait distribution stopped summing to one.
    #[error("distribution mass in year {year} is {sum}, expected 1")]
    MassNotConserved { year: usize, sum: f64 },

    /// Every strain had an invalid infection rate multiplier.
    #[error("no strain has a valid infection rate in year {year}")]
    NoValidStrains { year: usize },
}

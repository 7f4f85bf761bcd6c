//! Within-season epidemic on the host leaf area.

use crate::dist::Distribution;
use crate::error::{SimError, SimResult};
use crate::fungicide::Fungicide;
use crate::ode::Dopri5;
use crate::optim::minimize_bounded;
use crate::params::Params;

/// Bounds of the transmission rate searched by [`find_beta`].
pub const BETA_BOUNDS: (f64, f64) = (1e-4, 5e-2);

/// Net host growth: logistic-like expansion minus senescence after `t_3`.
pub fn host_growth_function(t: f64, s: f64, total_area: f64, params: &Params) -> f64 {
    let senescence = if t < params.t_3 {
        0.0
    } else {
        0.005 * ((t - params.t_3) / (2900.0 - params.t_3)) + 0.1 * (-0.02 * (2900.0 - t)).exp()
    };
    let growth = params.host_growth_rate * (1.0 - total_area);
    growth - senescence * s
}

pub fn disease_severity(final_i: f64, final_s: f64) -> f64 {
    final_i / (final_i + final_s)
}

/// Initial susceptible and infected areas.
pub fn initial_state(i0: f64, params: &Params) -> [f64; 2] {
    let area = params.host_growth_initial_area;
    [area * (1.0 - i0), area * i0]
}

/// `(S, I)` at each of `t_out` for an uncontrolled epidemic.
///
/// Integration starts at `t_out[0]`, so the first entry is the initial state.
pub fn find_soln_given_beta_and_no_control(
    beta: f64,
    i0: f64,
    t_out: &[f64],
    params: &Params,
) -> SimResult<Vec<[f64; 2]>> {
    let solver = Dopri5::default();
    let mut rhs = |t: f64, y: &[f64], dydt: &mut [f64]| {
        let (s, i) = (y[0], y[1]);
        dydt[0] = host_growth_function(t, s, s + i, params) - beta * s * i;
        dydt[1] = beta * s * i;
    };

    let mut y = initial_state(i0, params);
    let mut out = Vec::with_capacity(t_out.len());
    let Some(&t_first) = t_out.first() else {
        return Ok(out);
    };
    out.push(y);

    let mut t = t_first;
    for &t_next in &t_out[1..] {
        solver.integrate(&mut rhs, t, t_next, &mut y)?;
        out.push(y);
        t = t_next;
    }
    Ok(out)
}

/// Final severity of an uncontrolled season.
pub fn find_sev_given_beta_and_no_control(beta: f64, i0: f64, params: &Params) -> SimResult<f64> {
    let y_out = find_soln_given_beta_and_no_control(beta, i0, &[params.t_1, params.t_end], params)?;
    let [s, i] = y_out[y_out.len() - 1];
    Ok(disease_severity(i, s))
}

/// Transmission rate giving `final_sev` in an uncontrolled season.
///
/// Returns NaN when no rate strictly inside [`BETA_BOUNDS`] reproduces the
/// severity; callers must check before using the value.
pub fn find_beta(final_sev: f64, i0: f64, params: &Params) -> f64 {
    if final_sev > 1.0 {
        log::warn!("final severity {final_sev} > 1");
    }

    let (lo, hi) = BETA_BOUNDS;
    let objective = |beta: f64| match find_sev_given_beta_and_no_control(beta, i0, params) {
        Ok(sev) => (sev - final_sev).powi(2),
        Err(err) => {
            log::warn!("{err}");
            f64::INFINITY
        }
    };
    let min = minimize_bounded(objective, lo, hi, 1e-8, 500);

    let margin = 1e-6;
    if min.converged && min.x > lo + margin && min.x < hi - margin {
        min.x
    } else {
        log::warn!(
            "no valid beta for severity {final_sev}, optimizer stopped at {} after {} evaluations with residual {:.3e}",
            min.x,
            min.n_evals,
            min.fun
        );
        f64::NAN
    }
}

/// Everything the season needs to know about the pathogen population.
pub struct SeasonInput<'a> {
    pub beta: f64,
    pub i0: f64,
    pub fung_dist: &'a Distribution,
    pub host_dist: &'a Distribution,
    /// Fungicide trait value of each fungicide bin.
    pub fung_traits: &'a [f64],
    /// Infection rate multiplier of each host bin.
    pub host_multipliers: &'a [f64],
    pub fungicide: &'a Fungicide,
}

#[derive(Debug, Clone)]
pub struct SeasonOutcome {
    pub severity: f64,
    /// Fungicide trait distribution of the infected area at the end of the season.
    pub fung_dist: Distribution,
    /// Host trait distribution of the infected area at the end of the season.
    pub host_dist: Distribution,
}

/// Integrate one season with a shared susceptible area and one infected
/// compartment per (fungicide bin, host bin) strain.
pub fn simulate_season(input: &SeasonInput, params: &Params) -> SimResult<SeasonOutcome> {
    let n_k = input.fung_dist.len();
    let n_l = input.host_dist.len();
    if input.fung_traits.len() != n_k || input.host_multipliers.len() != n_l {
        return Err(SimError::Configuration(
            "trait vectors do not match distribution sizes".to_string(),
        ));
    }

    let [s0, i_total0] = initial_state(input.i0, params);
    let mut y = Vec::with_capacity(1 + n_k * n_l);
    y.push(s0);
    for &f in input.fung_dist.mass() {
        for &h in input.host_dist.mass() {
            y.push(i_total0 * f * h);
        }
    }

    let mut fung_effect = vec![1.0; n_k];
    let mut rhs = |t: f64, y: &[f64], dydt: &mut [f64]| {
        let conc = input.fungicide.concentration(t);
        for (eff, &x) in fung_effect.iter_mut().zip(input.fung_traits) {
            *eff = input.fungicide.effect_at_concentration(x, conc);
        }

        let s = y[0];
        let mut total_area = s;
        let mut force = 0.0;
        for k in 0..n_k {
            for l in 0..n_l {
                let idx = 1 + k * n_l + l;
                let rate = input.beta * fung_effect[k] * input.host_multipliers[l];
                let i = y[idx];
                if i == 0.0 {
                    dydt[idx] = 0.0;
                    continue;
                }
                total_area += i;
                force += rate * i;
                dydt[idx] = rate * s * i;
            }
        }
        dydt[0] = host_growth_function(t, s, total_area, params) - s * force;
    };

    let solver = Dopri5::default();
    let mut t = params.t_1;
    let mut stops = input.fungicide.breakpoints(params.t_1, params.t_end);
    stops.push(params.t_end);
    for t_next in stops {
        solver.integrate(&mut rhs, t, t_next, &mut y)?;
        t = t_next;
    }

    let final_s = y[0].max(0.0);
    let mut fung_w = vec![0.0; n_k];
    let mut host_w = vec![0.0; n_l];
    for k in 0..n_k {
        for l in 0..n_l {
            let i = y[1 + k * n_l + l].max(0.0);
            fung_w[k] += i;
            host_w[l] += i;
        }
    }
    let final_i: f64 = fung_w.iter().sum();

    Ok(SeasonOutcome {
        severity: disease_severity(final_i, final_s),
        fung_dist: Distribution::normalised(fung_w)?,
        host_dist: Distribution::normalised(host_w)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dist::{beta_dist, gamma_dist, initial_point_distribution};
    use crate::fungicide::FungicideModel;
    use crate::grid::trait_vec;
    use crate::params::DEFAULT_I0;

    #[test]
    fn severity_increases_with_beta() {
        let params = Params::default();
        let sevs: Vec<f64> = [2e-3, 5e-3, 1e-2, 2e-2]
            .iter()
            .map(|&b| find_sev_given_beta_and_no_control(b, DEFAULT_I0, &params).unwrap())
            .collect();
        assert!(sevs.windows(2).all(|w| w[0] < w[1]), "{sevs:?}");
        assert!(sevs.iter().all(|&s| s > 0.0 && s < 1.0));
    }

    #[test]
    fn find_beta_round_trip() {
        let params = Params::default();
        for beta in [1e-3, 4e-3, 7.9e-3, 1.2e-2, 2e-2] {
            let sev = find_sev_given_beta_and_no_control(beta, DEFAULT_I0, &params).unwrap();
            let found = find_beta(sev, DEFAULT_I0, &params);
            assert!((found - beta).abs() < 1e-3, "beta = {beta}, found = {found}");
        }
    }

    #[test]
    fn unreachable_severity_gives_nan() {
        let params = Params::default();
        assert!(find_beta(1.5, DEFAULT_I0, &params).is_nan());
        assert!(find_beta(0.0, DEFAULT_I0, &params).is_nan());
    }

    #[test]
    fn compartments_stay_non_negative_and_bounded() {
        let params = Params::default();
        let n = 200;
        let t_out: Vec<f64> = (0..=n)
            .map(|i| params.t_1 + (params.t_end - params.t_1) * i as f64 / n as f64)
            .collect();
        for beta in [1e-3, 7.9e-3, 3e-2] {
            let soln = find_soln_given_beta_and_no_control(beta, DEFAULT_I0, &t_out, &params).unwrap();
            assert_eq!(soln.len(), t_out.len());
            for [s, i] in soln {
                assert!(s >= 0.0 && i >= 0.0, "s = {s}, i = {i}");
                assert!(s + i <= 1.0 + 1e-6, "s + i = {}", s + i);
            }
        }
    }

    #[test]
    fn single_strain_season_matches_two_compartment_core() {
        let params = Params::default();
        let one = initial_point_distribution(1, 0.5).unwrap();
        let fungicide = Fungicide::new(0, 1.0, None, FungicideModel::default(), &params);
        let input = SeasonInput {
            beta: 7.9e-3,
            i0: DEFAULT_I0,
            fung_dist: &one,
            host_dist: &one,
            fung_traits: &[0.5],
            host_multipliers: &[1.0],
            fungicide: &fungicide,
        };
        let outcome = simulate_season(&input, &params).unwrap();
        let sev = find_sev_given_beta_and_no_control(7.9e-3, DEFAULT_I0, &params).unwrap();
        assert!((outcome.severity - sev).abs() < 1e-6);
    }

    #[test]
    fn strains_without_mass_do_not_disturb_the_season() {
        let params = Params::default();
        let one = initial_point_distribution(1, 0.5).unwrap();
        let host = initial_point_distribution(2, 0.0).unwrap();
        let fungicide = Fungicide::new(0, 1.0, None, FungicideModel::default(), &params);
        let input = SeasonInput {
            beta: 7.9e-3,
            i0: DEFAULT_I0,
            fung_dist: &one,
            host_dist: &host,
            fung_traits: &[0.5],
            host_multipliers: &[1.0, f64::NAN],
            fungicide: &fungicide,
        };
        let outcome = simulate_season(&input, &params).unwrap();
        let sev = find_sev_given_beta_and_no_control(7.9e-3, DEFAULT_I0, &params).unwrap();
        assert!((outcome.severity - sev).abs() < 1e-6);
        assert_eq!(outcome.host_dist.mass(), &[1.0, 0.0]);
    }

    #[test]
    fn spraying_selects_for_resistance() {
        let params = Params::default();
        let n_k = 40;
        let fung_traits = trait_vec(n_k);
        let fung_dist = gamma_dist(n_k, 9.4 * 0.84, 0.84).unwrap();
        let host_dist = beta_dist(1, 1.0, 1.0).unwrap();
        let fungicide = Fungicide::new(2, 1.0, None, FungicideModel::default(), &params);

        let input = SeasonInput {
            beta: 7.9e-3,
            i0: DEFAULT_I0,
            fung_dist: &fung_dist,
            host_dist: &host_dist,
            fung_traits: &fung_traits,
            host_multipliers: &[1.0],
            fungicide: &fungicide,
        };
        let sprayed = simulate_season(&input, &params).unwrap();

        let unsprayed_fungicide = Fungicide::new(0, 1.0, None, FungicideModel::default(), &params);
        let unsprayed = simulate_season(
            &SeasonInput {
                fungicide: &unsprayed_fungicide,
                ..input
            },
            &params,
        )
        .unwrap();

        assert!(sprayed.severity < unsprayed.severity);
        assert!(sprayed.fung_dist.mean(&fung_traits) > fung_dist.mean(&fung_traits));
        assert!((unsprayed.fung_dist.mean(&fung_traits) - fung_dist.mean(&fung_traits)).abs() < 1e-9);
        assert!((sprayed.fung_dist.total() - 1.0).abs() < 1e-12);
    }
}

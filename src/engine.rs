use crate::config::{Config, Pressure};
use crate::dist::{Distribution, initial_point_distribution};
use crate::economics::{YieldModel, economic_yield};
use crate::epidemic::{SeasonInput, simulate_season};
use crate::error::{SimError, SimResult};
use crate::fungicide::Fungicide;
use crate::grid::TraitGrid;
use crate::kernel::DispersalKernel;
use crate::model::{Strategy, Trajectory, YieldRecord};
use crate::params::Params;
use rand::SeedableRng;
use rand_chacha::ChaCha12Rng;
use rand_distr::{Distribution as _, Uniform};

const MASS_TOL: f64 = 1e-6;

/// Simulation engine.
///
/// Holds the configuration of one run, the trait grids and mutation kernels
/// derived from it and the yearly disease pressure, and evolves the trait
/// distributions of every strategy year by year.
pub struct Engine {
    cfg: Config,
    run_idx: usize,
    betas: Vec<f64>,

    fung_grid: TraitGrid,
    fung_kernel: DispersalKernel,
    init_fung: Distribution,

    host_grid: Option<TraitGrid>,
    host_kernel: DispersalKernel,
    init_host: Distribution,

    yield_model: Box<dyn YieldModel>,
}

impl Engine {
    /// Create a new `Engine` for run `run_idx`.
    ///
    /// In multi mode the yearly transmission rates are drawn here, from a
    /// generator seeded by the configured seed and the run index.
    pub fn new(cfg: Config, run_idx: usize) -> SimResult<Self> {
        let betas = match cfg.pressure() {
            Pressure::Single { betas } => betas.clone(),
            Pressure::Multi { beta_choices, seed } => {
                let mut rng = ChaCha12Rng::seed_from_u64(seed.wrapping_add(run_idx as u64));
                let idx_dist = Uniform::new(0, beta_choices.len())
                    .map_err(|err| SimError::Configuration(err.to_string()))?;
                (0..cfg.n_years())
                    .map(|_| beta_choices[idx_dist.sample(&mut rng)])
                    .collect()
            }
        };

        let fung_grid = TraitGrid::new(cfg.n_k());
        let fung_kernel =
            DispersalKernel::new(&fung_grid, cfg.mutation_proportion(), cfg.mutation_scale_fung())?;
        let init_fung = cfg.initial_fung_dist()?;

        let (host_grid, host_kernel, init_host) = if cfg.host_enabled() {
            let grid = TraitGrid::new(cfg.n_l()?);
            let kernel =
                DispersalKernel::new(&grid, cfg.mutation_proportion(), cfg.mutation_scale_host()?)?;
            let init = cfg.initial_host_dist()?;
            (Some(grid), kernel, init)
        } else {
            // A single strain that every host treats alike.
            let grid = TraitGrid::new(1);
            let kernel = DispersalKernel::new(&grid, 0.0, 1.0)?;
            (None, kernel, initial_point_distribution(1, 0.0)?)
        };

        let yield_model = Box::new(cfg.yield_model().clone());

        Ok(Self {
            cfg,
            run_idx,
            betas,
            fung_grid,
            fung_kernel,
            init_fung,
            host_grid,
            host_kernel,
            init_host,
            yield_model,
        })
    }

    /// Replace the severity-to-yield model.
    #[cfg(test)]
    pub fn with_yield_model(mut self, yield_model: Box<dyn YieldModel>) -> Self {
        self.yield_model = yield_model;
        self
    }

    pub fn betas(&self) -> &[f64] {
        &self.betas
    }

    /// Every combination of spray count, cultivar and dose.
    pub fn strategies(&self) -> Vec<Strategy> {
        let host_on = match self.cfg.host_on() {
            Ok(host_on) => host_on.to_vec(),
            Err(_) => vec![false],
        };
        let mut strategies = Vec::new();
        for &sprays in self.cfg.sprays() {
            for &host_on in &host_on {
                for &dose in self.cfg.doses() {
                    strategies.push(Strategy {
                        sprays,
                        host_on,
                        dose,
                    });
                }
            }
        }
        strategies
    }

    /// Simulate every strategy.
    pub fn run_all(&self) -> SimResult<Vec<Trajectory>> {
        let strategies = self.strategies();
        let mut trajectories = Vec::with_capacity(strategies.len());
        for (i_strat, strategy) in strategies.iter().enumerate() {
            trajectories.push(self.run_strategy(strategy)?);

            let progress = 100.0 * (i_strat + 1) as f64 / strategies.len() as f64;
            log::info!("completed {progress:06.2}%");
        }
        Ok(trajectories)
    }

    /// Evolve the trait distributions under one strategy for all years.
    pub fn run_strategy(&self, strategy: &Strategy) -> SimResult<Trajectory> {
        let n_years = self.cfg.n_years();
        let replace = self.cfg.replace_cultivars().ok().flatten();

        let fung_traits = self.fung_grid.mids();
        let host_multipliers: Vec<f64> = match (&self.host_grid, strategy.host_on) {
            (Some(grid), true) => grid.mids().to_vec(),
            (Some(grid), false) => vec![1.0; grid.len()],
            (None, _) => vec![1.0],
        };

        let mut fung = self.init_fung.clone();
        let mut host = self.init_host.clone();

        let mut fung_dists = Vec::with_capacity(n_years + 1);
        let mut host_dists = Vec::with_capacity(n_years + 1);
        let mut records = Vec::with_capacity(n_years);

        for year in 0..n_years {
            if replace.is_some_and(|replace| replace[year]) {
                log::debug!("{}: replacing cultivar in year {year}", strategy.key());
                host = self.init_host.clone();
            }
            fung_dists.push(fung.clone());
            host_dists.push(host.clone());

            let fungicide = Fungicide::new(
                strategy.sprays,
                strategy.dose,
                self.cfg.decay_rate(),
                self.cfg.fungicide_model(),
                self.cfg.params(),
            );

            // Strains with unusable rate multipliers take no part in the season.
            let check_times = effect_check_times(&fungicide, self.cfg.params());
            let fung_valid: Vec<bool> = fung_traits
                .iter()
                .map(|&x| {
                    check_times
                        .iter()
                        .all(|&t| is_valid_multiplier(fungicide.effect(x, t)))
                })
                .collect();
            let host_valid: Vec<bool> =
                host_multipliers.iter().map(|&m| is_valid_multiplier(m)).collect();
            let fung_in = restrict(&fung, &fung_valid, year)?;
            let host_in = restrict(&host, &host_valid, year)?;

            let beta = self.betas[year];
            let input = SeasonInput {
                beta,
                i0: self.cfg.i0s()[year],
                fung_dist: &fung_in,
                host_dist: &host_in,
                fung_traits,
                host_multipliers: &host_multipliers,
                fungicide: &fungicide,
            };
            let outcome = simulate_season(&input, self.cfg.params())?;

            let sev = outcome.severity;
            if sev > 1.0 {
                log::warn!("{}: severity {sev} > 1 in year {year}", strategy.key());
            }
            let yld = self.yield_model.predict(sev);
            let profit = economic_yield(yld, strategy.sprays, strategy.dose, self.cfg.params());
            log::debug!("{}: year {year}, sev = {sev:.4}, yld = {yld:.4}", strategy.key());

            records.push(YieldRecord {
                run: self.run_idx,
                sprays: strategy.sprays,
                host_on: strategy.host_on,
                dose: strategy.dose,
                year,
                beta,
                sev,
                yld,
                profit,
            });

            fung = self.fung_kernel.apply(&outcome.fung_dist)?;
            host = self.host_kernel.apply(&outcome.host_dist)?;
            check_mass(&fung, year)?;
            check_mass(&host, year)?;
            log::debug!(
                "{}: year {year}, fung trait mean = {:.4}, var = {:.3e}",
                strategy.key(),
                fung.mean(fung_traits),
                fung.variance(fung_traits)
            );
        }

        fung_dists.push(fung);
        host_dists.push(host);

        Ok(Trajectory {
            strategy: *strategy,
            fung_dists,
            host_dists,
            records,
        })
    }
}

/// Season ends, fungicide breakpoints and the midpoint of every interval
/// between them, so each piece of the effect schedule is visited.
fn effect_check_times(fungicide: &Fungicide, params: &Params) -> Vec<f64> {
    let mut stops = vec![params.t_1];
    stops.extend(fungicide.breakpoints(params.t_1, params.t_end));
    stops.push(params.t_end);

    let mut times = stops.clone();
    times.extend(stops.windows(2).map(|w| 0.5 * (w[0] + w[1])));
    times
}

fn is_valid_multiplier(m: f64) -> bool {
    m.is_finite() && m >= 0.0
}

/// Drop the mass of invalid strains and renormalize.
fn restrict(dist: &Distribution, valid: &[bool], year: usize) -> SimResult<Distribution> {
    if valid.iter().all(|&v| v) {
        return Ok(dist.clone());
    }
    let n_invalid = valid.iter().filter(|&&v| !v).count();
    log::warn!("ignoring {n_invalid} strains with invalid infection rates in year {year}");

    let weights: Vec<f64> = dist
        .mass()
        .iter()
        .zip(valid)
        .map(|(&m, &v)| if v { m } else { 0.0 })
        .collect();
    if weights.iter().all(|&w| w == 0.0) {
        return Err(SimError::NoValidStrains { year });
    }
    Distribution::normalised(weights)
}

fn check_mass(dist: &Distribution, year: usize) -> SimResult<()> {
    let sum = dist.total();
    if (sum - 1.0).abs() > MASS_TOL {
        return Err(SimError::MassNotConserved { year, sum });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::{HOST_CONFIG, build_config};
    use crate::fungicide::FungicideModel;

    fn assert_unit_mass(dist: &Distribution) {
        assert!(dist.mass().iter().all(|&m| m >= 0.0));
        assert!((dist.total() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn two_year_scenario_without_host() {
        let cfg = build_config(HOST_CONFIG).unwrap().without_host();
        let engine = Engine::new(cfg, 0).unwrap();

        let strategies = engine.strategies();
        assert_eq!(
            strategies,
            vec![Strategy {
                sprays: 1,
                host_on: false,
                dose: 1.0
            }]
        );

        let traj = engine.run_strategy(&strategies[0]).unwrap();
        assert_eq!(traj.records.len(), 2);
        assert!(traj.records.iter().all(|r| r.yld >= 0.0));
        assert_eq!(traj.records[1].year, 1);

        assert_eq!(traj.fung_dists.len(), 3);
        assert_eq!(traj.host_dists.len(), 3);
        traj.fung_dists.iter().for_each(assert_unit_mass);
        traj.host_dists.iter().for_each(assert_unit_mass);
    }

    #[test]
    fn fungicide_resistance_increases_under_spraying() {
        let toml_str = HOST_CONFIG
            .replace("n_years = 2", "n_years = 4")
            .replace("sprays = [1]", "sprays = [0, 3]");
        let cfg = build_config(&toml_str).unwrap();
        let engine = Engine::new(cfg, 0).unwrap();
        let trajectories = engine.run_all().unwrap();
        assert_eq!(trajectories.len(), 2);

        let traits = engine.fung_grid.mids();
        let mean_shift = |traj: &Trajectory| {
            let first = traj.fung_dists.first().unwrap().mean(traits);
            let last = traj.fung_dists.last().unwrap().mean(traits);
            last - first
        };
        let unsprayed = &trajectories[0];
        let sprayed = &trajectories[1];
        assert!(mean_shift(sprayed) > mean_shift(unsprayed));
        assert!(sprayed.records[0].sev < unsprayed.records[0].sev);
    }

    struct FlatYield;

    impl YieldModel for FlatYield {
        fn predict(&self, _severity: f64) -> f64 {
            8.0
        }
    }

    #[test]
    fn injected_yield_model_drives_profit() {
        let cfg = build_config(HOST_CONFIG).unwrap();
        let params = cfg.params().clone();
        let engine = Engine::new(cfg, 0).unwrap().with_yield_model(Box::new(FlatYield));
        let traj = engine.run_strategy(&engine.strategies()[0]).unwrap();
        for rec in &traj.records {
            assert_eq!(rec.yld, 8.0);
            assert_eq!(rec.profit, economic_yield(8.0, 1, 1.0, &params));
        }
    }

    #[test]
    fn resistant_cultivar_lowers_severity_and_can_be_replaced() {
        let toml_str = HOST_CONFIG
            .replace("sprays = [1]", "sprays = [0]")
            .replace("host_on = [false]", "host_on = [false, true]")
            .replace("n_l = 10", "n_l = 10\nreplace_cultivars = [false, true]");
        let cfg = build_config(&toml_str).unwrap();
        let engine = Engine::new(cfg, 3).unwrap();

        let off = engine.run_strategy(&engine.strategies()[0]).unwrap();
        let on = engine.run_strategy(&engine.strategies()[1]).unwrap();

        assert!(on.records[0].sev < off.records[0].sev);
        assert_eq!(on.records[0].run, 3);
        assert_eq!(on.host_dists[1], engine.init_host);
        assert_ne!(on.host_dists[2], engine.init_host);
    }

    #[test]
    fn multi_mode_draws_are_reproducible() {
        let toml_str = HOST_CONFIG
            .replace("[scenario]\n", "[scenario]\nkind = \"multi\"\nseed = 11\n")
            .replace("n_years = 2", "n_years = 6");
        let cfg = build_config(&toml_str).unwrap();

        let a = Engine::new(cfg.clone(), 4).unwrap();
        let b = Engine::new(cfg, 4).unwrap();
        assert_eq!(a.betas(), b.betas());
        assert_eq!(a.betas().len(), 6);
        assert!(a.betas().iter().all(|beta| crate::params::ALL_BETAS.contains(beta)));
    }

    #[test]
    fn effect_is_checked_while_the_fungicide_is_active() {
        let params = Params::default();
        let model = FungicideModel::NoDecay;

        let unsprayed = Fungicide::new(0, 1.0, None, model, &params);
        let times = effect_check_times(&unsprayed, &params);
        assert!(times.iter().all(|&t| unsprayed.concentration(t) == 0.0));

        let sprayed = Fungicide::new(2, 1.0, None, model, &params);
        let times = effect_check_times(&sprayed, &params);
        let active = times.iter().filter(|&&t| sprayed.concentration(t) > 0.0).count();
        assert!(active >= 2);
    }

    #[test]
    fn restricting_every_strain_fails() {
        let dist = initial_point_distribution(3, 0.5).unwrap();
        assert!(matches!(
            restrict(&dist, &[true, false, true], 0),
            Err(SimError::NoValidStrains { year: 0 })
        ));
        let kept = restrict(&dist, &[true, true, true], 0).unwrap();
        assert_eq!(kept, dist);
    }
}

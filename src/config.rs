use crate::dist::{
    Distribution, beta_dist, fung_dist_params, gamma_dist, host_dist_params,
};
use crate::economics::LinearYield;
use crate::epidemic::find_beta;
use crate::error::{SimError, SimResult};
use crate::fitted::{CsvFitted, FittedSource, lookup};
use crate::fungicide::FungicideModel;
use crate::params::{DEFAULT_BETA, DEFAULT_I0, DEFAULT_MUTATION_SCALE, MUTATION_PROP, Params};
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::{fmt::Debug, fs, ops::RangeBounds, path::Path};

/// Scenario section of the configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioFile {
    #[serde(default)]
    pub kind: PressureKind,
    pub n_years: usize,
    /// Number of sprays per year of each strategy.
    pub sprays: Vec<u32>,
    /// Whether each strategy grows the resistant cultivar.
    pub host_on: Vec<bool>,
    /// Dose levels to scan; each is applied every year.
    #[serde(default = "default_doses")]
    pub doses: Vec<f64>,
    /// Transmission rate of a single-mode run.
    pub beta: Option<f64>,
    /// Uncontrolled final severity to calibrate the transmission rate from.
    pub target_severity: Option<f64>,
    /// Transmission rates a multi-mode run draws from.
    pub beta_choices: Option<Vec<f64>>,
    #[serde(default = "default_i0")]
    pub i0: f64,
    #[serde(default)]
    pub seed: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PressureKind {
    #[default]
    Single,
    Multi,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PathogenFile {
    pub n_k: usize,
    #[serde(default = "default_mutation_prop")]
    pub mutation_proportion: f64,
    #[serde(default = "default_mutation_scale")]
    pub mutation_scale_fung: f64,
    #[serde(default = "default_mutation_scale")]
    pub mutation_scale_host: f64,
    /// Fitted table, relative to the simulation directory.
    #[serde(default = "default_fitted_file")]
    pub fitted_file: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FungicideFile {
    pub decay_rate: Option<f64>,
    #[serde(default)]
    pub model: FungicideModel,
    /// Overrides of the fitted fungicide trait parameters.
    pub k_mu: Option<f64>,
    pub k_b: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HostFile {
    pub n_l: usize,
    /// Whether to reset the host trait distribution at the start of each year.
    pub replace_cultivars: Option<Vec<bool>>,
}

/// Contents of `config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub scenario: ScenarioFile,
    pub pathogen: PathogenFile,
    #[serde(default)]
    pub fungicide: FungicideFile,
    pub host: Option<HostFile>,
    #[serde(default)]
    pub params: Params,
    #[serde(default)]
    pub yield_model: LinearYield,
}

fn default_doses() -> Vec<f64> {
    vec![1.0]
}

fn default_i0() -> f64 {
    DEFAULT_I0
}

fn default_mutation_prop() -> f64 {
    MUTATION_PROP
}

fn default_mutation_scale() -> f64 {
    DEFAULT_MUTATION_SCALE
}

fn default_fitted_file() -> String {
    "fitted.csv".to_string()
}

/// Disease pressure over the years of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Pressure {
    /// The same transmission rates in every run.
    Single { betas: Vec<f64> },
    /// A rate drawn uniformly from `beta_choices` for every year of every run.
    Multi { beta_choices: Vec<f64>, seed: u64 },
}

/// Host resistance traits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostTraits {
    pub n_l: usize,
    pub host_on: Vec<bool>,
    pub replace_cultivars: Option<Vec<bool>>,
    pub mutation_scale_host: f64,
    pub l_mu: f64,
    pub l_b: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HostSetting {
    Enabled(HostTraits),
    Disabled,
}

/// Validated configuration of a simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    n_years: usize,
    sprays: Vec<u32>,
    doses: Vec<f64>,
    pressure: Pressure,
    i0s: Vec<f64>,

    n_k: usize,
    k_mu: f64,
    k_b: f64,
    decay_rate: Option<f64>,
    fungicide_model: FungicideModel,

    mutation_proportion: f64,
    mutation_scale_fung: f64,

    host: HostSetting,

    params: Params,
    yield_model: LinearYield,
}

impl Config {
    /// Load a [`Config`] from a TOML file.
    ///
    /// The fitted table is resolved relative to the directory of the file.
    ///
    /// # Errors
    /// Returns an error if either file cannot be read or parsed, if the fitted
    /// lookup fails, or if the configuration values are invalid.
    pub fn from_file<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let contents = fs::read_to_string(file).with_context(|| format!("failed to read {file:?}"))?;
        let config_file: ConfigFile =
            toml::from_str(&contents).context("failed to deserialize config")?;

        let dir = file.parent().unwrap_or(Path::new("."));
        let fitted = CsvFitted::new(dir.join(&config_file.pathogen.fitted_file));

        Self::build(config_file, &fitted)
    }

    /// Validate a parsed configuration file and resolve its fitted parameters.
    pub fn build(file: ConfigFile, fitted: &dyn FittedSource) -> Result<Self> {
        validate(&file).context("failed to validate config")?;

        let ConfigFile {
            scenario,
            pathogen,
            fungicide,
            host,
            params,
            yield_model,
        } = file;

        let rows = fitted.rows().context("failed to read fitted parameters")?;
        let fit = lookup(
            &rows,
            pathogen.mutation_proportion,
            pathogen.mutation_scale_fung,
            pathogen.mutation_scale_host,
        )?;

        let n_years = scenario.n_years;
        let i0s = vec![scenario.i0; n_years];

        let pressure = match scenario.kind {
            PressureKind::Single => {
                let beta = match (scenario.target_severity, scenario.beta) {
                    (Some(sev), _) => {
                        let beta = find_beta(sev, scenario.i0, &params);
                        if beta.is_nan() {
                            return Err(SimError::Configuration(format!(
                                "no transmission rate reproduces severity {sev}"
                            ))
                            .into());
                        }
                        log::info!("calibrated beta = {beta} from severity {sev}");
                        beta
                    }
                    (None, Some(beta)) => beta,
                    (None, None) => DEFAULT_BETA,
                };
                Pressure::Single {
                    betas: vec![beta; n_years],
                }
            }
            PressureKind::Multi => Pressure::Multi {
                beta_choices: scenario
                    .beta_choices
                    .unwrap_or_else(|| crate::params::ALL_BETAS.to_vec()),
                seed: scenario.seed,
            },
        };

        let is_asymptote = matches!(fungicide.model, FungicideModel::Asymptote { .. });
        let (default_k_mu, default_k_b) = if is_asymptote {
            (0.99, 0.5)
        } else {
            (fit.k_mu, fit.k_b)
        };

        let host = match host {
            Some(host) => HostSetting::Enabled(HostTraits {
                n_l: host.n_l,
                host_on: scenario.host_on.clone(),
                replace_cultivars: host.replace_cultivars,
                mutation_scale_host: pathogen.mutation_scale_host,
                l_mu: fit.l_mu,
                l_b: fit.l_b,
            }),
            None => HostSetting::Disabled,
        };

        let cfg = Self {
            n_years,
            sprays: scenario.sprays,
            doses: scenario.doses,
            pressure,
            i0s,
            n_k: pathogen.n_k,
            k_mu: fungicide.k_mu.unwrap_or(default_k_mu),
            k_b: fungicide.k_b.unwrap_or(default_k_b),
            decay_rate: fungicide.decay_rate,
            fungicide_model: fungicide.model,
            mutation_proportion: pathogen.mutation_proportion,
            mutation_scale_fung: pathogen.mutation_scale_fung,
            host,
            params,
            yield_model,
        };

        if is_asymptote {
            return Ok(cfg.without_host());
        }
        Ok(cfg)
    }

    pub fn n_years(&self) -> usize {
        self.n_years
    }

    pub fn sprays(&self) -> &[u32] {
        &self.sprays
    }

    pub fn doses(&self) -> &[f64] {
        &self.doses
    }

    pub fn pressure(&self) -> &Pressure {
        &self.pressure
    }

    /// Initial infection of each year.
    pub fn i0s(&self) -> &[f64] {
        &self.i0s
    }

    pub fn n_k(&self) -> usize {
        self.n_k
    }

    pub fn decay_rate(&self) -> Option<f64> {
        self.decay_rate
    }

    pub fn fungicide_model(&self) -> FungicideModel {
        self.fungicide_model
    }

    pub fn mutation_proportion(&self) -> f64 {
        self.mutation_proportion
    }

    pub fn mutation_scale_fung(&self) -> f64 {
        self.mutation_scale_fung
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn yield_model(&self) -> &LinearYield {
        &self.yield_model
    }

    /// The same configuration with host traits removed.
    pub fn without_host(self) -> Self {
        Self {
            host: HostSetting::Disabled,
            ..self
        }
    }

    pub fn host_enabled(&self) -> bool {
        matches!(self.host, HostSetting::Enabled(_))
    }

    pub fn n_l(&self) -> SimResult<usize> {
        self.host_attr("n_l", |h| h.n_l)
    }

    pub fn host_on(&self) -> SimResult<&[bool]> {
        match &self.host {
            HostSetting::Enabled(host) => Ok(&host.host_on),
            HostSetting::Disabled => Err(SimError::HostDisabled("host_on")),
        }
    }

    pub fn replace_cultivars(&self) -> SimResult<Option<&[bool]>> {
        match &self.host {
            HostSetting::Enabled(host) => Ok(host.replace_cultivars.as_deref()),
            HostSetting::Disabled => Err(SimError::HostDisabled("replace_cultivars")),
        }
    }

    pub fn mutation_scale_host(&self) -> SimResult<f64> {
        self.host_attr("mutation_scale_host", |h| h.mutation_scale_host)
    }

    pub fn l_mu(&self) -> SimResult<f64> {
        self.host_attr("l_mu", |h| h.l_mu)
    }

    pub fn l_b(&self) -> SimResult<f64> {
        self.host_attr("l_b", |h| h.l_b)
    }

    fn host_attr<T>(&self, name: &'static str, get: impl Fn(&HostTraits) -> T) -> SimResult<T> {
        match &self.host {
            HostSetting::Enabled(host) => Ok(get(host)),
            HostSetting::Disabled => Err(SimError::HostDisabled(name)),
        }
    }

    /// Asymptote of the curvature dose response, if that model is used.
    #[cfg(test)]
    pub fn asymptote(&self) -> Option<f64> {
        match self.fungicide_model {
            FungicideModel::Curvature { asymptote } => Some(asymptote),
            _ => None,
        }
    }

    /// Fungicide trait distribution before the first season.
    pub fn initial_fung_dist(&self) -> SimResult<Distribution> {
        match self.fungicide_model {
            FungicideModel::Asymptote { .. } => {
                let (a, b) = host_dist_params(self.k_mu, self.k_b);
                beta_dist(self.n_k, a, b)
            }
            _ => {
                let (a, b) = fung_dist_params(self.k_mu, self.k_b);
                gamma_dist(self.n_k, a, b)
            }
        }
    }

    /// Host trait distribution before the first season.
    pub fn initial_host_dist(&self) -> SimResult<Distribution> {
        let (a, b) = host_dist_params(self.l_mu()?, self.l_b()?);
        beta_dist(self.n_l()?, a, b)
    }
}

fn validate(file: &ConfigFile) -> Result<()> {
    let scenario = &file.scenario;
    check_num(scenario.n_years, 1..=1000).context("invalid number of years")?;
    if scenario.sprays.is_empty() || scenario.host_on.is_empty() || scenario.doses.is_empty() {
        bail!("sprays, host_on and doses must not be empty");
    }
    for &dose in &scenario.doses {
        check_num(dose, 0.0..=10.0).context("invalid dose")?;
    }
    check_num(scenario.i0, f64::MIN_POSITIVE..1.0).context("invalid initial infection")?;
    if let Some(beta) = scenario.beta {
        check_num(beta, 0.0..=1.0).context("invalid transmission rate")?;
    }
    if let Some(sev) = scenario.target_severity {
        check_num(sev, 0.0..=1.0).context("invalid target severity")?;
    }
    if let Some(choices) = &scenario.beta_choices {
        if choices.is_empty() {
            bail!("beta_choices must not be empty");
        }
        for &beta in choices {
            check_num(beta, 0.0..=1.0).context("invalid transmission rate choice")?;
        }
    }

    let pathogen = &file.pathogen;
    check_num(pathogen.n_k, 1..=2000).context("invalid number of fungicide trait bins")?;
    check_num(pathogen.mutation_proportion, 0.0..=1.0).context("invalid mutation proportion")?;
    check_positive(pathogen.mutation_scale_fung).context("invalid fungicide mutation scale")?;
    check_positive(pathogen.mutation_scale_host).context("invalid host mutation scale")?;

    let fungicide = &file.fungicide;
    if let Some(decay_rate) = fungicide.decay_rate {
        check_positive(decay_rate).context("invalid decay rate")?;
    }
    match fungicide.model {
        FungicideModel::Curvature { asymptote } => {
            check_num(asymptote, 0.0..=1.0).context("invalid asymptote")?
        }
        FungicideModel::Asymptote { curvature } => {
            check_positive(curvature).context("invalid curvature")?
        }
        FungicideModel::NoDecay => {}
    }

    match &file.host {
        Some(host) => {
            check_num(host.n_l, 1..=2000).context("invalid number of host trait bins")?;
            if let Some(replace) = &host.replace_cultivars {
                check_num(replace.len(), scenario.n_years..=scenario.n_years)
                    .context("replace_cultivars needs one entry per year")?;
            }
        }
        None => {
            if scenario.host_on.iter().any(|&on| on) {
                bail!("host_on requires a [host] section");
            }
        }
    }

    let params = &file.params;
    if !(params.t_1 < params.t_2 && params.t_2 < params.t_3 && params.t_3 < params.t_end) {
        bail!("season timings must be increasing");
    }
    check_num(params.host_growth_initial_area, f64::MIN_POSITIVE..=1.0)
        .context("invalid initial host area")?;

    Ok(())
}

fn check_num<T, R>(num: T, range: R) -> Result<()>
where
    T: PartialOrd + Debug,
    R: RangeBounds<T> + Debug,
{
    if !range.contains(&num) {
        bail!("number must be in the range {range:?}, but is {num:?}");
    }
    Ok(())
}

fn check_positive(num: f64) -> Result<()> {
    if !(num > 0.0 && num.is_finite()) {
        bail!("number must be positive, but is {num}");
    }
    Ok(())
}

use crate::analysis::{Analyzer, write_csv};
use crate::config::Config;
use crate::engine::Engine;
use crate::epidemic::find_beta;
use crate::model::Trajectory;
use crate::params::DEFAULT_I0;
use anyhow::{Context, Result, bail};
use glob::glob;
use std::{
    fs,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

const ANALYSIS_FILES: [&str; 3] = ["combined.csv", "best_doses.csv", "best_doses_cumulative.csv"];

pub struct Manager {
    sim_dir: PathBuf,
    cfg: Config,
}

impl Manager {
    pub fn new<P: AsRef<Path>>(sim_dir: P) -> Result<Self> {
        let sim_dir = sim_dir.as_ref().to_path_buf();

        let cfg =
            Config::from_file(sim_dir.join("config.toml")).context("failed to construct cfg")?;
        log::info!("{cfg:#?}");

        Ok(Self { sim_dir, cfg })
    }

    pub fn create_run(&self) -> Result<()> {
        let run_idx = self.count_run_dirs().context("failed to count run dirs")?;

        let engine = Engine::new(self.cfg.clone(), run_idx).context("failed to construct engine")?;
        log::info!("betas = {:?}", engine.betas());

        let trajectories = engine.run_all().context("failed to run strategies")?;

        let run_dir = self.run_dir(run_idx);
        fs::create_dir_all(&run_dir).with_context(|| format!("failed to create {run_dir:?}"))?;
        log::info!("created {run_dir:?}");

        if let Err(error) = save_run(&run_dir, &trajectories) {
            fs::remove_dir_all(&run_dir).ok();
            return Err(error.context(format!("failed to save {run_dir:?}")));
        }
        log::info!("saved {run_dir:?}");

        Ok(())
    }

    pub fn analyze_sim(&self) -> Result<()> {
        let n_runs = self.count_run_dirs().context("failed to count run dirs")?;
        if n_runs == 0 {
            bail!("no runs to analyze in {:?}", self.sim_dir);
        }

        let mut analyzer = Analyzer::new();
        for run_idx in 0..n_runs {
            analyzer
                .add_file(self.run_dir(run_idx).join("yields.csv"))
                .context("failed to add file")?;
        }
        log::info!("loaded {} records from {n_runs} runs", analyzer.n_records());

        analyzer
            .save_results(&self.sim_dir)
            .context("failed to save results")?;

        Ok(())
    }

    pub fn clean_sim(&self) -> Result<()> {
        let n_runs = self.count_run_dirs().context("failed to count run dirs")?;
        for run_idx in 0..n_runs {
            let run_dir = self.run_dir(run_idx);
            fs::remove_dir_all(&run_dir)
                .with_context(|| format!("failed to remove {run_dir:?}"))?;
            log::info!("removed {run_dir:?}");
        }

        for name in ANALYSIS_FILES {
            let file = self.sim_dir.join(name);
            if file.is_file() {
                fs::remove_file(&file).with_context(|| format!("failed to remove {file:?}"))?;
                log::info!("removed {file:?}");
            }
        }

        Ok(())
    }

    pub fn calibrate(&self, severity: f64, i0: Option<f64>) -> Result<f64> {
        let i0 = i0
            .or_else(|| self.cfg.i0s().first().copied())
            .unwrap_or(DEFAULT_I0);

        let beta = find_beta(severity, i0, self.cfg.params());
        if beta.is_nan() {
            bail!("no transmission rate reproduces severity {severity} with i0 = {i0}");
        }
        log::info!("severity = {severity}, i0 = {i0}, beta = {beta:.6e}");

        Ok(beta)
    }

    fn count_run_dirs(&self) -> Result<usize> {
        let pattern = self.sim_dir.join("run-*");
        let pattern = pattern.to_str().context("pattern is not valid UTF-8")?;
        let count = glob(pattern)
            .context("failed to glob run dirs")?
            .filter_map(Result::ok)
            .filter(|p| p.is_dir())
            .count();
        Ok(count)
    }

    fn run_dir(&self, run_idx: usize) -> PathBuf {
        self.sim_dir.join(format!("run-{run_idx:04}"))
    }
}

fn save_run(run_dir: &Path, trajectories: &[Trajectory]) -> Result<()> {
    let records: Vec<_> = trajectories
        .iter()
        .flat_map(|traj| traj.records.iter().cloned())
        .collect();
    let yields_file = run_dir.join("yields.csv");
    write_csv(&yields_file, &records).with_context(|| format!("failed to write {yields_file:?}"))?;

    let trajectory_file = run_dir.join("trajectory.msgpack");
    save_trajectories(&trajectory_file, trajectories)
        .with_context(|| format!("failed to write {trajectory_file:?}"))?;

    Ok(())
}

fn save_trajectories<P: AsRef<Path>>(file: P, trajectories: &[Trajectory]) -> Result<()> {
    let file = fs::File::create(file).context("failed to create file")?;
    let mut writer = BufWriter::new(file);
    rmp_serde::encode::write(&mut writer, trajectories).context("failed to serialize trajectories")?;
    writer.flush().context("failed to flush writer stream")?;
    Ok(())
}

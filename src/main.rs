mod analysis;
mod config;
mod dist;
mod economics;
mod engine;
mod epidemic;
mod error;
mod fitted;
mod fungicide;
mod grid;
mod kernel;
mod manager;
mod model;
mod ode;
mod optim;
mod params;
mod stats;

use crate::manager::Manager;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(version, about)]
struct CLI {
    #[arg(long)]
    sim_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Create,

    Analyze,

    Clean,

    Calibrate {
        #[arg(long)]
        severity: f64,

        #[arg(long)]
        i0: Option<f64>,
    },
}

fn main() {
    env_logger::Builder::new()
        .format_timestamp_millis()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    if let Err(error) = run_cli() {
        log::error!("{error:#?}");
        std::process::exit(1);
    }
}

fn run_cli() -> Result<()> {
    let args = CLI::parse();
    log::info!("{args:#?}");

    let mgr = Manager::new(args.sim_dir).context("failed to construct mgr")?;

    match args.command {
        Command::Create => mgr.create_run()?,
        Command::Analyze => mgr.analyze_sim()?,
        Command::Clean => mgr.clean_sim()?,
        Command::Calibrate { severity, i0 } => {
            let beta = mgr.calibrate(severity, i0)?;
            println!("{beta}");
        }
    }

    Ok(())
}

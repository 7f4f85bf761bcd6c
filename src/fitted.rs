//! Fitted shape parameters of the initial trait distributions.

use crate::error::{SimError, SimResult};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const FUNGICIDE_TRAIT: &str = "Fungicide";
pub const HOST_TRAIT: &str = "Mariboss";

/// One row of the fitted-parameters table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedRow {
    pub mutation_prop: f64,
    pub mutation_scale_fung: f64,
    pub mutation_scale_host: f64,
    #[serde(rename = "trait")]
    pub trait_name: String,
    pub mu: f64,
    pub b: f64,
}

/// Distribution shape parameters matching one set of mutation parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FittedParams {
    pub k_mu: f64,
    pub k_b: f64,
    pub l_mu: f64,
    pub l_b: f64,
}

/// Where the fitted table comes from.
pub trait FittedSource {
    fn rows(&self) -> Result<Vec<FittedRow>>;
}

impl FittedSource for Vec<FittedRow> {
    fn rows(&self) -> Result<Vec<FittedRow>> {
        Ok(self.clone())
    }
}

/// Fitted table stored as CSV.
pub struct CsvFitted {
    file: PathBuf,
}

impl CsvFitted {
    pub fn new<P: AsRef<Path>>(file: P) -> Self {
        Self {
            file: file.as_ref().to_path_buf(),
        }
    }
}

impl FittedSource for CsvFitted {
    fn rows(&self) -> Result<Vec<FittedRow>> {
        let file = &self.file;
        let mut reader =
            csv::Reader::from_path(file).with_context(|| format!("failed to open {file:?}"))?;
        let mut rows = Vec::new();
        for row in reader.deserialize() {
            rows.push(row.with_context(|| format!("failed to parse row of {file:?}"))?);
        }
        Ok(rows)
    }
}

fn is_close(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-8 + 1e-5 * b.abs()
}

/// Select the fungicide and host rows fitted for the given mutation parameters.
///
/// Exactly two rows must match, one for each trait.
pub fn lookup(
    rows: &[FittedRow],
    mutation_prop: f64,
    mutation_scale_fung: f64,
    mutation_scale_host: f64,
) -> SimResult<FittedParams> {
    let matches: Vec<_> = rows
        .iter()
        .filter(|row| {
            is_close(row.mutation_prop, mutation_prop)
                && is_close(row.mutation_scale_fung, mutation_scale_fung)
                && is_close(row.mutation_scale_host, mutation_scale_host)
        })
        .collect();

    if matches.len() != 2 {
        return Err(SimError::Configuration(format!(
            "expected 2 fitted rows for mutation_prop = {mutation_prop}, \
             mutation_scale_fung = {mutation_scale_fung}, \
             mutation_scale_host = {mutation_scale_host}, found {}",
            matches.len()
        )));
    }

    let find = |name: &str| {
        matches
            .iter()
            .find(|row| row.trait_name == name)
            .ok_or_else(|| SimError::Configuration(format!("no fitted row for trait {name}")))
    };
    let fung = find(FUNGICIDE_TRAIT)?;
    let host = find(HOST_TRAIT)?;

    Ok(FittedParams {
        k_mu: fung.mu,
        k_b: fung.b,
        l_mu: host.mu,
        l_b: host.b,
    })
}

//! Aggregation of yearly yields across runs and doses.

use crate::model::YieldRecord;
use crate::stats::{Accumulator, median};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, path::Path};

/// Median outcome of one (strategy, dose, year) across runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinedRecord {
    pub sprays: u32,
    pub host_on: bool,
    pub dose: f64,
    pub year: usize,
    pub n_runs: usize,
    pub sev: f64,
    pub yld: f64,
    pub profit: f64,
    pub yld_mean: f64,
    pub yld_std: f64,
}

/// Dose with the highest yield in one year of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestDose {
    pub run: usize,
    pub sprays: u32,
    pub host_on: bool,
    pub year: usize,
    pub best_dose: f64,
    /// Number of dose increments that raise the yield.
    pub n_pos_diff: usize,
}

/// Dose with the highest yield accumulated up to a year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CumulativeBest {
    pub run: usize,
    pub sprays: u32,
    pub host_on: bool,
    pub year: usize,
    pub dose: f64,
    pub yld: f64,
    pub cum_yld: f64,
}

type RunYearKey = (usize, u32, bool, usize);
// Doses are non-negative, so their bit patterns sort like their values.
type DoseYearKey = (u32, bool, u64, usize);

/// Median yield, severity and profit per (sprays, host_on, dose, year).
pub fn combine_median(records: &[YieldRecord]) -> Vec<CombinedRecord> {
    let mut groups: BTreeMap<DoseYearKey, Vec<&YieldRecord>> = BTreeMap::new();
    for rec in records {
        groups
            .entry((rec.sprays, rec.host_on, rec.dose.to_bits(), rec.year))
            .or_default()
            .push(rec);
    }

    groups
        .into_iter()
        .map(|((sprays, host_on, dose_bits, year), recs)| {
            let ylds: Vec<f64> = recs.iter().map(|r| r.yld).collect();
            let sevs: Vec<f64> = recs.iter().map(|r| r.sev).collect();
            let profits: Vec<f64> = recs.iter().map(|r| r.profit).collect();

            let mut acc = Accumulator::new();
            ylds.iter().for_each(|&y| acc.add(y));
            let report = acc.report();

            CombinedRecord {
                sprays,
                host_on,
                dose: f64::from_bits(dose_bits),
                year,
                n_runs: recs.len(),
                sev: median(&sevs),
                yld: median(&ylds),
                profit: median(&profits),
                yld_mean: report.mean,
                yld_std: report.std_dev,
            }
        })
        .collect()
}

fn group_by_run_and_year(records: &[YieldRecord]) -> BTreeMap<RunYearKey, Vec<&YieldRecord>> {
    let mut groups: BTreeMap<RunYearKey, Vec<&YieldRecord>> = BTreeMap::new();
    for rec in records {
        groups
            .entry((rec.run, rec.sprays, rec.host_on, rec.year))
            .or_default()
            .push(rec);
    }
    for recs in groups.values_mut() {
        recs.sort_by(|a, b| a.dose.total_cmp(&b.dose));
    }
    groups
}

/// Best dose and the number of positive yield increments along the dose axis.
pub fn summarise_by_run_and_year(records: &[YieldRecord]) -> Vec<BestDose> {
    group_by_run_and_year(records)
        .into_iter()
        .filter_map(|((run, sprays, host_on, year), recs)| {
            let n_pos_diff = recs.windows(2).filter(|w| w[1].yld > w[0].yld).count();
            // Ties go to the lowest dose.
            let best = recs
                .iter()
                .fold(None::<&&YieldRecord>, |best, rec| match best {
                    Some(b) if b.yld >= rec.yld => Some(b),
                    _ => Some(rec),
                })?;
            Some(BestDose {
                run,
                sprays,
                host_on,
                year,
                best_dose: best.dose,
                n_pos_diff,
            })
        })
        .collect()
}

/// Best dose per run and year judged by yield accumulated since year 0.
pub fn summarise_by_run_and_year_cumulative(records: &[YieldRecord]) -> Vec<CumulativeBest> {
    // Cumulative yield per (run, strategy, dose), in year order.
    let mut by_dose: BTreeMap<(usize, u32, bool, u64), Vec<&YieldRecord>> = BTreeMap::new();
    for rec in records {
        by_dose
            .entry((rec.run, rec.sprays, rec.host_on, rec.dose.to_bits()))
            .or_default()
            .push(rec);
    }

    let mut cumulative: BTreeMap<RunYearKey, Vec<CumulativeBest>> = BTreeMap::new();
    for ((run, sprays, host_on, dose_bits), mut recs) in by_dose {
        recs.sort_by_key(|r| r.year);
        let mut cum_yld = 0.0;
        for rec in recs {
            cum_yld += rec.yld;
            cumulative
                .entry((run, sprays, host_on, rec.year))
                .or_default()
                .push(CumulativeBest {
                    run,
                    sprays,
                    host_on,
                    year: rec.year,
                    dose: f64::from_bits(dose_bits),
                    yld: rec.yld,
                    cum_yld,
                });
        }
    }

    cumulative
        .into_values()
        .filter_map(|candidates| {
            candidates
                .into_iter()
                .reduce(|best, cand| if cand.cum_yld > best.cum_yld { cand } else { best })
        })
        .collect()
}

/// Collects the yield records of every run and writes the summaries.
pub struct Analyzer {
    records: Vec<YieldRecord>,
}

impl Analyzer {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    pub fn add_file<P: AsRef<Path>>(&mut self, file: P) -> Result<()> {
        let file = file.as_ref();
        let mut reader =
            csv::Reader::from_path(file).with_context(|| format!("failed to open {file:?}"))?;
        for rec in reader.deserialize() {
            self.records
                .push(rec.with_context(|| format!("failed to parse record of {file:?}"))?);
        }
        Ok(())
    }

    pub fn n_records(&self) -> usize {
        self.records.len()
    }

    pub fn save_results<P: AsRef<Path>>(&self, dir: P) -> Result<()> {
        let dir = dir.as_ref();
        write_csv(dir.join("combined.csv"), &combine_median(&self.records))?;
        write_csv(dir.join("best_doses.csv"), &summarise_by_run_and_year(&self.records))?;
        write_csv(
            dir.join("best_doses_cumulative.csv"),
            &summarise_by_run_and_year_cumulative(&self.records),
        )?;
        Ok(())
    }
}

pub fn write_csv<P: AsRef<Path>, T: Serialize>(file: P, rows: &[T]) -> Result<()> {
    let file = file.as_ref();
    let mut writer =
        csv::Writer::from_path(file).with_context(|| format!("failed to create {file:?}"))?;
    for row in rows {
        writer.serialize(row).context("failed to serialize row")?;
    }
    writer.flush().context("failed to flush writer stream")?;
    Ok(())
}

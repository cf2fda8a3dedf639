//! PSD tables and run summaries on disk.
//!
//! A run writes `<stem>.psd.csv` and `<stem>.summary.json` into its archive
//! directory, where the stem is `<model label>.seed<seed>`.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use csv::{ReaderBuilder, WriterBuilder};
use serde::Serialize;
use tracing::info;

use crate::aggregate::AggregateResult;
use crate::config::{SimulationConfig, Termination};
use crate::{Result, SnorpError};

pub const OUTPUT_SCHEMA_VERSION: &str = "1.0.0";
pub const PSD_HEADER: [&str; 4] = ["log10_freq", "log10_psd", "log10_theory", "log10_psd_std"];

/// One row of a PSD table, all values in log10.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PsdRow {
    pub log10_freq: f64,
    pub log10_psd: f64,
    /// NaN when the model has no closed-form spectrum.
    pub log10_theory: f64,
    pub log10_psd_std: f64,
}

#[derive(Clone, Debug, Serialize)]
pub struct RunSummary {
    pub schema_version: String,
    pub generated_at: String,
    pub model: String,
    pub seed: u64,
    pub repeats: usize,
    pub n_freq: usize,
    pub termination: Termination,
    pub config: SimulationConfig,
    pub empty_trials: usize,
    pub total_pulses: usize,
    pub mean_duration: f64,
    pub duty_cycle: f64,
    pub mid_band_slope: Option<f64>,
    pub has_theory: bool,
}

impl RunSummary {
    pub fn from_result(result: &AggregateResult) -> Self {
        Self {
            schema_version: OUTPUT_SCHEMA_VERSION.to_string(),
            generated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            model: result.config.label(),
            seed: result.seed,
            repeats: result.repeats,
            n_freq: result.freqs.len(),
            termination: result.config.termination,
            config: result.config.clone(),
            empty_trials: result.empty_trials,
            total_pulses: result.total_pulses,
            mean_duration: result.mean_duration,
            duty_cycle: result.duty_cycle,
            mid_band_slope: result.mid_band_slope(),
            has_theory: result.theory_psd.is_some(),
        }
    }
}

/// Paths written for one run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunArtifacts {
    pub psd_csv: PathBuf,
    pub summary_json: PathBuf,
}

pub fn output_stem(config: &SimulationConfig, seed: u64) -> String {
    format!("{}.seed{seed}", config.label())
}

pub fn ensure_archive_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)?;
    Ok(())
}

pub fn psd_rows(result: &AggregateResult) -> Vec<PsdRow> {
    let std = result.std_psd();
    result
        .freqs
        .iter()
        .enumerate()
        .map(|(i, f)| PsdRow {
            log10_freq: f.log10(),
            log10_psd: result.mean_psd[i].log10(),
            log10_theory: result
                .theory_psd
                .as_ref()
                .map_or(f64::NAN, |theory| theory[i].log10()),
            log10_psd_std: std[i].log10(),
        })
        .collect()
}

fn fmt_value(v: f64) -> String {
    format!("{v:.4}")
}

pub fn write_psd_csv(path: &Path, rows: &[PsdRow]) -> Result<()> {
    let mut wtr = WriterBuilder::new().has_headers(false).from_path(path)?;
    wtr.write_record(PSD_HEADER)?;
    for row in rows {
        wtr.write_record([
            fmt_value(row.log10_freq),
            fmt_value(row.log10_psd),
            fmt_value(row.log10_theory),
            fmt_value(row.log10_psd_std),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

/// Parses a table written by [`write_psd_csv`]. `NaN` and `-inf` cells are
/// accepted.
pub fn read_psd_csv(path: &Path) -> Result<Vec<PsdRow>> {
    let malformed = |reason: String| SnorpError::MalformedTable {
        path: path.display().to_string(),
        reason,
    };

    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)?;
    let header = rdr.headers()?.clone();
    if header.iter().ne(PSD_HEADER) {
        return Err(malformed(format!("unexpected header {:?}", header)));
    }

    let mut rows = Vec::new();
    for (line, record) in rdr.records().enumerate() {
        let record = record?;
        if record.len() != 4 {
            return Err(malformed(format!(
                "row {}: expected 4 columns, found {}",
                line + 1,
                record.len()
            )));
        }
        let mut values = [0.0; 4];
        for (slot, cell) in values.iter_mut().zip(record.iter()) {
            *slot = cell
                .parse::<f64>()
                .map_err(|_| malformed(format!("row {}: cannot parse {cell:?}", line + 1)))?;
        }
        rows.push(PsdRow {
            log10_freq: values[0],
            log10_psd: values[1],
            log10_theory: values[2],
            log10_psd_std: values[3],
        });
    }
    if rows.is_empty() {
        return Err(malformed("table has no rows".to_string()));
    }
    Ok(rows)
}

pub fn write_summary_json(path: &Path, summary: &RunSummary) -> Result<()> {
    let payload = serde_json::to_string_pretty(summary)?;
    fs::write(path, payload)?;
    Ok(())
}

/// Writes the PSD table and summary of `result` into `dir`.
pub fn write_run(dir: &Path, result: &AggregateResult) -> Result<RunArtifacts> {
    ensure_archive_dir(dir)?;
    let stem = output_stem(&result.config, result.seed);
    let artifacts = RunArtifacts {
        psd_csv: dir.join(format!("{stem}.psd.csv")),
        summary_json: dir.join(format!("{stem}.summary.json")),
    };

    write_psd_csv(&artifacts.psd_csv, &psd_rows(result))?;
    write_summary_json(&artifacts.summary_json, &RunSummary::from_result(result))?;
    info!(
        psd = %artifacts.psd_csv.display(),
        summary = %artifacts.summary_json.display(),
        "wrote run outputs"
    );
    Ok(artifacts)
}

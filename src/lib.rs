//! SNORP - Sequences of Non-Overlapping Rectangular Pulses
//!
//! Monte Carlo generation of pulse-gap signals whose pulse durations, gap
//! durations and magnitudes follow independently chosen distributions, and
//! estimation of their power spectral density. Heavy-tailed (Pareto) gaps
//! reproduce the 1/f noise studied in the accompanying paper.

pub mod aggregate;
pub mod config;
pub mod distributions;
pub mod logging;
pub mod output;
pub mod sequence;
pub mod special;
pub mod spectrum;
pub mod theory;

use thiserror::Error;

pub use aggregate::{run_trial, run_trials, AggregateResult, RunStage, RunningStats, TrialResult};
pub use config::{FrequencySpec, SimulationConfig, Termination};
pub use distributions::{build_sampler, DistributionKind, DurationSampler};
pub use sequence::{Event, Pulse, PulseTrain, Sequence};
pub use spectrum::{estimate_psd, fit_log_log_slope, FrequencyGrid, SpectralAccumulator};

#[derive(Debug, Error)]
pub enum SnorpError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("sampling exhausted: {0}")]
    SamplingExhaustion(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("malformed PSD table {path}: {reason}")]
    MalformedTable { path: String, reason: String },
}

pub type Result<T> = std::result::Result<T, SnorpError>;

pub(crate) fn invalid(message: impl Into<String>) -> SnorpError {
    SnorpError::InvalidParameter(message.into())
}

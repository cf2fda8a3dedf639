//! Repeated independent trials and their averaged spectrum.
//!
//! Trial `k` draws from a ChaCha8 generator seeded with the run seed and
//! switched to stream `k`. Its randomness therefore depends only on
//! `(seed, k)`: the first `R1` trials of an `R2` run are the trials of an
//! `R1` run, and parallel scheduling cannot change any draw.

use std::fmt;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{SimulationConfig, Termination};
use crate::sequence::{ModelSamplers, PulseTrain};
use crate::spectrum::{fit_log_log_slope, FrequencyGrid, SpectralAccumulator};
use crate::theory::theoretical_psd;
use crate::{invalid, Result, SnorpError};

/// Lifecycle of a run; every trial passes through the middle stages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStage {
    Idle,
    Sampling,
    Building,
    Estimating,
    Aggregating,
    Done,
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunStage::Idle => "idle",
            RunStage::Sampling => "sampling",
            RunStage::Building => "building",
            RunStage::Estimating => "estimating",
            RunStage::Aggregating => "aggregating",
            RunStage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Per-bin running mean and variance (Welford).
#[derive(Clone, Debug, PartialEq)]
pub struct RunningStats {
    count: usize,
    mean: Vec<f64>,
    m2: Vec<f64>,
}

impl RunningStats {
    pub fn new(bins: usize) -> Self {
        Self {
            count: 0,
            mean: vec![0.0; bins],
            m2: vec![0.0; bins],
        }
    }

    pub fn push(&mut self, values: &[f64]) -> Result<()> {
        if values.len() != self.mean.len() {
            return Err(invalid(format!(
                "trial produced {} bins, expected {}",
                values.len(),
                self.mean.len()
            )));
        }
        self.count += 1;
        let n = self.count as f64;
        for ((mean, m2), &x) in self.mean.iter_mut().zip(&mut self.m2).zip(values) {
            let delta = x - *mean;
            *mean += delta / n;
            *m2 += delta * (x - *mean);
        }
        Ok(())
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    /// Unbiased sample variance; zero until two trials are in.
    pub fn variance(&self) -> Vec<f64> {
        if self.count < 2 {
            return vec![0.0; self.m2.len()];
        }
        let denom = (self.count - 1) as f64;
        self.m2.iter().map(|m2| m2 / denom).collect()
    }
}

/// Outcome of a single trial.
#[derive(Clone, Debug, PartialEq)]
pub struct TrialResult {
    pub index: usize,
    pub power: Vec<f64>,
    pub pulses: usize,
    pub total_duration: f64,
    /// Time spent in the pulse state.
    pub pulse_time: f64,
}

impl TrialResult {
    pub fn is_empty(&self) -> bool {
        self.pulses == 0
    }
}

/// Averaged spectrum of a run plus the statistics written to its summary.
#[derive(Clone, Debug, Serialize)]
pub struct AggregateResult {
    /// Configuration with its seed resolved.
    pub config: SimulationConfig,
    pub seed: u64,
    pub repeats: usize,
    pub freqs: Vec<f64>,
    pub mean_psd: Vec<f64>,
    pub variance_psd: Vec<f64>,
    pub theory_psd: Option<Vec<f64>>,
    pub empty_trials: usize,
    pub total_pulses: usize,
    pub mean_duration: f64,
    /// Fraction of signal time spent in the pulse state, over all trials.
    pub duty_cycle: f64,
}

impl AggregateResult {
    pub fn std_psd(&self) -> Vec<f64> {
        self.variance_psd.iter().map(|v| v.sqrt()).collect()
    }

    /// Log-log slope of the mean PSD over the middle two decades of the grid
    /// (or the whole grid when it is narrower).
    pub fn mid_band_slope(&self) -> Option<f64> {
        let (first, last) = (*self.freqs.first()?, *self.freqs.last()?);
        let centre = (first.log10() + last.log10()) / 2.0;
        let half_width = ((last.log10() - first.log10()) / 2.0).min(1.0);
        let band = (
            10f64.powf(centre - half_width),
            10f64.powf(centre + half_width),
        );
        fit_log_log_slope(&self.freqs, &self.mean_psd, band)
    }
}

/// Generator of trial `index` in a run seeded with `seed`.
pub fn trial_rng(seed: u64, index: usize) -> ChaCha8Rng {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    rng.set_stream(index as u64);
    rng
}

/// Runs one trial: draws its train and streams the pulses into the
/// spectral estimator.
pub fn run_trial(
    samplers: &ModelSamplers,
    termination: Termination,
    grid: &FrequencyGrid,
    seed: u64,
    index: usize,
) -> Result<TrialResult> {
    debug!(trial = index, stage = %RunStage::Sampling, "seeding trial");
    let mut rng = trial_rng(seed, index);
    let mut train = PulseTrain::new(samplers, termination, &mut rng);
    let mut accumulator = SpectralAccumulator::new(grid);
    let mut area = 0.0;
    let mut pulse_time = 0.0;

    debug!(trial = index, stage = %RunStage::Building, "drawing pulse train");
    for event in train.by_ref() {
        if let Some(pulse) = event?.pulse {
            area += pulse.magnitude * pulse.duration;
            pulse_time += pulse.duration;
            accumulator.push(&pulse);
        }
    }
    let total_duration = train.clock();
    let pulses = accumulator.pulses();

    debug!(trial = index, stage = %RunStage::Estimating, pulses, total_duration, "estimating PSD");
    if pulses == 0 {
        warn!(trial = index, total_duration, "trial produced no pulses; its PSD is zero");
    }
    let mean_level = if total_duration > 0.0 {
        area / total_duration
    } else {
        0.0
    };
    let power = accumulator.finish(total_duration, mean_level);

    Ok(TrialResult {
        index,
        power,
        pulses,
        total_duration,
        pulse_time,
    })
}

/// Runs every trial of `config` and averages the spectra.
///
/// A missing seed is drawn at random and reported in the result. Fails
/// before sampling on invalid parameters, and with
/// [`SnorpError::SamplingExhaustion`] when no trial produced a pulse.
pub fn run_trials(config: &SimulationConfig) -> Result<AggregateResult> {
    config.validate()?;
    let config = config.with_resolved_seed();
    let seed = config.seed.unwrap_or_default();

    let grid = config.frequency_grid()?;
    let samplers = ModelSamplers::from_config(&config)?;
    info!(
        model = %config.label(),
        seed,
        repeats = config.repeats,
        n_freq = grid.len(),
        parallel = config.parallel,
        "starting run"
    );
    debug!(stage = %RunStage::Idle, "frequency grid ready");

    let trial = |index: usize| run_trial(&samplers, config.termination, &grid, seed, index);
    let trials: Vec<TrialResult> = if config.parallel {
        (0..config.repeats)
            .into_par_iter()
            .map(trial)
            .collect::<Result<_>>()?
    } else {
        (0..config.repeats).map(trial).collect::<Result<_>>()?
    };

    let result = aggregate_trials(config, seed, &grid, &trials)?;
    info!(
        seed,
        repeats = result.repeats,
        empty_trials = result.empty_trials,
        total_pulses = result.total_pulses,
        stage = %RunStage::Done,
        "run finished"
    );
    Ok(result)
}

/// Folds trials in index order.
pub fn aggregate_trials(
    config: SimulationConfig,
    seed: u64,
    grid: &FrequencyGrid,
    trials: &[TrialResult],
) -> Result<AggregateResult> {
    debug!(stage = %RunStage::Aggregating, trials = trials.len(), "folding trial spectra");
    let mut stats = RunningStats::new(grid.len());
    let mut empty_trials = 0;
    let mut total_pulses = 0;
    let mut duration_sum = 0.0;
    let mut pulse_time = 0.0;
    for trial in trials {
        stats.push(&trial.power)?;
        if trial.is_empty() {
            empty_trials += 1;
        }
        total_pulses += trial.pulses;
        duration_sum += trial.total_duration;
        pulse_time += trial.pulse_time;
    }

    if trials.is_empty() || empty_trials == trials.len() {
        return Err(SnorpError::SamplingExhaustion(format!(
            "none of {} trials produced a pulse within the limits",
            trials.len()
        )));
    }

    let mean_duration = duration_sum / trials.len() as f64;
    let theory_psd = theoretical_psd(&config, grid.freqs(), mean_duration);
    Ok(AggregateResult {
        seed,
        repeats: trials.len(),
        freqs: grid.freqs().to_vec(),
        mean_psd: stats.mean().to_vec(),
        variance_psd: stats.variance(),
        theory_psd,
        empty_trials,
        total_pulses,
        mean_duration,
        duty_cycle: if duration_sum > 0.0 {
            pulse_time / duration_sum
        } else {
            0.0
        },
        config,
    })
}

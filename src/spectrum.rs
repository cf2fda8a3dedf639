//! Power spectral density of pulse trains.
//!
//! The estimate for a realization `x(t)` on `[0, T]` is
//! `S(f) = 2 / T * |X(f)|^2`, with `X` the Fourier transform of `x - mean(x)`.
//! Every rectangle has a closed-form transform, so the estimate is exact for
//! the realized signal and no time discretization is involved.

use std::f64::consts::PI;

use num_complex::Complex64;

use crate::sequence::{Pulse, Sequence};
use crate::special::sinc;
use crate::{invalid, Result};

/// Positive, strictly increasing frequencies shared by all trials of a run.
#[derive(Clone, Debug, PartialEq)]
pub struct FrequencyGrid {
    freqs: Vec<f64>,
}

impl FrequencyGrid {
    /// `count` log-spaced frequencies from `min` to `max`, both included.
    pub fn log_spaced(min: f64, max: f64, count: usize) -> Result<Self> {
        if count == 0 {
            return Err(invalid("frequency grid must have at least one point"));
        }
        if !(min > 0.0) || !max.is_finite() || min >= max {
            return Err(invalid(format!(
                "frequency grid needs 0 < min < max, got [{min}, {max}]"
            )));
        }
        if count == 1 {
            return Ok(Self { freqs: vec![min] });
        }

        let (lo, hi) = (min.log10(), max.log10());
        let step = (hi - lo) / (count - 1) as f64;
        let mut freqs: Vec<f64> = (0..count)
            .map(|k| 10f64.powf(lo + step * k as f64))
            .collect();
        freqs[0] = min;
        freqs[count - 1] = max;
        Ok(Self { freqs })
    }

    /// Explicit grid; frequencies must be positive and strictly increasing.
    pub fn from_freqs(freqs: Vec<f64>) -> Result<Self> {
        if freqs.is_empty() {
            return Err(invalid("frequency grid must have at least one point"));
        }
        if freqs.iter().any(|f| !f.is_finite() || *f <= 0.0) {
            return Err(invalid("frequencies must be finite and > 0"));
        }
        if freqs.windows(2).any(|w| w[1] <= w[0]) {
            return Err(invalid("frequencies must be strictly increasing"));
        }
        Ok(Self { freqs })
    }

    /// Rounds every frequency to a multiple of `1 / duration`, dropping zero
    /// and repeated multiples.
    pub fn snap_to_natural(self, duration: f64) -> Result<Self> {
        if !(duration > 0.0) || !duration.is_finite() {
            return Err(invalid(format!(
                "natural frequencies need a finite duration > 0, got {duration}"
            )));
        }
        let mut freqs: Vec<f64> = Vec::with_capacity(self.freqs.len());
        for f in self.freqs {
            let multiple = (f * duration).round();
            if multiple < 1.0 {
                continue;
            }
            let snapped = multiple / duration;
            if freqs.last().map_or(true, |&last| snapped > last) {
                freqs.push(snapped);
            }
        }
        if freqs.is_empty() {
            return Err(invalid(format!(
                "no natural frequency of duration {duration} inside the requested range"
            )));
        }
        Ok(Self { freqs })
    }

    pub fn freqs(&self) -> &[f64] {
        &self.freqs
    }

    pub fn len(&self) -> usize {
        self.freqs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.freqs.is_empty()
    }
}

/// Streaming Fourier accumulator: one pass over the pulses, `O(n_freq)`
/// memory.
#[derive(Clone, Debug)]
pub struct SpectralAccumulator {
    omegas: Vec<f64>,
    sums: Vec<Complex64>,
    pulses: usize,
}

impl SpectralAccumulator {
    pub fn new(grid: &FrequencyGrid) -> Self {
        let omegas: Vec<f64> = grid.freqs().iter().map(|f| 2.0 * PI * f).collect();
        let sums = vec![Complex64::new(0.0, 0.0); omegas.len()];
        Self {
            omegas,
            sums,
            pulses: 0,
        }
    }

    pub fn push(&mut self, pulse: &Pulse) {
        let centre = pulse.start + 0.5 * pulse.duration;
        let area = pulse.magnitude * pulse.duration;
        for (sum, &omega) in self.sums.iter_mut().zip(&self.omegas) {
            *sum += rect_transform(omega, area, pulse.duration, centre);
        }
        self.pulses += 1;
    }

    pub fn pulses(&self) -> usize {
        self.pulses
    }

    /// Removes the mean level over `[0, total_duration]` and normalizes.
    pub fn finish(self, total_duration: f64, mean_level: f64) -> Vec<f64> {
        if self.pulses == 0 || !(total_duration > 0.0) {
            return vec![0.0; self.omegas.len()];
        }
        let norm = 2.0 / total_duration;
        let mean_area = mean_level * total_duration;
        self.sums
            .into_iter()
            .zip(&self.omegas)
            .map(|(sum, &omega)| {
                let mean_part =
                    rect_transform(omega, mean_area, total_duration, 0.5 * total_duration);
                norm * (sum - mean_part).norm_sqr()
            })
            .collect()
    }
}

// Fourier transform of a rectangle of the given area and width centred at
// `centre`: area * sinc(w width / 2) * exp(-i w centre).
fn rect_transform(omega: f64, area: f64, width: f64, centre: f64) -> Complex64 {
    let (sin, cos) = (omega * centre).sin_cos();
    Complex64::new(cos, -sin) * (area * sinc(0.5 * omega * width))
}

/// PSD of a whole sequence on `grid`, one value per frequency.
pub fn estimate_psd(sequence: &Sequence, grid: &FrequencyGrid) -> Vec<f64> {
    let mut accumulator = SpectralAccumulator::new(grid);
    for pulse in sequence.pulses() {
        accumulator.push(pulse);
    }
    accumulator.finish(sequence.total_duration(), sequence.mean_level())
}

/// Least-squares slope of `log10 power` against `log10 freq` for
/// frequencies inside `band` (inclusive). Non-positive powers are skipped;
/// `None` with fewer than two usable points.
pub fn fit_log_log_slope(freqs: &[f64], power: &[f64], band: (f64, f64)) -> Option<f64> {
    let points: Vec<(f64, f64)> = freqs
        .iter()
        .zip(power)
        .filter(|&(&f, &p)| f >= band.0 && f <= band.1 && f > 0.0 && p > 0.0)
        .map(|(&f, &p)| (f.log10(), p.log10()))
        .collect();
    if points.len() < 2 {
        return None;
    }

    let n = points.len() as f64;
    let mean_x = points.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = points.iter().map(|p| p.1).sum::<f64>() / n;
    let (mut sxy, mut sxx) = (0.0, 0.0);
    for (x, y) in &points {
        sxy += (x - mean_x) * (y - mean_y);
        sxx += (x - mean_x) * (x - mean_x);
    }
    (sxx > 0.0).then(|| sxy / sxx)
}

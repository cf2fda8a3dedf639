//! Closed-form spectra of the pulse models that have one.
//!
//! All forms assume a constant pulse magnitude `a`. `nu` is the mean pulse
//! rate `1 / (mean pulse + mean gap)`; an unbounded Pareto law is cut at the
//! supplied horizon (the realized signal duration) before its mean is taken.

use std::f64::consts::PI;

use crate::config::SimulationConfig;
use crate::distributions::{pareto_mean, DistributionKind};
use crate::special::{gamma, EULER_GAMMA};

// Tolerance for treating a Pareto power as exactly 1.
const UNIT_POWER_EPS: f64 = 1e-12;

/// Theoretical PSD of `config` at `freqs`, `None` for models without a
/// known closed form.
pub fn theoretical_psd(config: &SimulationConfig, freqs: &[f64], horizon: f64) -> Option<Vec<f64>> {
    let magnitude = match config.magnitude {
        DistributionKind::Constant { value } => value,
        _ => return None,
    };

    match (&config.pulse, &config.gap) {
        (DistributionKind::Poisson { mean: theta }, DistributionKind::Poisson { mean: tau }) => {
            Some(poisson_poisson(freqs, magnitude, *theta, *tau))
        }
        (
            DistributionKind::Poisson { mean: theta },
            DistributionKind::Pareto { power, low, high },
        ) => {
            let gap = EffectivePareto::new(*power, *low, *high, horizon)?;
            let nu = 1.0 / (theta + gap.mean);
            let spectrum = if *theta >= gap.low {
                long_pulses_pareto_gaps(freqs, magnitude, nu, &gap)
            } else {
                short_pulses_pareto_gaps(freqs, magnitude, nu, *theta, &gap)
            };
            Some(spectrum)
        }
        (pulse, DistributionKind::Pareto { power, low, high })
            if (power - 1.0).abs() < UNIT_POWER_EPS =>
        {
            let gap = EffectivePareto::new(*power, *low, *high, horizon)?;
            let mean_pulse = match *pulse {
                DistributionKind::Constant { value } => value,
                DistributionKind::Uniform { low, high } => 0.5 * (low + high),
                DistributionKind::Pareto { power, low, high } => {
                    EffectivePareto::new(power, low, high, horizon)?.mean
                }
                DistributionKind::Poisson { .. } => return None,
            };
            let nu = 1.0 / (mean_pulse + gap.mean);
            Some(
                freqs
                    .iter()
                    .map(|f| magnitude * magnitude * nu * gap.low / f)
                    .collect(),
            )
        }
        _ => None,
    }
}

// Pareto law with its upper cutoff resolved.
struct EffectivePareto {
    power: f64,
    low: f64,
    mean: f64,
}

impl EffectivePareto {
    fn new(power: f64, low: f64, high: Option<f64>, horizon: f64) -> Option<Self> {
        let high = high.unwrap_or(horizon);
        if !(high > low) {
            return None;
        }
        let mean = pareto_mean(power, low, Some(high))?;
        Some(Self { power, low, mean })
    }

    fn is_unit_power(&self) -> bool {
        (self.power - 1.0).abs() < UNIT_POWER_EPS
    }
}

/// Lorentzian of the Poisson pulse / Poisson gap telegraph signal.
fn poisson_poisson(freqs: &[f64], magnitude: f64, theta: f64, tau: f64) -> Vec<f64> {
    let nu = 1.0 / (theta + tau);
    let rate = 1.0 / theta + 1.0 / tau;
    let scale = 4.0 * magnitude * magnitude * nu;
    freqs
        .iter()
        .map(|f| {
            let omega = 2.0 * PI * f;
            scale / (rate * rate + omega * omega)
        })
        .collect()
}

// Pulses at least as long as the shortest gap.
fn long_pulses_pareto_gaps(
    freqs: &[f64],
    magnitude: f64,
    nu: f64,
    gap: &EffectivePareto,
) -> Vec<f64> {
    let p = gap.power;
    let low = gap.low;
    let scale = magnitude * magnitude * nu;
    freqs
        .iter()
        .map(|f| {
            let omega = 2.0 * PI * f;
            let shape = if gap.is_unit_power() {
                low / f
            } else if p < 2.0 {
                4.0 * low * low
                    * gamma(1.0 - p)
                    * (PI * p / 2.0).cos()
                    * (omega * low).powf(p - 2.0)
            } else {
                2.0 * low * low * p / (p - 2.0)
            };
            scale * shape
        })
        .collect()
}

// Pulses shorter than the shortest gap.
fn short_pulses_pareto_gaps(
    freqs: &[f64],
    magnitude: f64,
    nu: f64,
    theta: f64,
    gap: &EffectivePareto,
) -> Vec<f64> {
    let p = gap.power;
    let low = gap.low;
    let scale = 4.0 * magnitude * magnitude * nu * theta * theta;
    freqs
        .iter()
        .map(|f| {
            let omega = 2.0 * PI * f;
            let shape = if gap.is_unit_power() {
                let log_term = 1.0 - EULER_GAMMA - (omega * low).ln();
                1.0 / (f * low * (PI * PI + 4.0 * log_term * log_term))
            } else if p < 1.0 {
                (PI * p / 2.0).cos() / gamma(1.0 - p) / (omega * low).powf(p)
            } else if p < 2.0 {
                let ratio = (p - 1.0) / p;
                ratio * ratio * (PI * p / 2.0).cos() * gamma(1.0 - p)
                    / (omega * low).powf(2.0 - p)
            } else {
                (p - 1.0) * (p - 1.0) / (2.0 * (p - 2.0) * p)
            };
            scale * shape
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Termination;

    fn config(pulse: DistributionKind, gap: DistributionKind) -> SimulationConfig {
        SimulationConfig {
            pulse,
            gap,
            termination: Termination::Duration(1e4),
            ..SimulationConfig::default()
        }
    }

    #[test]
    fn lorentzian_plateau_and_corner() {
        let config = config(
            DistributionKind::Poisson { mean: 1.0 },
            DistributionKind::Poisson { mean: 1.0 },
        );
        // rate = 2, nu = 1/2: plateau 4 * 0.5 / 4, halved at w = 2
        let corner = 2.0 / (2.0 * PI);
        let psd = theoretical_psd(&config, &[1e-9, corner], 1e4).unwrap();
        assert!((psd[0] - 0.5).abs() < 1e-12);
        assert!((psd[1] - 0.25).abs() < 1e-12);
    }

    #[test]
    fn long_pulses_with_unit_power_gaps_are_one_over_f() {
        let config = config(
            DistributionKind::Poisson { mean: 100.0 },
            DistributionKind::pareto(1.0, 1.0, 1e3),
        );
        let freqs = [1e-3, 1e-2, 1e-1];
        let psd = theoretical_psd(&config, &freqs, 1e4).unwrap();
        let nu = 1.0 / (100.0 + pareto_mean(1.0, 1.0, Some(1e3)).unwrap());
        for (f, s) in freqs.iter().zip(&psd) {
            assert!((s - nu / f).abs() < 1e-12 * s);
        }
    }

    #[test]
    fn every_pareto_branch_is_positive() {
        for power in [0.5, 1.0, 1.5, 2.5] {
            for theta in [0.1, 10.0] {
                let config = config(
                    DistributionKind::Poisson { mean: theta },
                    DistributionKind::pareto(power, 1.0, 1e4),
                );
                let psd = theoretical_psd(&config, &[1e-3, 1e-2, 1e-1], 1e4).unwrap();
                for s in psd {
                    assert!(s.is_finite() && s > 0.0, "power {power}, theta {theta}: {s}");
                }
            }
        }
    }

    #[test]
    fn unbounded_gaps_use_the_horizon() {
        let bounded = config(
            DistributionKind::Constant { value: 5.0 },
            DistributionKind::pareto(1.0, 1.0, 1e4),
        );
        let unbounded = config(
            DistributionKind::Constant { value: 5.0 },
            DistributionKind::pareto(1.0, 1.0, -1.0),
        );
        let a = theoretical_psd(&bounded, &[0.01], 1e4).unwrap();
        let b = theoretical_psd(&unbounded, &[0.01], 1e4).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn models_without_closed_form_give_none() {
        let uniform_gaps = config(
            DistributionKind::Poisson { mean: 1.0 },
            DistributionKind::Uniform { low: 0.0, high: 2.0 },
        );
        assert!(theoretical_psd(&uniform_gaps, &[1.0], 1e4).is_none());

        let steep_gaps = config(
            DistributionKind::Constant { value: 1.0 },
            DistributionKind::pareto(1.5, 1.0, 1e3),
        );
        assert!(theoretical_psd(&steep_gaps, &[1.0], 1e4).is_none());

        let mut random_heights = config(
            DistributionKind::Poisson { mean: 1.0 },
            DistributionKind::Poisson { mean: 1.0 },
        );
        random_heights.magnitude = DistributionKind::Uniform { low: 0.5, high: 1.5 };
        assert!(theoretical_psd(&random_heights, &[1.0], 1e4).is_none());
    }
}

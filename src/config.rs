use std::f64::consts::PI;
use std::fs;
use std::path::Path;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::distributions::DistributionKind;
use crate::spectrum::FrequencyGrid;
use crate::{invalid, Result};

pub const DEFAULT_N_FREQ: usize = 100;
pub const DEFAULT_N_EVENTS: usize = 10_000;
/// Upper bound (exclusive) of automatically generated seeds.
pub const AUTO_SEED_RANGE: u64 = 1 << 20;

/// How a pulse train ends. The two limits are mutually exclusive.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// Stop after this many gap-pulse events.
    Events(usize),
    /// Stop at this total signal duration, truncating the last event.
    Duration(f64),
}

impl Termination {
    pub fn validate(&self) -> Result<()> {
        match *self {
            Termination::Events(0) => Err(invalid("n_events must be > 0")),
            Termination::Duration(t) if !t.is_finite() || t <= 0.0 => {
                Err(invalid(format!("duration must be finite and > 0, got {t}")))
            }
            _ => Ok(()),
        }
    }
}

/// Requested frequency grid. Missing bounds are derived from the model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrequencySpec {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub count: usize,
    /// Round frequencies to multiples of `1 / duration` (duration mode only).
    pub natural: bool,
}

impl Default for FrequencySpec {
    fn default() -> Self {
        Self {
            min: None,
            max: None,
            count: DEFAULT_N_FREQ,
            natural: false,
        }
    }
}

impl FrequencySpec {
    pub fn validate(&self) -> Result<()> {
        if self.count == 0 {
            return Err(invalid("frequency count must be > 0"));
        }
        for (name, bound) in [("min_freq", self.min), ("max_freq", self.max)] {
            if let Some(value) = bound {
                if !value.is_finite() || value <= 0.0 {
                    return Err(invalid(format!("{name} must be finite and > 0, got {value}")));
                }
            }
        }
        if let (Some(min), Some(max)) = (self.min, self.max) {
            if min >= max {
                return Err(invalid(format!(
                    "frequency range inverted: min_freq {min} >= max_freq {max}"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub pulse: DistributionKind,
    pub gap: DistributionKind,
    #[serde(default = "default_magnitude")]
    pub magnitude: DistributionKind,
    pub termination: Termination,
    #[serde(default)]
    pub frequencies: FrequencySpec,
    #[serde(default = "default_repeats")]
    pub repeats: usize,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default = "default_parallel")]
    pub parallel: bool,
}

fn default_magnitude() -> DistributionKind {
    DistributionKind::Constant { value: 1.0 }
}

fn default_repeats() -> usize {
    1
}

fn default_parallel() -> bool {
    true
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            pulse: DistributionKind::Poisson { mean: 1.0 },
            gap: DistributionKind::Poisson { mean: 1.0 },
            magnitude: default_magnitude(),
            termination: Termination::Events(DEFAULT_N_EVENTS),
            frequencies: FrequencySpec::default(),
            repeats: default_repeats(),
            seed: None,
            parallel: default_parallel(),
        }
    }
}

impl SimulationConfig {
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let config: SimulationConfig = toml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Eager validation of every parameter; nothing is sampled before this
    /// passes.
    pub fn validate(&self) -> Result<()> {
        self.pulse.validate("pulse duration")?;
        self.gap.validate("gap duration")?;
        self.magnitude.validate("pulse magnitude")?;
        self.termination.validate()?;
        self.frequencies.validate()?;

        if self.repeats == 0 {
            return Err(invalid("repeats must be > 0"));
        }
        if self.frequencies.natural && !matches!(self.termination, Termination::Duration(_)) {
            return Err(invalid(
                "natural frequencies require a duration-limited sequence",
            ));
        }
        Ok(())
    }

    /// Expected total signal duration, `None` when a mean diverges in event
    /// mode.
    pub fn expected_duration(&self) -> Option<f64> {
        match self.termination {
            Termination::Duration(t) => Some(t),
            Termination::Events(n) => {
                let per_event = self.pulse.mean()? + self.gap.mean()?;
                Some(n as f64 * per_event)
            }
        }
    }

    /// Frequency bounds, filling the missing ones automatically.
    ///
    /// Event-limited Poisson/Poisson runs cover the whole Lorentzian:
    /// `1 / (n (theta + tau))` up to `2 n / min(theta, tau)`. Every other
    /// model uses its time scales: `0.1 / (2 pi longest)` and
    /// `10 / (2 pi shortest)`.
    pub fn frequency_bounds(&self) -> Result<(f64, f64)> {
        let (auto_min, auto_max) = self.automatic_bounds();
        let min = self.frequencies.min.unwrap_or(auto_min);
        let max = self.frequencies.max.unwrap_or(auto_max);
        if min >= max {
            return Err(invalid(format!(
                "resolved frequency range inverted: min_freq {min} >= max_freq {max}"
            )));
        }
        Ok((min, max))
    }

    fn automatic_bounds(&self) -> (f64, f64) {
        if let (
            DistributionKind::Poisson { mean: theta },
            DistributionKind::Poisson { mean: tau },
            Termination::Events(n),
        ) = (&self.pulse, &self.gap, self.termination)
        {
            let n = n as f64;
            return (1.0 / (n * (theta + tau)), 2.0 * n / theta.min(*tau));
        }

        let shortest = self.pulse.shortest_scale().min(self.gap.shortest_scale());
        let horizon = self.expected_duration().unwrap_or_else(|| match self.termination {
            Termination::Events(n) => n as f64 * (self.pulse.shortest_scale() + shortest),
            Termination::Duration(t) => t,
        });
        let longest = [self.pulse.longest_scale(), self.gap.longest_scale()]
            .into_iter()
            .map(|scale| scale.unwrap_or(horizon).min(horizon))
            .fold(shortest, f64::max);
        (0.1 / (2.0 * PI * longest), 10.0 / (2.0 * PI * shortest))
    }

    /// The grid shared by every trial of a run.
    pub fn frequency_grid(&self) -> Result<FrequencyGrid> {
        let (min, max) = self.frequency_bounds()?;
        let grid = FrequencyGrid::log_spaced(min, max, self.frequencies.count)?;
        match (self.frequencies.natural, self.termination) {
            (true, Termination::Duration(t)) => grid.snap_to_natural(t),
            _ => Ok(grid),
        }
    }

    /// Model part of the output file stem, e.g. `poiss1.pareto1_1_inf`.
    pub fn label(&self) -> String {
        let mut label = format!("{}.{}", self.pulse.label(), self.gap.label());
        if self.magnitude != default_magnitude() {
            label.push('.');
            label.push_str(&self.magnitude.label());
        }
        label
    }

    /// Returns a copy whose seed is fixed, drawing one in
    /// `[0, AUTO_SEED_RANGE)` when none was configured.
    pub fn with_resolved_seed(&self) -> Self {
        let mut config = self.clone();
        config.seed = Some(config.seed.unwrap_or_else(random_seed));
        config
    }
}

/// Fresh seed in `[0, AUTO_SEED_RANGE)`.
pub fn random_seed() -> u64 {
    rand::thread_rng().gen_range(0..AUTO_SEED_RANGE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SnorpError;

    #[test]
    fn default_config_is_valid() {
        SimulationConfig::default().validate().unwrap();
    }

    #[test]
    fn zero_repeats_and_empty_limits_are_rejected() {
        let config = SimulationConfig {
            repeats: 0,
            ..SimulationConfig::default()
        };
        assert!(matches!(config.validate(), Err(SnorpError::InvalidParameter(_))));

        for termination in [
            Termination::Events(0),
            Termination::Duration(0.0),
            Termination::Duration(f64::INFINITY),
        ] {
            let config = SimulationConfig {
                termination,
                ..SimulationConfig::default()
            };
            assert!(config.validate().is_err(), "{termination:?} accepted");
        }
    }

    #[test]
    fn inverted_frequency_range_is_rejected() {
        let config = SimulationConfig {
            frequencies: FrequencySpec {
                min: Some(10.0),
                max: Some(1.0),
                ..FrequencySpec::default()
            },
            ..SimulationConfig::default()
        };
        assert!(matches!(config.validate(), Err(SnorpError::InvalidParameter(_))));
    }

    #[test]
    fn natural_frequencies_need_a_duration_limit() {
        let config = SimulationConfig {
            frequencies: FrequencySpec {
                natural: true,
                ..FrequencySpec::default()
            },
            ..SimulationConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn automatic_bounds_follow_model_time_scales() {
        let config = SimulationConfig {
            pulse: DistributionKind::Poisson { mean: 1.0 },
            gap: DistributionKind::pareto(1.0, 1.0, 1e4),
            termination: Termination::Events(1_000_000),
            ..SimulationConfig::default()
        };
        let (min, max) = config.frequency_bounds().unwrap();
        assert!((min - 0.1 / (2.0 * PI * 1e4)).abs() < 1e-15);
        assert!((max - 10.0 / (2.0 * PI)).abs() < 1e-12);
    }

    #[test]
    fn event_limited_poisson_bounds_cover_the_lorentzian() {
        let config = SimulationConfig {
            pulse: DistributionKind::Poisson { mean: 1.0 },
            gap: DistributionKind::Poisson { mean: 1.0 },
            termination: Termination::Events(10_000),
            ..SimulationConfig::default()
        };
        let (min, max) = config.frequency_bounds().unwrap();
        assert!((min - 5e-5).abs() < 1e-18);
        assert!((max - 2e4).abs() < 1e-9);

        let uneven = SimulationConfig {
            pulse: DistributionKind::Poisson { mean: 10.0 },
            gap: DistributionKind::Poisson { mean: 0.5 },
            termination: Termination::Events(100),
            ..SimulationConfig::default()
        };
        let (min, max) = uneven.frequency_bounds().unwrap();
        assert!((min - 1.0 / 1050.0).abs() < 1e-15);
        assert!((max - 400.0).abs() < 1e-9);

        let explicit = SimulationConfig {
            frequencies: FrequencySpec {
                max: Some(10.0),
                ..FrequencySpec::default()
            },
            ..config
        };
        assert_eq!(explicit.frequency_bounds().unwrap(), (5e-5, 10.0));
    }

    #[test]
    fn unbounded_gaps_are_capped_by_the_duration() {
        let config = SimulationConfig {
            pulse: DistributionKind::Poisson { mean: 100.0 },
            gap: DistributionKind::pareto(1.0, 1.0, -1.0),
            termination: Termination::Duration(1e4),
            ..SimulationConfig::default()
        };
        let (min, _) = config.frequency_bounds().unwrap();
        assert!((min - 0.1 / (2.0 * PI * 1e4)).abs() < 1e-15);
    }

    #[test]
    fn label_omits_default_magnitude() {
        let mut config = SimulationConfig::default();
        assert_eq!(config.label(), "poiss1.poiss1");
        config.magnitude = DistributionKind::Uniform { low: 0.5, high: 2.0 };
        assert_eq!(config.label(), "poiss1.poiss1.unif0p5_2");
    }

    #[test]
    fn toml_round_trip_keeps_every_field() {
        let raw = r#"
            repeats = 10
            seed = 7267
            parallel = false
            termination = { duration = 10000.0 }
            pulse = { kind = "poisson", mean = 100.0 }
            gap = { kind = "pareto", power = 1.0, low = 1.0 }

            [frequencies]
            min = 1e-4
            max = 10.0
            count = 50
            natural = true
        "#;
        let config: SimulationConfig = toml::from_str(raw).unwrap();
        config.validate().unwrap();
        assert_eq!(config.repeats, 10);
        assert_eq!(config.seed, Some(7267));
        assert_eq!(config.termination, Termination::Duration(1e4));
        assert_eq!(config.gap, DistributionKind::pareto(1.0, 1.0, -1.0));
        assert_eq!(config.magnitude, DistributionKind::Constant { value: 1.0 });
        assert_eq!(config.frequencies.count, 50);
        assert!(config.frequencies.natural);
    }

    #[test]
    fn resolved_seed_is_kept_when_given() {
        let config = SimulationConfig {
            seed: Some(42),
            ..SimulationConfig::default()
        };
        assert_eq!(config.with_resolved_seed().seed, Some(42));
        let auto = SimulationConfig::default().with_resolved_seed();
        assert!(auto.seed.unwrap() < AUTO_SEED_RANGE);
    }
}

use rand::{Rng, RngCore};
use rand_distr::{Distribution, Exp, Pareto, Uniform};
use serde::{Deserialize, Serialize};

use crate::{invalid, Result};

/// Distribution family for pulse durations, gap durations or magnitudes.
///
/// `Pareto` draws from the law with density `~ x^-(power + 1)` on
/// `[low, high]`; `high = None` removes the upper cutoff.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DistributionKind {
    Poisson {
        mean: f64,
    },
    Pareto {
        power: f64,
        low: f64,
        #[serde(default)]
        high: Option<f64>,
    },
    Uniform {
        low: f64,
        high: f64,
    },
    Constant {
        value: f64,
    },
}

/// Source of independent samples from one [`DistributionKind`].
pub trait DurationSampler: Send + Sync {
    fn sample(&self, rng: &mut dyn RngCore) -> f64;
}

#[derive(Clone, Debug)]
pub struct PoissonSampler {
    dist: Exp<f64>,
}

impl PoissonSampler {
    pub fn new(mean: f64) -> Result<Self> {
        let dist = Exp::new(1.0 / mean)
            .map_err(|err| invalid(format!("exponential rate for mean {mean}: {err}")))?;
        Ok(Self { dist })
    }
}

impl DurationSampler for PoissonSampler {
    fn sample(&self, rng: &mut dyn RngCore) -> f64 {
        self.dist.sample(rng)
    }
}

/// Pareto sampler with an optional upper cutoff.
///
/// Bounded draws invert the CDF of the truncated law, so no sample ever lands
/// above `high` and none is clipped onto it.
#[derive(Clone, Debug)]
pub struct ParetoSampler {
    power: f64,
    low: f64,
    // (low / high)^power, zero when unbounded
    tail_mass: f64,
    unbounded: Option<Pareto<f64>>,
}

impl ParetoSampler {
    pub fn new(power: f64, low: f64, high: Option<f64>) -> Result<Self> {
        match high {
            Some(high) => Ok(Self {
                power,
                low,
                tail_mass: (low / high).powf(power),
                unbounded: None,
            }),
            None => {
                let dist = Pareto::new(low, power)
                    .map_err(|err| invalid(format!("pareto({low}, {power}): {err}")))?;
                Ok(Self {
                    power,
                    low,
                    tail_mass: 0.0,
                    unbounded: Some(dist),
                })
            }
        }
    }
}

impl DurationSampler for ParetoSampler {
    fn sample(&self, rng: &mut dyn RngCore) -> f64 {
        if let Some(dist) = &self.unbounded {
            return dist.sample(rng);
        }
        let u: f64 = rng.gen();
        self.low * (1.0 - u + u * self.tail_mass).powf(-1.0 / self.power)
    }
}

#[derive(Clone, Debug)]
pub struct UniformSampler {
    dist: Uniform<f64>,
}

impl UniformSampler {
    pub fn new(low: f64, high: f64) -> Self {
        Self {
            dist: Uniform::new(low, high),
        }
    }
}

impl DurationSampler for UniformSampler {
    fn sample(&self, rng: &mut dyn RngCore) -> f64 {
        self.dist.sample(rng)
    }
}

#[derive(Clone, Debug)]
pub struct ConstantSampler {
    value: f64,
}

impl ConstantSampler {
    pub fn new(value: f64) -> Self {
        Self { value }
    }
}

impl DurationSampler for ConstantSampler {
    fn sample(&self, _rng: &mut dyn RngCore) -> f64 {
        self.value
    }
}

/// Validates `kind` and builds its sampler.
pub fn build_sampler(kind: &DistributionKind) -> Result<Box<dyn DurationSampler>> {
    kind.validate("distribution")?;
    let sampler: Box<dyn DurationSampler> = match kind {
        DistributionKind::Poisson { mean } => Box::new(PoissonSampler::new(*mean)?),
        DistributionKind::Pareto { power, low, high } => {
            Box::new(ParetoSampler::new(*power, *low, *high)?)
        }
        DistributionKind::Uniform { low, high } => Box::new(UniformSampler::new(*low, *high)),
        DistributionKind::Constant { value } => Box::new(ConstantSampler::new(*value)),
    };
    Ok(sampler)
}

impl DistributionKind {
    /// Bounded Pareto with the given cutoff; a negative or infinite `high`
    /// means no cutoff.
    pub fn pareto(power: f64, low: f64, high: f64) -> Self {
        let high = (high.is_finite() && high >= 0.0).then_some(high);
        Self::Pareto { power, low, high }
    }

    pub fn family(&self) -> &'static str {
        match self {
            DistributionKind::Poisson { .. } => "poisson",
            DistributionKind::Pareto { .. } => "pareto",
            DistributionKind::Uniform { .. } => "uniform",
            DistributionKind::Constant { .. } => "constant",
        }
    }

    /// Checks parameter ranges; `role` names the quantity in error messages.
    pub fn validate(&self, role: &str) -> Result<()> {
        match *self {
            DistributionKind::Poisson { mean } => {
                if !mean.is_finite() || mean <= 0.0 {
                    return Err(invalid(format!("{role}: poisson mean must be > 0, got {mean}")));
                }
            }
            DistributionKind::Pareto { power, low, high } => {
                if !power.is_finite() || power <= 0.0 {
                    return Err(invalid(format!("{role}: pareto power must be > 0, got {power}")));
                }
                if !low.is_finite() || low <= 0.0 {
                    return Err(invalid(format!("{role}: pareto low must be > 0, got {low}")));
                }
                if let Some(high) = high {
                    if !high.is_finite() || high <= low {
                        return Err(invalid(format!(
                            "{role}: pareto bounds inverted, low {low} >= high {high}"
                        )));
                    }
                }
            }
            DistributionKind::Uniform { low, high } => {
                if !low.is_finite() || !high.is_finite() || low < 0.0 {
                    return Err(invalid(format!(
                        "{role}: uniform bounds must be finite and >= 0, got [{low}, {high})"
                    )));
                }
                if high <= low {
                    return Err(invalid(format!(
                        "{role}: uniform bounds inverted, low {low} >= high {high}"
                    )));
                }
            }
            DistributionKind::Constant { value } => {
                if !value.is_finite() || value <= 0.0 {
                    return Err(invalid(format!("{role}: constant must be > 0, got {value}")));
                }
            }
        }
        Ok(())
    }

    /// Analytical mean, `None` when it diverges.
    pub fn mean(&self) -> Option<f64> {
        match *self {
            DistributionKind::Poisson { mean } => Some(mean),
            DistributionKind::Pareto { power, low, high } => pareto_mean(power, low, high),
            DistributionKind::Uniform { low, high } => Some(0.5 * (low + high)),
            DistributionKind::Constant { value } => Some(value),
        }
    }

    /// Shortest time scale the law resolves.
    pub fn shortest_scale(&self) -> f64 {
        match *self {
            DistributionKind::Poisson { mean } => mean,
            DistributionKind::Pareto { low, .. } => low,
            DistributionKind::Uniform { low, high } => {
                if low > 0.0 {
                    low
                } else {
                    0.5 * high
                }
            }
            DistributionKind::Constant { value } => value,
        }
    }

    /// Longest time scale the law produces, `None` without an upper cutoff.
    pub fn longest_scale(&self) -> Option<f64> {
        match *self {
            DistributionKind::Poisson { mean } => Some(mean),
            DistributionKind::Pareto { high, .. } => high,
            DistributionKind::Uniform { high, .. } => Some(high),
            DistributionKind::Constant { value } => Some(value),
        }
    }

    /// Compact tag used in output file names, e.g. `pareto1_1_inf`.
    pub fn label(&self) -> String {
        match *self {
            DistributionKind::Poisson { mean } => format!("poiss{}", fmt_param(mean)),
            DistributionKind::Pareto { power, low, high } => format!(
                "pareto{}_{}_{}",
                fmt_param(power),
                fmt_param(low),
                high.map(fmt_param).unwrap_or_else(|| "inf".to_string())
            ),
            DistributionKind::Uniform { low, high } => {
                format!("unif{}_{}", fmt_param(low), fmt_param(high))
            }
            DistributionKind::Constant { value } => format!("const{}", fmt_param(value)),
        }
    }
}

/// Mean of the Pareto law with exponent `power + 1` on `[low, high]`.
pub fn pareto_mean(power: f64, low: f64, high: Option<f64>) -> Option<f64> {
    match high {
        None => (power > 1.0).then(|| low * power / (power - 1.0)),
        Some(high) => {
            if (power - 1.0).abs() < 1e-12 {
                return Some(high * low / (high - low) * (high / low).ln());
            }
            let norm = low.powf(power) / (1.0 - (low / high).powf(power));
            let moment = (low.powf(1.0 - power) - high.powf(1.0 - power)) / (power - 1.0);
            Some(norm * power * moment)
        }
    }
}

// Dots separate file-name fields, so decimals use `p`: 0.5 -> "0p5".
fn fmt_param(value: f64) -> String {
    let text = if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    };
    text.replace('.', "p")
}

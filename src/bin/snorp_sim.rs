use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, ValueEnum};
use tracing::info;

use snorp::config::{FrequencySpec, SimulationConfig, Termination};
use snorp::logging::init_logging;
use snorp::output::write_run;
use snorp::{run_trials, DistributionKind};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Family {
    Poisson,
    Pareto,
    Uniform,
    Constant,
}

// Flags already described by a --config file.
const MODEL_FLAGS: [&str; 23] = [
    "n_events",
    "duration",
    "pulse",
    "mean_pulse",
    "min_pulse",
    "max_pulse",
    "power_pulse",
    "fixed_pulse",
    "gap",
    "mean_gap",
    "min_gap",
    "max_gap",
    "power_gap",
    "fixed_gap",
    "magnitude",
    "pulse_magnitude",
    "min_magnitude",
    "max_magnitude",
    "power_magnitude",
    "min_freq",
    "max_freq",
    "n_freq",
    "natural_freqs",
];

#[derive(Debug, Parser)]
#[command(name = "snorp-sim")]
#[command(about = "Simulate sequences of non-overlapping rectangular pulses and estimate their PSD")]
struct Cli {
    /// Full simulation config (TOML); --repeats, --seed and --serial override it.
    #[arg(long, conflicts_with_all = MODEL_FLAGS)]
    config: Option<PathBuf>,

    #[arg(long)]
    repeats: Option<usize>,

    /// Stop each trial after this many gap-pulse events.
    #[arg(long, conflicts_with = "duration")]
    n_events: Option<usize>,

    /// Stop each trial at this signal duration.
    #[arg(long)]
    duration: Option<f64>,

    #[arg(long, value_enum, default_value = "poisson")]
    pulse: Family,
    #[arg(long, default_value_t = 1.0)]
    mean_pulse: f64,
    #[arg(long, default_value_t = 1.0)]
    min_pulse: f64,
    /// Negative means no upper cutoff.
    #[arg(long, default_value_t = -1.0, allow_negative_numbers = true)]
    max_pulse: f64,
    #[arg(long, default_value_t = 1.0)]
    power_pulse: f64,
    #[arg(long, default_value_t = 1.0)]
    fixed_pulse: f64,

    #[arg(long, value_enum, default_value = "poisson")]
    gap: Family,
    #[arg(long, default_value_t = 1.0)]
    mean_gap: f64,
    #[arg(long, default_value_t = 1.0)]
    min_gap: f64,
    /// Negative means no upper cutoff.
    #[arg(long, default_value_t = -1.0, allow_negative_numbers = true)]
    max_gap: f64,
    #[arg(long, default_value_t = 1.0)]
    power_gap: f64,
    #[arg(long, default_value_t = 1.0)]
    fixed_gap: f64,

    #[arg(long, value_enum, default_value = "constant")]
    magnitude: Family,
    /// Constant magnitude, or the mean of Poisson magnitudes.
    #[arg(long, default_value_t = 1.0)]
    pulse_magnitude: f64,
    #[arg(long, default_value_t = 1.0)]
    min_magnitude: f64,
    /// Negative means no upper cutoff.
    #[arg(long, default_value_t = -1.0, allow_negative_numbers = true)]
    max_magnitude: f64,
    #[arg(long, default_value_t = 1.0)]
    power_magnitude: f64,

    /// Zero, negative or absent: derived from the model time scales.
    #[arg(long, allow_negative_numbers = true)]
    min_freq: Option<f64>,
    /// Zero, negative or absent: derived from the model time scales.
    #[arg(long, allow_negative_numbers = true)]
    max_freq: Option<f64>,
    #[arg(long, default_value_t = snorp::config::DEFAULT_N_FREQ)]
    n_freq: usize,
    /// Round frequencies to multiples of 1/duration.
    #[arg(long, default_value_t = false)]
    natural_freqs: bool,

    #[arg(long)]
    seed: Option<u64>,

    #[arg(long, default_value = "data")]
    archive_dir: PathBuf,

    /// Run trials on the current thread only.
    #[arg(long, default_value_t = false)]
    serial: bool,

    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

struct RoleArgs {
    role: &'static str,
    family: Family,
    mean: f64,
    min: f64,
    max: f64,
    power: f64,
    fixed: f64,
}

impl RoleArgs {
    fn distribution(&self) -> Result<DistributionKind> {
        let kind = match self.family {
            Family::Poisson => DistributionKind::Poisson { mean: self.mean },
            Family::Pareto => DistributionKind::pareto(self.power, self.min, self.max),
            Family::Uniform => {
                if self.max < 0.0 {
                    bail!("uniform {} needs an explicit --max-{}", self.role, self.role);
                }
                DistributionKind::Uniform {
                    low: self.min,
                    high: self.max,
                }
            }
            Family::Constant => DistributionKind::Constant { value: self.fixed },
        };
        Ok(kind)
    }
}

fn positive(value: Option<f64>) -> Option<f64> {
    value.filter(|v| *v > 0.0)
}

impl Cli {
    fn build_config(&self) -> Result<SimulationConfig> {
        let mut config = match &self.config {
            Some(path) => SimulationConfig::from_toml_file(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => self.config_from_flags()?,
        };

        if let Some(repeats) = self.repeats {
            config.repeats = repeats;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        if self.serial {
            config.parallel = false;
        }
        config.validate().context("invalid simulation parameters")?;
        Ok(config)
    }

    fn config_from_flags(&self) -> Result<SimulationConfig> {
        let termination = match (self.n_events, self.duration) {
            (Some(n), None) => Termination::Events(n),
            (None, Some(t)) => Termination::Duration(t),
            (None, None) => bail!("one of --n-events or --duration is required"),
            (Some(_), Some(_)) => bail!("--n-events and --duration are mutually exclusive"),
        };

        let pulse = RoleArgs {
            role: "pulse",
            family: self.pulse,
            mean: self.mean_pulse,
            min: self.min_pulse,
            max: self.max_pulse,
            power: self.power_pulse,
            fixed: self.fixed_pulse,
        };
        let gap = RoleArgs {
            role: "gap",
            family: self.gap,
            mean: self.mean_gap,
            min: self.min_gap,
            max: self.max_gap,
            power: self.power_gap,
            fixed: self.fixed_gap,
        };
        let magnitude = RoleArgs {
            role: "magnitude",
            family: self.magnitude,
            mean: self.pulse_magnitude,
            min: self.min_magnitude,
            max: self.max_magnitude,
            power: self.power_magnitude,
            fixed: self.pulse_magnitude,
        };

        Ok(SimulationConfig {
            pulse: pulse.distribution()?,
            gap: gap.distribution()?,
            magnitude: magnitude.distribution()?,
            termination,
            frequencies: FrequencySpec {
                min: positive(self.min_freq),
                max: positive(self.max_freq),
                count: self.n_freq,
                natural: self.natural_freqs,
            },
            repeats: 1,
            seed: None,
            parallel: true,
        })
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = cli.build_config()?;
    let result = run_trials(&config).context("simulation failed")?;
    let artifacts = write_run(&cli.archive_dir, &result)
        .with_context(|| format!("failed to write outputs to {}", cli.archive_dir.display()))?;

    info!(seed = result.seed, repeats = result.repeats, "done");
    println!("PSD table: {}", artifacts.psd_csv.display());
    println!("Summary: {}", artifacts.summary_json.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("snorp-sim").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn flags_build_the_nonergodic_model() {
        let cli = parse(&[
            "--duration",
            "1e4",
            "--mean-pulse",
            "100",
            "--gap",
            "pareto",
            "--max-gap",
            "-1",
            "--min-freq",
            "1e-4",
            "--max-freq",
            "10",
            "--seed",
            "4859",
        ]);
        let config = cli.build_config().unwrap();
        assert_eq!(config.termination, Termination::Duration(1e4));
        assert_eq!(config.pulse, DistributionKind::Poisson { mean: 100.0 });
        assert_eq!(config.gap, DistributionKind::pareto(1.0, 1.0, -1.0));
        assert_eq!(config.seed, Some(4859));
        assert_eq!(config.frequencies.min, Some(1e-4));
    }

    #[test]
    fn limits_are_mutually_exclusive_and_required() {
        let both = Cli::try_parse_from(["snorp-sim", "--n-events", "10", "--duration", "5"]);
        assert!(both.is_err());
        assert!(parse(&[]).build_config().is_err());
    }

    #[test]
    fn invalid_parameters_fail_before_running() {
        let cli = parse(&["--n-events", "100", "--mean-pulse=-3"]);
        assert!(cli.build_config().is_err());
        let cli = parse(&["--n-events", "100", "--pulse", "uniform", "--min-pulse", "0"]);
        assert!(cli.build_config().is_err());
    }

    #[test]
    fn zero_frequency_bound_means_automatic() {
        let cli = parse(&["--n-events", "100", "--min-freq", "0", "--max-freq", "5"]);
        let config = cli.build_config().unwrap();
        assert_eq!(config.frequencies.min, None);
        assert_eq!(config.frequencies.max, Some(5.0));
    }

    #[test]
    fn config_file_excludes_model_flags() {
        for flag in [
            &["--n-events", "10"][..],
            &["--mean-pulse", "3"],
            &["--gap", "pareto"],
            &["--natural-freqs"],
        ] {
            let args = ["snorp-sim", "--config", "run.toml"]
                .into_iter()
                .chain(flag.iter().copied());
            assert!(Cli::try_parse_from(args).is_err(), "{flag:?} accepted");
        }
        let overrides = Cli::try_parse_from([
            "snorp-sim", "--config", "run.toml", "--repeats", "5", "--seed", "7", "--serial",
        ]);
        assert!(overrides.is_ok());
    }

    #[test]
    fn negative_frequency_bounds_mean_automatic() {
        let cli = parse(&["--n-events", "100", "--min-freq", "-1", "--serial"]);
        let config = cli.build_config().unwrap();
        assert_eq!(config.frequencies.min, None);
        assert!(!config.parallel);
    }
}

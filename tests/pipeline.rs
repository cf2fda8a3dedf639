use std::fs;

use snorp::aggregate::aggregate_trials;
use snorp::config::{FrequencySpec, SimulationConfig, Termination};
use snorp::output::{read_psd_csv, write_run};
use snorp::sequence::ModelSamplers;
use snorp::{fit_log_log_slope, run_trial, run_trials, DistributionKind};

fn frequencies(min: f64, max: f64, count: usize) -> FrequencySpec {
    FrequencySpec {
        min: Some(min),
        max: Some(max),
        count,
        natural: false,
    }
}

#[test]
fn pareto_gaps_give_one_over_f_noise() {
    let config = SimulationConfig {
        pulse: DistributionKind::Poisson { mean: 100.0 },
        gap: DistributionKind::pareto(1.0, 1.0, 1e3),
        termination: Termination::Events(8_000),
        frequencies: frequencies(1e-3, 1e-2, 16),
        repeats: 50,
        seed: Some(2024),
        ..SimulationConfig::default()
    };
    let result = run_trials(&config).unwrap();
    let slope = fit_log_log_slope(&result.freqs, &result.mean_psd, (1e-3, 1e-2)).unwrap();
    assert!((-1.2..=-0.8).contains(&slope), "slope {slope}");
    assert!(result.theory_psd.is_some());
}

#[test]
fn poisson_poisson_matches_lorentzian() {
    let config = SimulationConfig {
        pulse: DistributionKind::Poisson { mean: 1.0 },
        gap: DistributionKind::Poisson { mean: 1.0 },
        termination: Termination::Events(2_000),
        frequencies: frequencies(1e-2, 10.0, 12),
        repeats: 40,
        seed: Some(7267),
        ..SimulationConfig::default()
    };
    let result = run_trials(&config).unwrap();
    let theory = result.theory_psd.as_ref().unwrap();
    let mean_ratio = result
        .mean_psd
        .iter()
        .zip(theory)
        .map(|(sim, th)| sim / th)
        .sum::<f64>()
        / theory.len() as f64;
    assert!((0.8..=1.2).contains(&mean_ratio), "ratio {mean_ratio}");
}

#[test]
fn nonergodic_scenario_runs_without_errors() {
    let config = SimulationConfig {
        pulse: DistributionKind::Poisson { mean: 100.0 },
        gap: DistributionKind::pareto(1.0, 1.0, -1.0),
        termination: Termination::Duration(1e4),
        frequencies: frequencies(1e-4, 10.0, 100),
        repeats: 3,
        seed: Some(4859),
        ..SimulationConfig::default()
    };
    let result = run_trials(&config).unwrap();
    assert_eq!(result.freqs.len(), 100);
    assert_eq!(result.mean_psd.len(), 100);
    assert!((result.mean_duration - 1e4).abs() < 1e-6);

    let grid = config.frequency_grid().unwrap();
    let samplers = ModelSamplers::from_config(&config).unwrap();
    for k in 0..3 {
        let trial = run_trial(&samplers, config.termination, &grid, 4859, k).unwrap();
        assert_eq!(trial.power.len(), grid.len());
        assert!(trial.power.iter().all(|s| s.is_finite() && *s >= 0.0));
    }
}

#[test]
fn shorter_runs_are_prefixes_of_longer_runs() {
    let config = SimulationConfig {
        pulse: DistributionKind::Uniform { low: 0.5, high: 1.5 },
        gap: DistributionKind::pareto(1.5, 0.5, 50.0),
        termination: Termination::Events(500),
        frequencies: frequencies(1e-3, 1.0, 24),
        repeats: 3,
        seed: Some(13007),
        parallel: false,
        ..SimulationConfig::default()
    };
    let grid = config.frequency_grid().unwrap();
    let samplers = ModelSamplers::from_config(&config).unwrap();
    let trials: Vec<_> = (0..5)
        .map(|k| run_trial(&samplers, config.termination, &grid, 13007, k).unwrap())
        .collect();

    let short = run_trials(&config).unwrap();
    let prefix = aggregate_trials(config.clone(), 13007, &grid, &trials[..3]).unwrap();
    assert_eq!(short.mean_psd, prefix.mean_psd);
    assert_eq!(short.variance_psd, prefix.variance_psd);

    let long = run_trials(&SimulationConfig {
        repeats: 5,
        parallel: true,
        ..config.clone()
    })
    .unwrap();
    let full = aggregate_trials(config, 13007, &grid, &trials).unwrap();
    assert_eq!(long.mean_psd, full.mean_psd);
}

#[test]
fn fixed_seed_reproduces_the_psd_table() {
    let config = SimulationConfig {
        pulse: DistributionKind::Constant { value: 2.0 },
        gap: DistributionKind::pareto(1.0, 1.0, 1e3),
        termination: Termination::Duration(5e3),
        repeats: 4,
        seed: Some(27082),
        ..SimulationConfig::default()
    };
    let first = tempfile::tempdir().unwrap();
    let second = tempfile::tempdir().unwrap();

    let a = write_run(first.path(), &run_trials(&config).unwrap()).unwrap();
    let serial = SimulationConfig {
        parallel: false,
        ..config
    };
    let b = write_run(second.path(), &run_trials(&serial).unwrap()).unwrap();

    assert_eq!(
        a.psd_csv.file_name().unwrap(),
        "const2.pareto1_1_1000.seed27082.psd.csv"
    );
    assert_eq!(
        fs::read_to_string(&a.psd_csv).unwrap(),
        fs::read_to_string(&b.psd_csv).unwrap()
    );

    let rows = read_psd_csv(&a.psd_csv).unwrap();
    assert_eq!(rows.len(), snorp::config::DEFAULT_N_FREQ);
    assert!(rows.iter().all(|r| r.log10_theory.is_finite()));
}

#[test]
fn natural_frequencies_are_multiples_of_the_inverse_duration() {
    let config = SimulationConfig {
        pulse: DistributionKind::Poisson { mean: 10.0 },
        gap: DistributionKind::Poisson { mean: 10.0 },
        termination: Termination::Duration(1e3),
        frequencies: FrequencySpec {
            natural: true,
            ..frequencies(1e-3, 1.0, 40)
        },
        repeats: 2,
        seed: Some(1081),
        ..SimulationConfig::default()
    };
    let result = run_trials(&config).unwrap();
    assert!(result.freqs.len() <= 40);
    for f in &result.freqs {
        let multiple = f * 1e3;
        assert!((multiple - multiple.round()).abs() < 1e-9, "f = {f}");
        assert!(multiple.round() >= 1.0);
    }
}

#[test]
fn invalid_configurations_fail_before_sampling() {
    let config = SimulationConfig {
        pulse: DistributionKind::Poisson { mean: -1.0 },
        ..SimulationConfig::default()
    };
    assert!(matches!(
        run_trials(&config),
        Err(snorp::SnorpError::InvalidParameter(_))
    ));
}

#[test]
fn shipped_configs_are_valid() {
    let dir = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("configs");
    let mut checked = 0;
    for entry in fs::read_dir(&dir).unwrap() {
        let path = entry.unwrap().path();
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        if path.extension().is_some_and(|ext| ext == "toml") && name != "figures.toml" {
            let config = SimulationConfig::from_toml_file(&path).unwrap();
            config.validate().unwrap();
            config.frequency_grid().unwrap();
            checked += 1;
        }
    }
    assert!(checked >= 4);
}

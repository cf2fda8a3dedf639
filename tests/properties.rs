use proptest::prelude::*;

use snorp::aggregate::trial_rng;
use snorp::config::Termination;
use snorp::sequence::{ModelSamplers, PulseTrain, Sequence};
use snorp::{build_sampler, estimate_psd, DistributionKind, FrequencyGrid};

fn duration_law() -> impl Strategy<Value = DistributionKind> {
    prop_oneof![
        (0.1f64..10.0).prop_map(|mean| DistributionKind::Poisson { mean }),
        (0.8f64..2.5, 0.1f64..5.0, prop::option::of(2.0f64..100.0)).prop_map(
            |(power, low, ratio)| DistributionKind::Pareto {
                power,
                low,
                high: ratio.map(|r| low * r),
            }
        ),
        (0.0f64..5.0, 0.1f64..5.0)
            .prop_map(|(low, width)| DistributionKind::Uniform { low, high: low + width }),
        (0.1f64..5.0).prop_map(|value| DistributionKind::Constant { value }),
    ]
}

fn termination() -> impl Strategy<Value = Termination> {
    prop_oneof![
        (1usize..200).prop_map(Termination::Events),
        (1.0f64..500.0).prop_map(Termination::Duration),
    ]
}

fn draw(
    pulse: &DistributionKind,
    gap: &DistributionKind,
    termination: Termination,
    seed: u64,
) -> Sequence {
    let samplers = ModelSamplers {
        pulse: build_sampler(pulse).unwrap(),
        gap: build_sampler(gap).unwrap(),
        magnitude: build_sampler(&DistributionKind::Constant { value: 1.0 }).unwrap(),
    };
    let mut rng = trial_rng(seed, 0);
    Sequence::build(PulseTrain::new(&samplers, termination, &mut rng)).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn pulses_never_overlap(
        pulse in duration_law(),
        gap in duration_law(),
        termination in termination(),
        seed in any::<u64>(),
    ) {
        let sequence = draw(&pulse, &gap, termination, seed);
        prop_assert!(sequence.gaps().iter().all(|g| *g >= 0.0));
        for pair in sequence.pulses().windows(2) {
            prop_assert!(pair[0].start < pair[1].start);
            prop_assert!(pair[0].end() <= pair[1].start);
        }
        for p in sequence.pulses() {
            prop_assert!(p.duration > 0.0);
        }
        match termination {
            Termination::Events(n) => prop_assert_eq!(sequence.len(), n),
            Termination::Duration(t) => {
                prop_assert_eq!(sequence.total_duration(), t);
                if let Some(last) = sequence.pulses().last() {
                    prop_assert!(last.end() <= t);
                }
            }
        }
    }

    #[test]
    fn psd_is_finite_and_non_negative(
        durations in prop::collection::vec((0.01f64..10.0, 0.0f64..10.0), 1..50),
        magnitude in 0.1f64..5.0,
        f_min in 1e-4f64..1e-1,
        decades in 1.0f64..4.0,
    ) {
        let (pulses, gaps): (Vec<f64>, Vec<f64>) = durations.into_iter().unzip();
        let sequence = Sequence::from_durations(&pulses, &gaps, magnitude).unwrap();
        let grid = FrequencyGrid::log_spaced(f_min, f_min * 10f64.powf(decades), 32).unwrap();
        let psd = estimate_psd(&sequence, &grid);
        prop_assert_eq!(psd.len(), 32);
        prop_assert!(psd.iter().all(|s| s.is_finite() && *s >= 0.0));
    }
}

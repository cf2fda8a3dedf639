//! Construction of non-overlapping rectangular pulse trains.
//!
//! Every pulse is preceded by a gap, so a signal starts at `t = 0` in the
//! zero state. Event-limited trains stop after `n` gap-pulse events;
//! duration-limited trains are cut at exactly `T`: a gap reaching `T` ends
//! the train without its pulse, and a pulse crossing `T` is shortened to end
//! there.

use rand::RngCore;
use serde::Serialize;

use crate::config::{SimulationConfig, Termination};
use crate::distributions::{build_sampler, DurationSampler};
use crate::{invalid, Result, SnorpError};

/// Redraws allowed for a pulse duration before sampling is declared
/// exhausted.
pub const MAX_REDRAWS: usize = 64;

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Pulse {
    pub start: f64,
    pub duration: f64,
    pub magnitude: f64,
}

impl Pulse {
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

/// One step of a train: a gap, then the pulse it leads to. Only the final
/// event of a duration-limited train can lack its pulse.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Event {
    pub gap: f64,
    pub pulse: Option<Pulse>,
}

/// The three samplers of one pulse model.
pub struct ModelSamplers {
    pub pulse: Box<dyn DurationSampler>,
    pub gap: Box<dyn DurationSampler>,
    pub magnitude: Box<dyn DurationSampler>,
}

impl ModelSamplers {
    pub fn from_config(config: &SimulationConfig) -> Result<Self> {
        Ok(Self {
            pulse: build_sampler(&config.pulse)?,
            gap: build_sampler(&config.gap)?,
            magnitude: build_sampler(&config.magnitude)?,
        })
    }
}

/// Lazy generator of gap-pulse events.
pub struct PulseTrain<'a> {
    samplers: &'a ModelSamplers,
    termination: Termination,
    rng: &'a mut dyn RngCore,
    clock: f64,
    emitted: usize,
    finished: bool,
}

impl<'a> PulseTrain<'a> {
    pub fn new(
        samplers: &'a ModelSamplers,
        termination: Termination,
        rng: &'a mut dyn RngCore,
    ) -> Self {
        Self {
            samplers,
            termination,
            rng,
            clock: 0.0,
            emitted: 0,
            finished: false,
        }
    }

    /// Signal time reached so far.
    pub fn clock(&self) -> f64 {
        self.clock
    }

    // Draws a duration that still moves the clock once added to `start`.
    fn draw_duration(&mut self, start: f64) -> Result<f64> {
        for _ in 0..MAX_REDRAWS {
            let duration = self.samplers.pulse.sample(&mut *self.rng);
            if duration > 0.0 && start + duration > start {
                return Ok(duration);
            }
        }
        Err(SnorpError::SamplingExhaustion(format!(
            "no strictly positive pulse duration at t = {start} after {MAX_REDRAWS} draws"
        )))
    }

    fn next_event(&mut self) -> Result<Option<Event>> {
        let limit = match self.termination {
            Termination::Events(n) if self.emitted >= n => return Ok(None),
            Termination::Events(_) => None,
            Termination::Duration(t) if self.clock >= t => return Ok(None),
            Termination::Duration(t) => Some(t),
        };

        let gap = self.samplers.gap.sample(&mut *self.rng).max(0.0);
        if let Some(limit) = limit {
            if self.clock + gap >= limit {
                let gap = limit - self.clock;
                self.clock = limit;
                self.finished = true;
                return Ok(Some(Event { gap, pulse: None }));
            }
        }

        let start = self.clock + gap;
        let duration = self.draw_duration(start)?;
        let magnitude = self.samplers.magnitude.sample(&mut *self.rng);
        let end = match limit {
            Some(limit) => (start + duration).min(limit),
            None => start + duration,
        };

        self.clock = end;
        self.emitted += 1;
        Ok(Some(Event {
            gap,
            pulse: Some(Pulse {
                start,
                duration: end - start,
                magnitude,
            }),
        }))
    }
}

impl Iterator for PulseTrain<'_> {
    type Item = Result<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.next_event() {
            Ok(Some(event)) => Some(Ok(event)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(err) => {
                self.finished = true;
                Some(Err(err))
            }
        }
    }
}

/// A fully materialized pulse train.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Sequence {
    pulses: Vec<Pulse>,
    gaps: Vec<f64>,
    trailing_gap: f64,
    total_duration: f64,
}

impl Sequence {
    /// Collects a train until it terminates.
    pub fn build(mut train: PulseTrain<'_>) -> Result<Self> {
        let mut sequence = Sequence::default();
        for event in train.by_ref() {
            sequence.push(event?);
        }
        sequence.total_duration = train.clock();
        Ok(sequence)
    }

    /// Sequence from explicit durations: `gaps[k]` precedes `pulses[k]`.
    pub fn from_durations(pulses: &[f64], gaps: &[f64], magnitude: f64) -> Result<Self> {
        if pulses.len() != gaps.len() {
            return Err(invalid(format!(
                "{} pulse durations but {} gap durations",
                pulses.len(),
                gaps.len()
            )));
        }
        let mut sequence = Sequence::default();
        let mut clock = 0.0;
        for (&duration, &gap) in pulses.iter().zip(gaps) {
            if !(duration > 0.0) || !(gap >= 0.0) {
                return Err(invalid(format!(
                    "pulse durations must be > 0 and gaps >= 0, got {duration} and {gap}"
                )));
            }
            let start = clock + gap;
            clock = start + duration;
            sequence.push(Event {
                gap,
                pulse: Some(Pulse {
                    start,
                    duration,
                    magnitude,
                }),
            });
        }
        sequence.total_duration = clock;
        Ok(sequence)
    }

    fn push(&mut self, event: Event) {
        match event.pulse {
            Some(pulse) => {
                self.gaps.push(event.gap);
                self.pulses.push(pulse);
            }
            None => self.trailing_gap += event.gap,
        }
    }

    pub fn pulses(&self) -> &[Pulse] {
        &self.pulses
    }

    /// Gap preceding each pulse.
    pub fn gaps(&self) -> &[f64] {
        &self.gaps
    }

    pub fn trailing_gap(&self) -> f64 {
        self.trailing_gap
    }

    pub fn total_duration(&self) -> f64 {
        self.total_duration
    }

    pub fn len(&self) -> usize {
        self.pulses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pulses.is_empty()
    }

    /// Time average of the signal over `[0, total_duration]`.
    pub fn mean_level(&self) -> f64 {
        if self.total_duration <= 0.0 {
            return 0.0;
        }
        let area: f64 = self.pulses.iter().map(|p| p.magnitude * p.duration).sum();
        area / self.total_duration
    }

    /// Signal value at time `t`.
    pub fn level_at(&self, t: f64) -> f64 {
        let idx = self.pulses.partition_point(|p| p.start <= t);
        match idx.checked_sub(1).map(|i| &self.pulses[i]) {
            Some(pulse) if t < pulse.end() => pulse.magnitude,
            _ => 0.0,
        }
    }

    /// The step signal sampled every `dt` on `[t0, t1]`.
    pub fn sampled_signal(&self, t0: f64, t1: f64, dt: f64) -> Vec<(f64, f64)> {
        if !(dt > 0.0) || t1 < t0 {
            return Vec::new();
        }
        let steps = ((t1 - t0) / dt).floor() as usize;
        (0..=steps)
            .map(|k| {
                let t = t0 + k as f64 * dt;
                (t, self.level_at(t))
            })
            .collect()
    }
}

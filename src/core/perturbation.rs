#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", content = "index", rename_all = "snake_case"))]
pub enum PerturbationTarget {
    Stream(usize),
    Environment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum PerturbationMode {
    /// Add `delta` to the target state.
    #[default]
    Offset,
    /// Overwrite the target state with `delta`.
    Replace,
}

/// A scheduled discontinuous change. Immutable once scheduled.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PerturbationEvent {
    pub tick: usize,
    pub target: PerturbationTarget,
    pub delta: Vec<f64>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub mode: PerturbationMode,
}

impl PerturbationEvent {
    pub fn offset_stream(tick: usize, stream: usize, delta: Vec<f64>) -> Self {
        Self {
            tick,
            target: PerturbationTarget::Stream(stream),
            delta,
            mode: PerturbationMode::Offset,
        }
    }

    pub fn offset_environment(tick: usize, delta: Vec<f64>) -> Self {
        Self {
            tick,
            target: PerturbationTarget::Environment,
            delta,
            mode: PerturbationMode::Offset,
        }
    }

    pub fn replacing(mut self) -> Self {
        self.mode = PerturbationMode::Replace;
        self
    }

    /// Perturbed copy of `current`.
    pub fn apply_to(&self, current: &[f64]) -> Vec<f64> {
        match self.mode {
            PerturbationMode::Offset => current.iter().zip(&self.delta).map(|(x, d)| x + d).collect(),
            PerturbationMode::Replace => self.delta.clone(),
        }
    }

    /// Euclidean size of the change this event makes to `current`.
    pub fn jump(&self, current: &[f64]) -> f64 {
        let sq: f64 = match self.mode {
            PerturbationMode::Offset => self.delta.iter().map(|d| d * d).sum(),
            PerturbationMode::Replace => current
                .iter()
                .zip(&self.delta)
                .map(|(x, d)| (d - x).powi(2))
                .sum(),
        };
        sq.sqrt()
    }
}

/// Outcome of the counterfactual sanity check for one fired event.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PerturbationReport {
    pub tick: usize,
    pub target: PerturbationTarget,
    /// Size of the change actually made to the target.
    pub magnitude: f64,
    /// RMS per-tick change of the target just before the event.
    pub typical_step: f64,
    /// `magnitude / typical_step`; infinite when the target was static.
    pub ratio: f64,
    /// False when the change could be absorbed by ordinary continuation.
    pub counterfactual: bool,
}

#[derive(Debug, Clone)]
struct Scheduled {
    event: PerturbationEvent,
    fired: bool,
}

/// Holds the schedule and fires each event exactly once.
#[derive(Debug, Clone, Default)]
pub struct PerturbationInjector {
    scheduled: Vec<Scheduled>,
    run_length: usize,
}

impl PerturbationInjector {
    pub fn new(run_length: usize) -> Self {
        Self {
            scheduled: Vec::new(),
            run_length,
        }
    }

    /// Add an event. Ticks outside the run, repeated ticks and non-finite
    /// deltas are rejected; target shape is checked by the run config.
    pub fn schedule(&mut self, event: PerturbationEvent) -> Result<(), ConfigError> {
        if event.tick >= self.run_length {
            return Err(ConfigError::PerturbationOutOfRange {
                tick: event.tick,
                run_length: self.run_length,
            });
        }
        if self.scheduled.iter().any(|s| s.event.tick == event.tick) {
            return Err(ConfigError::DuplicatePerturbation { tick: event.tick });
        }
        if event.delta.iter().any(|d| !d.is_finite()) {
            return Err(ConfigError::NonFiniteDelta { tick: event.tick });
        }
        let pos = self
            .scheduled
            .partition_point(|s| s.event.tick < event.tick);
        self.scheduled.insert(pos, Scheduled { event, fired: false });
        Ok(())
    }

    /// Earliest scheduled event.
    pub fn onset(&self) -> Option<&PerturbationEvent> {
        self.scheduled.first().map(|s| &s.event)
    }

    /// Event due at `tick`, if it has not fired yet. Marks it fired.
    pub fn take_due(&mut self, tick: usize) -> Option<PerturbationEvent> {
        let s = self
            .scheduled
            .iter_mut()
            .find(|s| s.event.tick == tick && !s.fired)?;
        s.fired = true;
        Some(s.event.clone())
    }

    /// Compare the jump `event` makes from `current` with the target's
    /// recent per-tick change.
    pub fn assess(
        event: &PerturbationEvent,
        current: &[f64],
        typical_step: f64,
        min_ratio: f64,
    ) -> PerturbationReport {
        let magnitude = event.jump(current);
        let ratio = if typical_step > 0.0 {
            magnitude / typical_step
        } else if magnitude > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };
        PerturbationReport {
            tick: event.tick,
            target: event.target,
            magnitude,
            typical_step,
            ratio,
            counterfactual: ratio >= min_ratio,
        }
    }
}

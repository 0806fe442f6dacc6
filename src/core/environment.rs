//! Co-dynamical environments.
//!
//! An environment evolves under its own rule whether or not the agent acts on
//! it. Coupling is a property of the [`EnvironmentChannel`], never of the
//! environment's internals: switching actuation off only stops the agent's
//! signal from arriving.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{check_range, ConfigError};
use crate::prng::Prng;

/// Capability interface for environment dynamics.
pub trait Environment: Send + core::fmt::Debug {
    /// Advance one tick under the autonomous rule plus any pending actuation,
    /// then return the new observation.
    fn step(&mut self) -> f64;

    /// Observation emitted for the current state.
    fn observe(&self) -> f64;

    /// Receive the agent's signal; it takes effect on the next `step`.
    fn actuate(&mut self, signal: f64);

    fn state(&self) -> &[f64];

    fn state_mut(&mut self) -> &mut [f64];
}

/// Configuration-selected environment variants.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "snake_case"))]
pub enum EnvironmentKind {
    /// No dynamics; observes zero.
    #[default]
    Quiet,
    /// AR(1): `e' = retention * e + noise * N + actuation_gain * a`.
    Drift {
        retention: f64,
        noise: f64,
        actuation_gain: f64,
    },
    /// Damped rotation of (position, velocity); observes position.
    Oscillator {
        omega: f64,
        damping: f64,
        noise: f64,
        actuation_gain: f64,
    },
    /// Viability reservoir: depletes by `consumption` each tick, refilled by
    /// positive actuation, clamped to `[0, capacity]`; observes `level - setpoint`.
    Resource {
        capacity: f64,
        setpoint: f64,
        consumption: f64,
        noise: f64,
        actuation_gain: f64,
    },
}

impl EnvironmentKind {
    pub fn name(&self) -> &'static str {
        match self {
            EnvironmentKind::Quiet => "quiet",
            EnvironmentKind::Drift { .. } => "drift",
            EnvironmentKind::Oscillator { .. } => "oscillator",
            EnvironmentKind::Resource { .. } => "resource",
        }
    }

    /// Length of the environment's state vector.
    pub fn dimension(&self) -> usize {
        match self {
            EnvironmentKind::Oscillator { .. } => 2,
            _ => 1,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match *self {
            EnvironmentKind::Quiet => Ok(()),
            EnvironmentKind::Drift {
                retention,
                noise,
                actuation_gain,
            } => {
                check_range("environment", "retention", retention, 0.0, 1.0, "0..=1")?;
                check_range("environment", "noise", noise, 0.0, f64::MAX, ">= 0")?;
                check_range("environment", "actuation_gain", actuation_gain, -f64::MAX, f64::MAX, "finite")
            }
            EnvironmentKind::Oscillator {
                omega,
                damping,
                noise,
                actuation_gain,
            } => {
                check_range("environment", "omega", omega, -core::f64::consts::PI, core::f64::consts::PI, "-pi..=pi")?;
                check_range("environment", "damping", damping, 0.0, 1.0, "0..=1")?;
                check_range("environment", "noise", noise, 0.0, f64::MAX, ">= 0")?;
                check_range("environment", "actuation_gain", actuation_gain, -f64::MAX, f64::MAX, "finite")
            }
            EnvironmentKind::Resource {
                capacity,
                setpoint,
                consumption,
                noise,
                actuation_gain,
            } => {
                check_range("environment", "capacity", capacity, f64::MIN_POSITIVE, f64::MAX, "> 0")?;
                check_range("environment", "setpoint", setpoint, 0.0, capacity, "0..=capacity")?;
                check_range("environment", "consumption", consumption, 0.0, f64::MAX, ">= 0")?;
                check_range("environment", "noise", noise, 0.0, f64::MAX, ">= 0")?;
                check_range("environment", "actuation_gain", actuation_gain, 0.0, f64::MAX, ">= 0")
            }
        }
    }

    /// Build the environment with its own generator forked from `seed`.
    pub fn build(&self, seed: u64) -> Box<dyn Environment> {
        let rng = Prng::for_environment(seed);
        match *self {
            EnvironmentKind::Quiet => Box::new(Quiet { state: [0.0] }),
            EnvironmentKind::Drift {
                retention,
                noise,
                actuation_gain,
            } => Box::new(Drift {
                state: [0.0],
                retention,
                noise,
                actuation_gain,
                pending: 0.0,
                rng,
            }),
            EnvironmentKind::Oscillator {
                omega,
                damping,
                noise,
                actuation_gain,
            } => Box::new(Oscillator {
                state: [0.0, 0.0],
                omega,
                damping,
                noise,
                actuation_gain,
                pending: 0.0,
                rng,
            }),
            EnvironmentKind::Resource {
                capacity,
                setpoint,
                consumption,
                noise,
                actuation_gain,
            } => Box::new(Resource {
                state: [setpoint],
                capacity,
                setpoint,
                consumption,
                noise,
                actuation_gain,
                pending: 0.0,
                rng,
            }),
        }
    }
}

#[derive(Debug)]
struct Quiet {
    state: [f64; 1],
}

impl Environment for Quiet {
    fn step(&mut self) -> f64 {
        self.observe()
    }

    fn observe(&self) -> f64 {
        0.0
    }

    fn actuate(&mut self, _signal: f64) {}

    fn state(&self) -> &[f64] {
        &self.state
    }

    fn state_mut(&mut self) -> &mut [f64] {
        &mut self.state
    }
}

#[derive(Debug)]
struct Drift {
    state: [f64; 1],
    retention: f64,
    noise: f64,
    actuation_gain: f64,
    pending: f64,
    rng: Prng,
}

impl Environment for Drift {
    fn step(&mut self) -> f64 {
        let drive = self.actuation_gain * core::mem::take(&mut self.pending);
        self.state[0] = self.retention * self.state[0] + self.noise * self.rng.next_gaussian() + drive;
        self.observe()
    }

    fn observe(&self) -> f64 {
        self.state[0]
    }

    fn actuate(&mut self, signal: f64) {
        self.pending = signal;
    }

    fn state(&self) -> &[f64] {
        &self.state
    }

    fn state_mut(&mut self) -> &mut [f64] {
        &mut self.state
    }
}

#[derive(Debug)]
struct Oscillator {
    state: [f64; 2],
    omega: f64,
    damping: f64,
    noise: f64,
    actuation_gain: f64,
    pending: f64,
    rng: Prng,
}

impl Environment for Oscillator {
    fn step(&mut self) -> f64 {
        let (s, c) = self.omega.sin_cos();
        let [p, v] = self.state;
        let drive = self.actuation_gain * core::mem::take(&mut self.pending);
        self.state = [
            self.damping * (c * p + s * v),
            self.damping * (c * v - s * p) + self.noise * self.rng.next_gaussian() + drive,
        ];
        self.observe()
    }

    fn observe(&self) -> f64 {
        self.state[0]
    }

    fn actuate(&mut self, signal: f64) {
        self.pending = signal;
    }

    fn state(&self) -> &[f64] {
        &self.state
    }

    fn state_mut(&mut self) -> &mut [f64] {
        &mut self.state
    }
}

#[derive(Debug)]
struct Resource {
    state: [f64; 1],
    capacity: f64,
    setpoint: f64,
    consumption: f64,
    noise: f64,
    actuation_gain: f64,
    pending: f64,
    rng: Prng,
}

impl Environment for Resource {
    fn step(&mut self) -> f64 {
        // Only positive activity forages.
        let forage = self.actuation_gain * core::mem::take(&mut self.pending).max(0.0);
        let level = self.state[0] - self.consumption + self.noise * self.rng.next_gaussian() + forage;
        self.state[0] = level.clamp(0.0, self.capacity);
        self.observe()
    }

    fn observe(&self) -> f64 {
        self.state[0] - self.setpoint
    }

    fn actuate(&mut self, signal: f64) {
        self.pending = signal;
    }

    fn state(&self) -> &[f64] {
        &self.state
    }

    fn state_mut(&mut self) -> &mut [f64] {
        &mut self.state
    }
}

/// Environment plus its two channels.
///
/// The observation channel is always open. The actuation channel can be
/// switched off, in which case the environment never sees the agent's signal.
#[derive(Debug)]
pub struct EnvironmentChannel {
    env: Box<dyn Environment>,
    actuation_enabled: bool,
    observation_gain: f64,
    history: Vec<Vec<f64>>,
}

impl EnvironmentChannel {
    pub fn new(env: Box<dyn Environment>, actuation_enabled: bool, observation_gain: f64) -> Self {
        Self {
            env,
            actuation_enabled,
            observation_gain,
            history: Vec::new(),
        }
    }

    pub fn actuation_enabled(&self) -> bool {
        self.actuation_enabled
    }

    /// Advance the environment and return the scaled observation.
    pub fn step(&mut self) -> f64 {
        let obs = self.env.step();
        self.history.push(self.env.state().to_vec());
        self.observation_gain * obs
    }

    /// Forward the agent's signal when the channel is open.
    pub fn apply(&mut self, actuation: f64) {
        if self.actuation_enabled {
            self.env.actuate(actuation);
        }
    }

    pub fn state(&self) -> &[f64] {
        self.env.state()
    }

    pub(crate) fn state_mut(&mut self) -> &mut [f64] {
        self.env.state_mut()
    }

    /// Environment states after each step, oldest first.
    pub fn history(&self) -> &[Vec<f64>] {
        &self.history
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drift(gain: f64) -> EnvironmentKind {
        EnvironmentKind::Drift {
            retention: 0.9,
            noise: 0.05,
            actuation_gain: gain,
        }
    }

    #[test]
    fn disabled_channel_never_delivers_actuation() {
        let mut open = EnvironmentChannel::new(drift(1.0).build(5), true, 1.0);
        let mut closed = EnvironmentChannel::new(drift(1.0).build(5), false, 1.0);
        let mut baseline = EnvironmentChannel::new(drift(1.0).build(5), false, 1.0);

        let mut diverged = false;
        for _ in 0..50 {
            open.apply(3.0);
            closed.apply(3.0);
            let a = open.step();
            let b = closed.step();
            let c = baseline.step();
            assert_eq!(b.to_bits(), c.to_bits());
            diverged |= a != b;
        }
        assert!(diverged);
    }

    #[test]
    fn coupled_and_decoupled_differ_only_by_actuation_terms() {
        // Linear drift: the gap must equal gain * sum(retention^j * a).
        let (retention, gain, signal) = (0.9, 0.4, 1.0);
        let mut on = EnvironmentChannel::new(drift(gain).build(9), true, 1.0);
        let mut off = EnvironmentChannel::new(drift(gain).build(9), false, 1.0);

        let mut expected_gap = 0.0;
        for _ in 0..40 {
            on.apply(signal);
            off.apply(signal);
            let gap = on.step() - off.step();
            expected_gap = retention * expected_gap + gain * signal;
            assert!((gap - expected_gap).abs() < 1e-9, "gap {gap} vs {expected_gap}");
        }
    }

    #[test]
    fn quiet_environment_observes_zero() {
        let mut ch = EnvironmentChannel::new(EnvironmentKind::Quiet.build(1), true, 1.0);
        ch.apply(10.0);
        assert_eq!(ch.step(), 0.0);
        assert_eq!(ch.history().len(), 1);
    }

    #[test]
    fn resource_depletes_without_foraging() {
        let kind = EnvironmentKind::Resource {
            capacity: 10.0,
            setpoint: 5.0,
            consumption: 1.0,
            noise: 0.0,
            actuation_gain: 2.0,
        };
        let mut dark = EnvironmentChannel::new(kind.build(1), false, 1.0);
        let obs: Vec<f64> = (0..8).map(|_| dark.step()).collect();
        assert_eq!(obs[0], -1.0);
        // Clamped at an empty reservoir.
        assert_eq!(*obs.last().unwrap(), -5.0);

        let mut fed = EnvironmentChannel::new(kind.build(1), true, 1.0);
        fed.apply(1.0);
        assert_eq!(fed.step(), 1.0);
        // Negative activity does not drain the reservoir further.
        fed.apply(-4.0);
        assert_eq!(fed.step(), 0.0);
    }

    #[test]
    fn oscillator_observes_position_and_conserves_without_damping_loss() {
        let kind = EnvironmentKind::Oscillator {
            omega: 0.3,
            damping: 1.0,
            noise: 0.0,
            actuation_gain: 1.0,
        };
        let mut ch = EnvironmentChannel::new(kind.build(1), true, 2.0);
        ch.state_mut()[0] = 1.0;
        for _ in 0..25 {
            ch.step();
        }
        let s = ch.state();
        assert!(((s[0] * s[0] + s[1] * s[1]) - 1.0).abs() < 1e-9);
        assert_eq!(kind.dimension(), 2);
    }

    #[test]
    fn validation_rejects_unstable_retention() {
        assert!(drift(0.5).validate().is_ok());
        let bad = EnvironmentKind::Drift {
            retention: 1.5,
            noise: 0.0,
            actuation_gain: 0.0,
        };
        assert!(matches!(
            bad.validate(),
            Err(ConfigError::OutOfRange { name: "retention", .. })
        ));
    }
}

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{check_range, ConfigError};

/// Largest decay accepted by validation. Values above 1 make a stream expansive.
pub const MAX_DECAY: f64 = 4.0;

/// Update-rule family of a stream.
///
/// Every rule has the shape `x' = f(x) + gain * u + noise`; only `f` differs.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "snake_case"))]
pub enum UpdateRule {
    /// `f(x) = decay * x`
    LeakyIntegrator,
    /// `f(x) = decay * R(omega) x` on a (position, velocity) pair.
    DampedOscillator { omega: f64 },
    /// `f(x)_k = decay * x_k * (1 - x_k)`
    Logistic,
}

impl UpdateRule {
    pub fn name(&self) -> &'static str {
        match self {
            UpdateRule::LeakyIntegrator => "leaky_integrator",
            UpdateRule::DampedOscillator { .. } => "damped_oscillator",
            UpdateRule::Logistic => "logistic",
        }
    }

    /// Dimension the rule requires, if it is fixed.
    pub fn required_dimension(&self) -> Option<usize> {
        match self {
            UpdateRule::DampedOscillator { .. } => Some(2),
            _ => None,
        }
    }

    /// Autonomous part `f(x)` of the update.
    pub fn apply(&self, decay: f64, state: &[f64]) -> Vec<f64> {
        match *self {
            UpdateRule::LeakyIntegrator => state.iter().map(|x| decay * x).collect(),
            UpdateRule::DampedOscillator { omega } => {
                let (s, c) = omega.sin_cos();
                let (p, v) = (state[0], state[1]);
                vec![decay * (c * p + s * v), decay * (c * v - s * p)]
            }
            UpdateRule::Logistic => state.iter().map(|x| decay * x * (1.0 - x)).collect(),
        }
    }
}

/// Per-stream parameters.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StreamParams {
    pub rule: UpdateRule,
    pub dimension: usize,
    pub decay: f64,
    pub gain: f64,
    /// Standard deviation of the per-component Gaussian noise added each tick.
    pub noise: f64,
    /// Weight of the environment observation in this stream's input.
    pub sensitivity: f64,
    /// Starting state; zeros when absent.
    #[cfg_attr(feature = "serde", serde(default))]
    pub initial: Option<Vec<f64>>,
}

impl Default for StreamParams {
    fn default() -> Self {
        Self {
            rule: UpdateRule::LeakyIntegrator,
            dimension: 1,
            decay: 0.8,
            gain: 1.0,
            noise: 0.01,
            sensitivity: 1.0,
            initial: None,
        }
    }
}

impl StreamParams {
    pub fn leaky(decay: f64, gain: f64) -> Self {
        Self {
            decay,
            gain,
            ..Default::default()
        }
    }

    pub fn oscillator(omega: f64, decay: f64, gain: f64) -> Self {
        Self {
            rule: UpdateRule::DampedOscillator { omega },
            dimension: 2,
            decay,
            gain,
            ..Default::default()
        }
    }

    pub fn logistic(rate: f64, gain: f64) -> Self {
        Self {
            rule: UpdateRule::Logistic,
            decay: rate,
            gain,
            ..Default::default()
        }
    }

    pub fn with_noise(mut self, noise: f64) -> Self {
        self.noise = noise;
        self
    }

    pub fn with_sensitivity(mut self, sensitivity: f64) -> Self {
        self.sensitivity = sensitivity;
        self
    }

    pub fn with_initial(mut self, initial: Vec<f64>) -> Self {
        self.dimension = initial.len();
        self.initial = Some(initial);
        self
    }

    pub fn validate(&self, stream: usize) -> Result<(), ConfigError> {
        if self.dimension == 0 {
            return Err(ConfigError::ZeroDimension { stream });
        }
        if let Some(required) = self.rule.required_dimension() {
            if required != self.dimension {
                return Err(ConfigError::UnsupportedDimension {
                    stream,
                    rule: self.rule.name(),
                    required,
                    found: self.dimension,
                });
            }
        }
        if let UpdateRule::DampedOscillator { omega } = self.rule {
            check_range("stream", "omega", omega, -core::f64::consts::PI, core::f64::consts::PI, "-pi..=pi")?;
        }
        if let Some(initial) = &self.initial {
            if initial.len() != self.dimension {
                return Err(ConfigError::DimensionMismatch {
                    stream,
                    expected: self.dimension,
                    found: initial.len(),
                });
            }
            if let Some(bad) = initial.iter().find(|x| !x.is_finite()) {
                return Err(ConfigError::out_of_range("stream", "initial", *bad, "finite"));
            }
        }
        check_range("stream", "decay", self.decay, 0.0, MAX_DECAY, "0..=4")?;
        check_range("stream", "gain", self.gain, 0.0, f64::MAX, ">= 0")?;
        check_range("stream", "noise", self.noise, 0.0, f64::MAX, ">= 0")?;
        check_range("stream", "sensitivity", self.sensitivity, 0.0, f64::MAX, ">= 0")?;
        Ok(())
    }
}

/// One dynamical subprocess. Owned by exactly one run.
#[derive(Debug, Clone)]
pub struct Stream {
    index: usize,
    params: StreamParams,
    state: Vec<f64>,
    last_input: Vec<f64>,
    history: Vec<Vec<f64>>,
}

impl Stream {
    pub fn new(index: usize, params: StreamParams) -> Result<Self, ConfigError> {
        params.validate(index)?;
        let state = params
            .initial
            .clone()
            .unwrap_or_else(|| vec![0.0; params.dimension]);
        let last_input = vec![0.0; params.dimension];
        Ok(Self {
            index,
            params,
            state,
            last_input,
            history: Vec::new(),
        })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn params(&self) -> &StreamParams {
        &self.params
    }

    pub fn dimension(&self) -> usize {
        self.params.dimension
    }

    pub fn state(&self) -> &[f64] {
        &self.state
    }

    pub fn last_input(&self) -> &[f64] {
        &self.last_input
    }

    /// Committed states, oldest first.
    pub fn history(&self) -> &[Vec<f64>] {
        &self.history
    }

    /// `f(x)` of the current state: the update with no input and no noise.
    pub fn relaxed(&self) -> Vec<f64> {
        self.params.rule.apply(self.params.decay, &self.state)
    }

    /// Next state from the current one. Pure: nothing on `self` changes.
    ///
    /// `input` is the summed coupling, control and external drive; `noise`
    /// holds standard-normal samples, scaled here by the stream's noise level.
    pub fn advance(&self, input: &[f64], noise: &[f64]) -> Vec<f64> {
        let mut next = self.relaxed();
        for (k, x) in next.iter_mut().enumerate() {
            *x += self.params.gain * input[k] + self.params.noise * noise[k];
        }
        next
    }

    /// Make `next` the current state and append it to the history.
    pub(crate) fn commit(&mut self, next: Vec<f64>, input: &[f64]) {
        self.last_input.clear();
        self.last_input.extend_from_slice(input);
        self.history.push(next.clone());
        self.state = next;
    }

    /// Overwrite the current state (perturbation). History is untouched.
    pub(crate) fn replace_state(&mut self, state: Vec<f64>) {
        debug_assert_eq!(state.len(), self.params.dimension);
        self.state = state;
    }

    /// Root-mean-square per-tick change over the last `window` committed states.
    pub fn recent_step_rms(&self, window: usize) -> f64 {
        rms_step(&self.history, window)
    }
}

/// RMS of successive differences over the tail of a state history.
pub(crate) fn rms_step(history: &[Vec<f64>], window: usize) -> f64 {
    let start = history.len().saturating_sub(window + 1);
    let tail = &history[start..];
    if tail.len() < 2 {
        return 0.0;
    }
    let sum: f64 = tail
        .windows(2)
        .map(|w| {
            w[1].iter()
                .zip(&w[0])
                .map(|(a, b)| (a - b).powi(2))
                .sum::<f64>()
        })
        .sum();
    (sum / (tail.len() - 1) as f64).sqrt()
}

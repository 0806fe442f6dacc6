#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::analysis::AnalysisConfig;
use crate::binding::{BindingConfig, Topology};
use crate::environment::EnvironmentKind;
use crate::error::{check_range, ConfigError};
use crate::perturbation::{PerturbationEvent, PerturbationInjector, PerturbationTarget};
use crate::stabilizer::StabilizerConfig;
use crate::stream::StreamParams;

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EnvironmentConfig {
    pub kind: EnvironmentKind,
    /// Off: the environment never receives the agent's signal.
    pub actuation_enabled: bool,
    /// Scale applied to the observation before streams see it.
    pub observation_gain: f64,
    /// Actuation signal = `actuation_scale * aggregate[0]`.
    pub actuation_scale: f64,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            kind: EnvironmentKind::Quiet,
            actuation_enabled: false,
            observation_gain: 1.0,
            actuation_scale: 1.0,
        }
    }
}

impl EnvironmentConfig {
    pub fn new(kind: EnvironmentKind) -> Self {
        Self {
            kind,
            ..Default::default()
        }
    }

    pub fn with_actuation(mut self, enabled: bool) -> Self {
        self.actuation_enabled = enabled;
        self
    }

    pub fn with_gains(mut self, observation_gain: f64, actuation_scale: f64) -> Self {
        self.observation_gain = observation_gain;
        self.actuation_scale = actuation_scale;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.kind.validate()?;
        check_range("environment", "observation_gain", self.observation_gain, -f64::MAX, f64::MAX, "finite")?;
        check_range("environment", "actuation_scale", self.actuation_scale, -f64::MAX, f64::MAX, "finite")
    }
}

/// Everything one run needs. Cloned per run; never shared between runs.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RunConfig {
    pub streams: Vec<StreamParams>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub binding: BindingConfig,
    #[cfg_attr(feature = "serde", serde(default))]
    pub environment: EnvironmentConfig,
    #[cfg_attr(feature = "serde", serde(default))]
    pub stabilizer: StabilizerConfig,
    #[cfg_attr(feature = "serde", serde(default))]
    pub perturbations: Vec<PerturbationEvent>,
    pub run_length: usize,
    pub seed: u64,
    #[cfg_attr(feature = "serde", serde(default))]
    pub analysis: AnalysisConfig,
    /// Any state magnitude beyond this ends the run as diverged.
    #[cfg_attr(feature = "serde", serde(default = "default_divergence_limit"))]
    pub divergence_limit: f64,
    /// Minimum `jump / typical step` for a perturbation to count.
    #[cfg_attr(feature = "serde", serde(default = "default_counterfactual_ratio"))]
    pub counterfactual_ratio: f64,
    /// Ticks of history used to measure the typical step.
    #[cfg_attr(feature = "serde", serde(default = "default_counterfactual_window"))]
    pub counterfactual_window: usize,
}

fn default_divergence_limit() -> f64 {
    1e12
}

fn default_counterfactual_ratio() -> f64 {
    5.0
}

fn default_counterfactual_window() -> usize {
    10
}

impl RunConfig {
    pub fn new(streams: Vec<StreamParams>, run_length: usize) -> Self {
        Self {
            streams,
            binding: BindingConfig::default(),
            environment: EnvironmentConfig::default(),
            stabilizer: StabilizerConfig::default(),
            perturbations: Vec::new(),
            run_length,
            seed: 1,
            analysis: AnalysisConfig::default(),
            divergence_limit: default_divergence_limit(),
            counterfactual_ratio: default_counterfactual_ratio(),
            counterfactual_window: default_counterfactual_window(),
        }
    }

    /// Three leaky streams (sensory, somatic, symbolic) bound through `topology`,
    /// shocked on the sensory stream at tick 30 of 100.
    pub fn triad(topology: Topology) -> Self {
        let streams = vec![
            StreamParams::leaky(0.8, 1.0),
            StreamParams::leaky(0.8, 1.0),
            StreamParams::leaky(0.95, 1.0),
        ];
        Self::new(streams, 100)
            .with_binding(BindingConfig::matrix(1.0, topology))
            .with_perturbation(PerturbationEvent::offset_stream(30, 0, vec![5.0]))
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_binding(mut self, binding: BindingConfig) -> Self {
        self.binding = binding;
        self
    }

    pub fn with_coefficient(mut self, coefficient: f64) -> Self {
        self.binding.coefficient = coefficient;
        self
    }

    pub fn with_environment(mut self, environment: EnvironmentConfig) -> Self {
        self.environment = environment;
        self
    }

    pub fn with_stabilizer(mut self, stabilizer: StabilizerConfig) -> Self {
        self.stabilizer = stabilizer;
        self
    }

    pub fn with_perturbation(mut self, event: PerturbationEvent) -> Self {
        self.perturbations.push(event);
        self
    }

    pub fn with_analysis(mut self, analysis: AnalysisConfig) -> Self {
        self.analysis = analysis;
        self
    }

    pub fn with_divergence_limit(mut self, limit: f64) -> Self {
        self.divergence_limit = limit;
        self
    }

    /// Shared state dimension of the streams (0 when there are none).
    pub fn dimension(&self) -> usize {
        self.streams.first().map(|s| s.dimension).unwrap_or(0)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.streams.is_empty() {
            return Err(ConfigError::NoStreams);
        }
        if self.run_length == 0 {
            return Err(ConfigError::EmptyRun);
        }
        let dim = self.dimension();
        for (i, s) in self.streams.iter().enumerate() {
            s.validate(i)?;
            if s.dimension != dim {
                return Err(ConfigError::DimensionMismatch {
                    stream: i,
                    expected: dim,
                    found: s.dimension,
                });
            }
        }
        self.binding.validate(self.streams.len())?;
        self.environment.validate()?;
        self.stabilizer.validate()?;
        self.analysis.validate()?;
        check_range("run", "divergence_limit", self.divergence_limit, f64::MIN_POSITIVE, f64::MAX, "> 0")?;
        check_range("run", "counterfactual_ratio", self.counterfactual_ratio, 0.0, f64::MAX, ">= 0")?;
        if self.counterfactual_window == 0 {
            return Err(ConfigError::out_of_range("run", "counterfactual_window", 0.0, ">= 1"));
        }
        self.injector().map(|_| ())
    }

    /// Checked perturbation schedule.
    pub fn injector(&self) -> Result<PerturbationInjector, ConfigError> {
        let mut injector = PerturbationInjector::new(self.run_length);
        for event in &self.perturbations {
            let expected = match event.target {
                PerturbationTarget::Stream(i) => match self.streams.get(i) {
                    Some(s) => s.dimension,
                    None => {
                        return Err(ConfigError::UnknownStream {
                            tick: event.tick,
                            stream: i,
                            stream_count: self.streams.len(),
                        })
                    }
                },
                PerturbationTarget::Environment => {
                    if matches!(self.environment.kind, EnvironmentKind::Quiet) {
                        return Err(ConfigError::InertTarget { tick: event.tick });
                    }
                    self.environment.kind.dimension()
                }
            };
            if event.delta.len() != expected {
                return Err(ConfigError::DeltaDimensionMismatch {
                    tick: event.tick,
                    expected,
                    found: event.delta.len(),
                });
            }
            injector.schedule(event.clone())?;
        }
        Ok(injector)
    }

    /// Parse and validate a JSON run description.
    #[cfg(feature = "serde")]
    pub fn from_json_str(s: &str) -> crate::error::Result<Self> {
        let cfg: Self = serde_json::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    #[cfg(feature = "serde")]
    pub fn to_json_string(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

//! One run of the testbed.
//!
//! Tick order is fixed: perturbation, environment, binding, streams,
//! stabilizer, actuation hand-off, record. Every tick reads only the state
//! committed by the previous one, so a run is a pure function of its
//! configuration and seed.

use std::sync::atomic::{AtomicBool, Ordering};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::analysis::{RecoveryAnalyzer, RecoveryReport, Regime};
use crate::binding::BindingLayer;
use crate::config::RunConfig;
use crate::environment::EnvironmentChannel;
use crate::error::ConfigError;
use crate::perturbation::{PerturbationInjector, PerturbationReport, PerturbationTarget};
use crate::prng::Prng;
use crate::stabilizer::SymbolicStabilizer;
use crate::stream::{rms_step, Stream};
use crate::trajectory::{Component, Degeneracy, Termination, TickRecord, Trajectory};

/// Everything a finished run hands back.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RunResult {
    pub seed: u64,
    pub trajectory: Trajectory,
    pub report: RecoveryReport,
    pub termination: Termination,
    pub perturbations: Vec<PerturbationReport>,
}

impl RunResult {
    pub fn regime(&self) -> Regime {
        self.report.regime
    }

    pub fn complexity_proxy(&self) -> f64 {
        self.report.complexity.proxy
    }

    /// True when every fired perturbation was large against recent motion.
    pub fn perturbations_counterfactual(&self) -> bool {
        self.perturbations.iter().all(|p| p.counterfactual)
    }

    #[cfg(feature = "serde")]
    pub fn to_json_string(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Isolated state of one run: streams, environment, generators, trajectory.
#[derive(Debug)]
pub struct Simulation {
    cfg: RunConfig,
    streams: Vec<Stream>,
    rngs: Vec<Prng>,
    binding: BindingLayer,
    env: EnvironmentChannel,
    stabilizer: Option<SymbolicStabilizer>,
    injector: PerturbationInjector,
    /// Stabilizer output waiting for the next tick, one row per stream.
    control: Vec<Vec<f64>>,
    trajectory: Trajectory,
    reports: Vec<PerturbationReport>,
    tick: usize,
    ended: Option<Termination>,
}

impl Simulation {
    pub fn new(cfg: RunConfig) -> Result<Self, ConfigError> {
        cfg.validate()?;
        let injector = cfg.injector()?;

        let streams = cfg
            .streams
            .iter()
            .enumerate()
            .map(|(i, p)| Stream::new(i, p.clone()))
            .collect::<Result<Vec<_>, _>>()?;
        let rngs = (0..streams.len()).map(|i| Prng::fork(cfg.seed, i as u64)).collect();
        let env = EnvironmentChannel::new(
            cfg.environment.kind.build(cfg.seed),
            cfg.environment.actuation_enabled,
            cfg.environment.observation_gain,
        );
        let stabilizer = cfg
            .stabilizer
            .enabled
            .then(|| SymbolicStabilizer::new(cfg.stabilizer.clone()));
        let control = vec![vec![0.0; cfg.dimension()]; streams.len()];

        tracing::debug!(
            streams = streams.len(),
            dimension = cfg.dimension(),
            coefficient = cfg.binding.coefficient,
            environment = cfg.environment.kind.name(),
            actuation = cfg.environment.actuation_enabled,
            stabilizer = cfg.stabilizer.enabled,
            run_length = cfg.run_length,
            seed = cfg.seed,
            "run configured"
        );

        Ok(Self {
            binding: BindingLayer::new(cfg.binding.clone()),
            trajectory: Trajectory::with_capacity(cfg.run_length),
            cfg,
            streams,
            rngs,
            env,
            stabilizer,
            injector,
            control,
            reports: Vec::new(),
            tick: 0,
            ended: None,
        })
    }

    pub fn tick(&self) -> usize {
        self.tick
    }

    pub fn config(&self) -> &RunConfig {
        &self.cfg
    }

    pub fn streams(&self) -> &[Stream] {
        &self.streams
    }

    pub fn environment(&self) -> &EnvironmentChannel {
        &self.env
    }

    pub fn trajectory(&self) -> &Trajectory {
        &self.trajectory
    }

    /// Advance one tick. Returns the termination once the run is over;
    /// further calls do nothing.
    pub fn step(&mut self) -> Option<Termination> {
        if let Some(t) = self.ended {
            return Some(t);
        }
        if self.tick >= self.cfg.run_length {
            self.ended = Some(Termination::Completed);
            return self.ended;
        }
        let tick = self.tick;

        if let Some(event) = self.injector.take_due(tick) {
            let window = self.cfg.counterfactual_window;
            let (current, typical) = match event.target {
                PerturbationTarget::Stream(i) => {
                    (self.streams[i].state(), self.streams[i].recent_step_rms(window))
                }
                PerturbationTarget::Environment => (self.env.state(), rms_step(self.env.history(), window)),
            };
            let report =
                PerturbationInjector::assess(&event, current, typical, self.cfg.counterfactual_ratio);
            if !report.counterfactual {
                tracing::warn!(
                    tick,
                    magnitude = report.magnitude,
                    typical_step = report.typical_step,
                    ratio = report.ratio,
                    "perturbation is not counterfactual; it may be absorbed by ordinary continuation"
                );
            }
            match event.target {
                PerturbationTarget::Stream(i) => {
                    let next = event.apply_to(self.streams[i].state());
                    self.streams[i].replace_state(next);
                }
                PerturbationTarget::Environment => {
                    let next = event.apply_to(self.env.state());
                    self.env.state_mut().copy_from_slice(&next);
                }
            }
            self.reports.push(report);
        }

        let observation = self.env.step();
        if let Some(&value) = self
            .env
            .state()
            .iter()
            .find(|x| !self.within_limit(**x))
        {
            return self.diverge(Degeneracy {
                tick,
                component: Component::Environment,
                value,
            });
        }

        let states: Vec<Vec<f64>> = self.streams.iter().map(|s| s.state().to_vec()).collect();
        let relaxed: Vec<Vec<f64>> = self.streams.iter().map(Stream::relaxed).collect();
        let (_, couplings) = self.binding.bind(tick, &states, &relaxed);

        let mut inputs = Vec::with_capacity(self.streams.len());
        let mut nexts = Vec::with_capacity(self.streams.len());
        for (i, stream) in self.streams.iter().enumerate() {
            let external = stream.params().sensitivity * observation;
            let input: Vec<f64> = couplings[i]
                .iter()
                .zip(&self.control[i])
                .map(|(c, u)| c + u + external)
                .collect();
            // Drawn every tick so the noise sequence never depends on the noise level.
            let noise: Vec<f64> = (0..stream.dimension())
                .map(|_| self.rngs[i].next_gaussian())
                .collect();
            let next = stream.advance(&input, &noise);
            if let Some(&value) = next.iter().find(|x| !self.within_limit(**x)) {
                return self.diverge(Degeneracy {
                    tick,
                    component: Component::Stream(i),
                    value,
                });
            }
            inputs.push(input);
            nexts.push(next);
        }
        for ((stream, next), input) in self.streams.iter_mut().zip(nexts).zip(&inputs) {
            stream.commit(next, input);
        }

        let states: Vec<Vec<f64>> = self.streams.iter().map(|s| s.state().to_vec()).collect();
        let global = self.binding.global_state(tick, &states);
        let applied = std::mem::replace(
            &mut self.control,
            vec![vec![0.0; self.cfg.dimension()]; self.streams.len()],
        );
        let label = self.stabilizer.as_ref().map(|stab| {
            let label = stab.categorize(&global);
            self.control = stab.feedback(&label, self.streams.len(), self.cfg.dimension());
            label
        });

        self.env.apply(self.cfg.environment.actuation_scale * global.aggregate[0]);

        self.trajectory.push(TickRecord {
            global,
            label,
            observation,
            control: applied,
        });
        self.tick += 1;
        None
    }

    fn within_limit(&self, x: f64) -> bool {
        x.is_finite() && x.abs() <= self.cfg.divergence_limit
    }

    fn diverge(&mut self, degeneracy: Degeneracy) -> Option<Termination> {
        tracing::warn!(
            tick = degeneracy.tick,
            component = %degeneracy.component,
            value = degeneracy.value,
            "run diverged; stopping early"
        );
        self.ended = Some(Termination::Diverged(degeneracy));
        self.ended
    }

    /// Run to the end and classify.
    pub fn run(mut self) -> RunResult {
        let termination = loop {
            if let Some(t) = self.step() {
                break t;
            }
        };
        self.finish(termination)
    }

    /// Like [`Simulation::run`], but abandons the run and returns `None` as
    /// soon as `cancel` is raised. The partial trajectory is dropped.
    pub fn run_until(mut self, cancel: &AtomicBool) -> Option<RunResult> {
        let termination = loop {
            if cancel.load(Ordering::Relaxed) {
                tracing::debug!(tick = self.tick, "run cancelled");
                return None;
            }
            if let Some(t) = self.step() {
                break t;
            }
        };
        Some(self.finish(termination))
    }

    fn finish(self, termination: Termination) -> RunResult {
        let onset = self.injector.onset().map(|e| e.tick);
        // Largest change actually made; events cut off by divergence never fired.
        let delta_norm = self.reports.iter().map(|r| r.magnitude).fold(0.0, f64::max);
        let report = RecoveryAnalyzer::new(self.cfg.analysis.clone()).analyze(
            &self.trajectory,
            onset,
            delta_norm,
            &termination,
        );
        tracing::debug!(
            regime = report.regime.name(),
            proxy = report.complexity.proxy,
            ticks = self.trajectory.len(),
            "run finished"
        );
        RunResult {
            seed: self.cfg.seed,
            trajectory: self.trajectory,
            report,
            termination,
            perturbations: self.reports,
        }
    }
}

/// Validate, run and classify one configuration.
pub fn run(cfg: &RunConfig) -> Result<RunResult, ConfigError> {
    Ok(Simulation::new(cfg.clone())?.run())
}

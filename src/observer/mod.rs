use std::collections::BTreeMap;

use crate::analysis::Regime;
use crate::engine::{RunResult, Simulation};
use crate::stabilizer::Category;
use crate::trajectory::Termination;

/// A read-only view of a simulation between ticks.
///
/// Design intent:
/// - Observers cannot mutate or steer a run.
/// - Snapshotting is on-demand and can allocate; the tick loop stays unchanged.
#[derive(Debug, Clone)]
pub struct SimulationSnapshot {
    pub tick: usize,
    pub states: Vec<Vec<f64>>,
    pub last_inputs: Vec<Vec<f64>>,
    pub environment: Vec<f64>,
    pub last_observation: Option<f64>,
}

pub struct SimulationAdapter<'a> {
    sim: &'a Simulation,
}

impl<'a> SimulationAdapter<'a> {
    pub fn new(sim: &'a Simulation) -> Self {
        Self { sim }
    }

    pub fn snapshot(&self) -> SimulationSnapshot {
        SimulationSnapshot {
            tick: self.sim.tick(),
            states: self.sim.streams().iter().map(|s| s.state().to_vec()).collect(),
            last_inputs: self
                .sim
                .streams()
                .iter()
                .map(|s| s.last_input().to_vec())
                .collect(),
            environment: self.sim.environment().state().to_vec(),
            last_observation: self.sim.trajectory().records().last().map(|r| r.observation),
        }
    }
}

/// Summary of a finished run, for reports.
#[derive(Debug, Clone)]
pub struct RunSnapshot {
    pub seed: u64,
    pub ticks: usize,
    pub regime: Regime,
    pub diverged: bool,
    pub proxy: f64,
    pub label_proxy: Option<f64>,
    pub compressed_bytes: usize,
    pub peak_deviation: f64,
    pub settle_tick: Option<usize>,
    pub final_aggregate: Vec<f64>,
    /// How often each aggregate-label category occurred after onset.
    pub label_histogram: BTreeMap<Vec<Category>, usize>,
    pub counterfactual: bool,
}

pub struct RunAdapter<'a> {
    result: &'a RunResult,
}

impl<'a> RunAdapter<'a> {
    pub fn new(result: &'a RunResult) -> Self {
        Self { result }
    }

    pub fn snapshot(&self) -> RunSnapshot {
        let r = self.result;
        let onset = r.report.onset.unwrap_or(0);
        let mut label_histogram = BTreeMap::new();
        for label in r.trajectory.labels().skip(onset).flatten() {
            *label_histogram.entry(label.categories.clone()).or_insert(0) += 1;
        }

        RunSnapshot {
            seed: r.seed,
            ticks: r.trajectory.len(),
            regime: r.report.regime,
            diverged: matches!(r.termination, Termination::Diverged(_)),
            proxy: r.report.complexity.proxy,
            label_proxy: r.report.complexity.label_proxy,
            compressed_bytes: r.report.complexity.compressed_bytes,
            peak_deviation: r.report.peak_deviation,
            settle_tick: r.report.settle_tick,
            final_aggregate: r
                .trajectory
                .records()
                .last()
                .map(|rec| rec.global.aggregate.clone())
                .unwrap_or_default(),
            label_histogram,
            counterfactual: r.perturbations_counterfactual(),
        }
    }
}

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::stabilizer::SymbolicLabel;

/// All stream states at one tick plus the coefficient that produced them.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GlobalState {
    pub tick: usize,
    pub states: Vec<Vec<f64>>,
    pub aggregate: Vec<f64>,
    pub coefficient: f64,
}

impl GlobalState {
    /// Stream states concatenated in stream order.
    pub fn flattened(&self) -> Vec<f64> {
        self.states.iter().flatten().copied().collect()
    }

    /// Mean squared distance of each stream from the stream mean.
    pub fn cross_stream_spread(&self) -> f64 {
        let n = self.states.len();
        if n < 2 {
            return 0.0;
        }
        let dim = self.states[0].len();
        let mut mean = vec![0.0; dim];
        for s in &self.states {
            for (m, x) in mean.iter_mut().zip(s) {
                *m += x / n as f64;
            }
        }
        self.states
            .iter()
            .map(|s| s.iter().zip(&mean).map(|(x, m)| (x - m).powi(2)).sum::<f64>())
            .sum::<f64>()
            / n as f64
    }
}

/// One tick of a run.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TickRecord {
    pub global: GlobalState,
    /// `None` when the stabilizer is disabled.
    pub label: Option<SymbolicLabel>,
    pub observation: f64,
    /// Stabilizer control fed to each stream this tick; zeros when disabled.
    pub control: Vec<Vec<f64>>,
}

impl TickRecord {
    pub fn tick(&self) -> usize {
        self.global.tick
    }
}

/// Which part of the system produced a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", content = "index", rename_all = "snake_case"))]
pub enum Component {
    Stream(usize),
    Environment,
}

impl core::fmt::Display for Component {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Component::Stream(i) => write!(f, "stream {i}"),
            Component::Environment => f.write_str("environment"),
        }
    }
}

/// A state left the representable (or configured) range mid-run.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Degeneracy {
    pub tick: usize,
    pub component: Component,
    pub value: f64,
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "snake_case"))]
pub enum Termination {
    Completed,
    Diverged(Degeneracy),
}

/// Ordered record of a run. Read-only once the run hands it out.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Trajectory {
    records: Vec<TickRecord>,
}

impl Trajectory {
    pub(crate) fn with_capacity(ticks: usize) -> Self {
        Self {
            records: Vec::with_capacity(ticks),
        }
    }

    pub(crate) fn push(&mut self, record: TickRecord) {
        debug_assert_eq!(record.tick(), self.records.len(), "ticks must be contiguous");
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[TickRecord] {
        &self.records
    }

    pub fn get(&self, tick: usize) -> Option<&TickRecord> {
        self.records.get(tick)
    }

    pub fn stream_count(&self) -> usize {
        self.records.first().map(|r| r.global.states.len()).unwrap_or(0)
    }

    /// One component of one stream over time.
    pub fn stream_series(&self, stream: usize, component: usize) -> Vec<f64> {
        self.records
            .iter()
            .map(|r| r.global.states[stream][component])
            .collect()
    }

    pub fn aggregate_series(&self, component: usize) -> Vec<f64> {
        self.records.iter().map(|r| r.global.aggregate[component]).collect()
    }

    pub fn observations(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.observation).collect()
    }

    pub fn labels(&self) -> impl Iterator<Item = Option<&SymbolicLabel>> {
        self.records.iter().map(|r| r.label.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(tick: usize, states: Vec<Vec<f64>>) -> TickRecord {
        let aggregate = vec![states.iter().map(|s| s[0]).sum::<f64>() / states.len() as f64];
        TickRecord {
            global: GlobalState {
                tick,
                states,
                aggregate,
                coefficient: 0.0,
            },
            label: None,
            observation: tick as f64,
            control: Vec::new(),
        }
    }

    #[test]
    fn series_accessors_follow_tick_order() {
        let mut t = Trajectory::with_capacity(3);
        for tick in 0..3 {
            t.push(record(tick, vec![vec![tick as f64], vec![-(tick as f64)]]));
        }
        assert_eq!(t.len(), 3);
        assert_eq!(t.stream_count(), 2);
        assert_eq!(t.stream_series(1, 0), vec![0.0, -1.0, -2.0]);
        assert_eq!(t.aggregate_series(0), vec![0.0, 0.0, 0.0]);
        assert_eq!(t.observations(), vec![0.0, 1.0, 2.0]);
        assert!(t.labels().all(|l| l.is_none()));
    }

    #[test]
    fn spread_is_zero_for_synchronised_streams() {
        let r = record(0, vec![vec![2.0], vec![2.0], vec![2.0]]);
        assert_eq!(r.global.cross_stream_spread(), 0.0);
        let r = record(0, vec![vec![1.0], vec![-1.0]]);
        assert!((r.global.cross_stream_spread() - 1.0).abs() < 1e-12);
        assert_eq!(r.global.flattened(), vec![1.0, -1.0]);
    }
}

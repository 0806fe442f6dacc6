#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{check_range, ConfigError};
use crate::trajectory::GlobalState;

/// Upper bound on the binding coefficient accepted at setup.
pub const MAX_COEFFICIENT: f64 = 2.0;

/// How stream states are combined into the shared aggregate.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", content = "weights", rename_all = "snake_case"))]
pub enum Aggregate {
    #[default]
    Mean,
    /// Weighted sum normalised by the weight total.
    Weighted(Vec<f64>),
}

/// Shape of the feedback each stream receives.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", content = "weights", rename_all = "snake_case"))]
pub enum Topology {
    /// coupling_i = k * (aggregate - x_i)
    #[default]
    MeanField,
    /// coupling_i = k * tanh(sum_j W_ij f(x_j)), per component, where f(x_j)
    /// is stream j after its own decay.
    Matrix(Vec<Vec<f64>>),
}

impl Topology {
    /// Streams coexist with no cross-talk.
    pub fn fragmented(streams: usize) -> Self {
        Topology::Matrix(vec![vec![0.0; streams]; streams])
    }

    /// Sensory/somatic loop with a symbolic stream that down-regulates both.
    pub fn coherent_triad() -> Self {
        Topology::Matrix(vec![
            vec![0.0, 0.4, -0.2],
            vec![0.4, 0.0, -0.2],
            vec![0.1, 0.1, 0.0],
        ])
    }

    /// Over-coupled triad: positive feedback on every edge.
    pub fn unstable_triad() -> Self {
        Topology::Matrix(vec![
            vec![0.0, 0.9, 0.5],
            vec![0.9, 0.0, 0.5],
            vec![0.5, 0.5, 0.0],
        ])
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BindingConfig {
    pub coefficient: f64,
    #[cfg_attr(feature = "serde", serde(default))]
    pub topology: Topology,
    #[cfg_attr(feature = "serde", serde(default))]
    pub aggregate: Aggregate,
}

impl Default for BindingConfig {
    fn default() -> Self {
        Self {
            coefficient: 0.0,
            topology: Topology::MeanField,
            aggregate: Aggregate::Mean,
        }
    }
}

impl BindingConfig {
    pub fn mean_field(coefficient: f64) -> Self {
        Self {
            coefficient,
            ..Default::default()
        }
    }

    pub fn matrix(coefficient: f64, topology: Topology) -> Self {
        Self {
            coefficient,
            topology,
            aggregate: Aggregate::Mean,
        }
    }

    pub fn validate(&self, streams: usize) -> Result<(), ConfigError> {
        check_range("binding", "coefficient", self.coefficient, 0.0, MAX_COEFFICIENT, "0..=2")?;

        if let Aggregate::Weighted(w) = &self.aggregate {
            if w.len() != streams {
                return Err(ConfigError::LengthMismatch {
                    component: "binding",
                    name: "aggregate weights",
                    expected: streams,
                    found: w.len(),
                });
            }
            for &x in w {
                check_range("binding", "aggregate weight", x, 0.0, f64::MAX, ">= 0")?;
            }
            let total: f64 = w.iter().sum();
            if total <= 0.0 || !total.is_finite() {
                return Err(ConfigError::out_of_range(
                    "binding",
                    "aggregate weight total",
                    total,
                    "> 0",
                ));
            }
        }

        if let Topology::Matrix(rows) = &self.topology {
            if rows.len() != streams {
                return Err(ConfigError::LengthMismatch {
                    component: "binding",
                    name: "interaction rows",
                    expected: streams,
                    found: rows.len(),
                });
            }
            for row in rows {
                if row.len() != streams {
                    return Err(ConfigError::LengthMismatch {
                        component: "binding",
                        name: "interaction columns",
                        expected: streams,
                        found: row.len(),
                    });
                }
                if let Some(bad) = row.iter().find(|x| !x.is_finite()) {
                    return Err(ConfigError::out_of_range(
                        "binding",
                        "interaction weight",
                        *bad,
                        "finite",
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Combines stream states and computes the per-stream coupling inputs.
#[derive(Debug, Clone)]
pub struct BindingLayer {
    cfg: BindingConfig,
}

impl BindingLayer {
    pub fn new(cfg: BindingConfig) -> Self {
        Self { cfg }
    }

    pub fn coefficient(&self) -> f64 {
        self.cfg.coefficient
    }

    pub fn config(&self) -> &BindingConfig {
        &self.cfg
    }

    /// Shared aggregate of `states`, one value per component.
    pub fn aggregate(&self, states: &[Vec<f64>]) -> Vec<f64> {
        let dim = states.first().map(|s| s.len()).unwrap_or(0);
        let mut out = vec![0.0; dim];
        match &self.cfg.aggregate {
            Aggregate::Mean => {
                for s in states {
                    for (o, x) in out.iter_mut().zip(s) {
                        *o += x;
                    }
                }
                let n = states.len().max(1) as f64;
                for o in &mut out {
                    *o /= n;
                }
            }
            Aggregate::Weighted(w) => {
                let total: f64 = w.iter().sum();
                for (s, wi) in states.iter().zip(w) {
                    for (o, x) in out.iter_mut().zip(s) {
                        *o += wi * x;
                    }
                }
                for o in &mut out {
                    *o /= total;
                }
            }
        }
        out
    }

    /// Global state of `states` at `tick`, tagged with this layer's coefficient.
    pub fn global_state(&self, tick: usize, states: &[Vec<f64>]) -> GlobalState {
        GlobalState {
            tick,
            aggregate: self.aggregate(states),
            states: states.to_vec(),
            coefficient: self.cfg.coefficient,
        }
    }

    /// Global state plus one coupling input per stream.
    ///
    /// `relaxed` holds each stream's self-dynamics `f(x)` for this tick; the
    /// matrix topology reads it, mean-field reads `states`. A zero coefficient
    /// yields exact zeros, so the streams evolve as if unbound.
    pub fn bind(
        &self,
        tick: usize,
        states: &[Vec<f64>],
        relaxed: &[Vec<f64>],
    ) -> (GlobalState, Vec<Vec<f64>>) {
        let global = self.global_state(tick, states);
        let k = self.cfg.coefficient;
        let dim = global.aggregate.len();

        if k == 0.0 {
            return (global, vec![vec![0.0; dim]; states.len()]);
        }

        let couplings = match &self.cfg.topology {
            Topology::MeanField => states
                .iter()
                .map(|s| {
                    s.iter()
                        .zip(&global.aggregate)
                        .map(|(x, a)| k * (a - x))
                        .collect()
                })
                .collect(),
            Topology::Matrix(w) => w
                .iter()
                .map(|row| {
                    (0..dim)
                        .map(|c| {
                            let drive: f64 = row.iter().zip(relaxed).map(|(wij, s)| wij * s[c]).sum();
                            k * drive.tanh()
                        })
                        .collect()
                })
                .collect(),
        };
        (global, couplings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn states() -> Vec<Vec<f64>> {
        vec![vec![1.0, -2.0], vec![3.0, 0.0], vec![-1.0, 5.0]]
    }

    #[test]
    fn zero_coefficient_is_exactly_unbound() {
        for topology in [Topology::MeanField, Topology::unstable_triad()] {
            let layer = BindingLayer::new(BindingConfig::matrix(0.0, topology));
            let (_, couplings) = layer.bind(0, &states(), &states());
            assert!(couplings
                .iter()
                .flatten()
                .all(|c| c.to_bits() == 0.0f64.to_bits()));
        }
    }

    #[test]
    fn mean_field_pulls_toward_mean() {
        let layer = BindingLayer::new(BindingConfig::mean_field(0.5));
        let (global, couplings) = layer.bind(3, &states(), &states());
        assert_eq!(global.tick, 3);
        assert_eq!(global.aggregate, vec![1.0, 1.0]);
        assert_eq!(couplings[0], vec![0.0, 1.5]);
        assert_eq!(couplings[1], vec![-1.0, 0.5]);
        // Mean-field feedback sums to zero across streams.
        let total: f64 = couplings.iter().map(|c| c[0] + c[1]).sum();
        assert!(total.abs() < 1e-12);
    }

    #[test]
    fn weighted_aggregate_normalises() {
        let cfg = BindingConfig {
            coefficient: 1.0,
            topology: Topology::MeanField,
            aggregate: Aggregate::Weighted(vec![1.0, 3.0, 0.0]),
        };
        let layer = BindingLayer::new(cfg);
        assert_eq!(layer.aggregate(&states()), vec![2.5, -0.5]);
    }

    #[test]
    fn matrix_coupling_saturates() {
        let layer = BindingLayer::new(BindingConfig::matrix(1.0, Topology::unstable_triad()));
        let big = vec![vec![100.0], vec![100.0], vec![100.0]];
        let (_, couplings) = layer.bind(0, &big, &big);
        for c in couplings {
            assert!(c[0] <= 1.0 && c[0] > 0.99);
        }
    }

    #[test]
    fn matrix_reads_decayed_states() {
        let raw = vec![vec![1.0], vec![1.0], vec![1.0]];
        let decayed = vec![vec![0.8], vec![0.8], vec![0.95]];
        let matrix = BindingLayer::new(BindingConfig::matrix(1.0, Topology::coherent_triad()));
        let (_, couplings) = matrix.bind(0, &raw, &decayed);
        // Row 0: 0.4 * 0.8 - 0.2 * 0.95
        assert!((couplings[0][0] - 0.13f64.tanh()).abs() < 1e-12);
        assert!((couplings[2][0] - 0.16f64.tanh()).abs() < 1e-12);

        let mean_field = BindingLayer::new(BindingConfig::mean_field(1.0));
        let zeros = vec![vec![0.0]; 3];
        let (_, couplings) = mean_field.bind(0, &[vec![3.0], vec![0.0], vec![0.0]], &zeros);
        assert_eq!(couplings[0], vec![-2.0]);
    }

    #[test]
    fn validation_catches_shape_and_range() {
        assert!(BindingConfig::mean_field(2.5).validate(2).is_err());
        assert!(BindingConfig::mean_field(-0.1).validate(2).is_err());
        assert!(BindingConfig::matrix(1.0, Topology::coherent_triad()).validate(3).is_ok());
        assert!(matches!(
            BindingConfig::matrix(1.0, Topology::coherent_triad()).validate(2),
            Err(ConfigError::LengthMismatch { name: "interaction rows", .. })
        ));
        let weighted = BindingConfig {
            aggregate: Aggregate::Weighted(vec![0.0, 0.0]),
            ..BindingConfig::mean_field(0.3)
        };
        assert!(weighted.validate(2).is_err());
    }
}

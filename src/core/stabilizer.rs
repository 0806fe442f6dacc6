#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{check_range, ConfigError};
use crate::trajectory::GlobalState;

/// Region of state space along one component. Carries no meaning beyond that.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Category(pub i16);

/// The stabilizer's output for one tick: one category per categorized component.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SymbolicLabel {
    pub categories: Vec<Category>,
}

impl SymbolicLabel {
    /// True when every component sits in the neutral region.
    pub fn is_neutral(&self) -> bool {
        self.categories.iter().all(|c| c.0 == 0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "snake_case"))]
pub enum Discretization {
    /// {-1, 0, +1} around a deadband of half-width `threshold`.
    Threshold { threshold: f64 },
    /// Fixed-width bins centred on zero, index clamped to `[-levels, levels]`.
    Bins { width: f64, levels: u8 },
}

impl Discretization {
    pub fn categorize(&self, x: f64) -> Category {
        match *self {
            Discretization::Threshold { threshold } => {
                if x > threshold {
                    Category(1)
                } else if x < -threshold {
                    Category(-1)
                } else {
                    Category(0)
                }
            }
            Discretization::Bins { width, levels } => {
                let max = levels as f64;
                // NaN falls into the neutral bin.
                let idx = (x / width).round().clamp(-max, max);
                Category(if idx.is_nan() { 0 } else { idx as i16 })
            }
        }
    }

    /// Representative value of a category, before the feedback gain.
    fn center(&self, c: Category) -> f64 {
        match *self {
            Discretization::Threshold { .. } => c.0 as f64,
            Discretization::Bins { width, .. } => c.0 as f64 * width,
        }
    }

    /// Number of distinct categories per component.
    pub fn alphabet_size(&self) -> usize {
        match *self {
            Discretization::Threshold { .. } => 3,
            Discretization::Bins { levels, .. } => 2 * levels as usize + 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum StabilizerScope {
    /// Categorize the aggregate; every stream gets the same control.
    #[default]
    Aggregate,
    /// Categorize and control each stream separately.
    PerStream,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StabilizerConfig {
    pub enabled: bool,
    #[cfg_attr(feature = "serde", serde(default))]
    pub scope: StabilizerScope,
    pub discretization: Discretization,
    pub feedback_gain: f64,
    /// Per-component bound on the control magnitude.
    pub max_feedback: f64,
}

impl Default for StabilizerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            scope: StabilizerScope::Aggregate,
            discretization: Discretization::Bins {
                width: 0.25,
                levels: 8,
            },
            feedback_gain: 0.3,
            max_feedback: 1.0,
        }
    }
}

impl StabilizerConfig {
    /// Default binning with the stabilizer switched on.
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            ..Default::default()
        }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn with_scope(mut self, scope: StabilizerScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_discretization(mut self, discretization: Discretization) -> Self {
        self.discretization = discretization;
        self
    }

    pub fn with_feedback(mut self, gain: f64, max: f64) -> Self {
        self.feedback_gain = gain;
        self.max_feedback = max;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.discretization {
            Discretization::Threshold { threshold } => {
                check_range("stabilizer", "threshold", threshold, f64::MIN_POSITIVE, f64::MAX, "> 0")?;
            }
            Discretization::Bins { width, levels } => {
                check_range("stabilizer", "bin width", width, f64::MIN_POSITIVE, f64::MAX, "> 0")?;
                if levels == 0 {
                    return Err(ConfigError::out_of_range("stabilizer", "levels", 0.0, ">= 1"));
                }
            }
        }
        check_range("stabilizer", "feedback_gain", self.feedback_gain, 0.0, f64::MAX, ">= 0")?;
        check_range("stabilizer", "max_feedback", self.max_feedback, f64::MIN_POSITIVE, f64::MAX, "> 0")?;
        Ok(())
    }
}

/// Discrete categorizer feeding bounded negative feedback into the streams.
#[derive(Debug, Clone)]
pub struct SymbolicStabilizer {
    cfg: StabilizerConfig,
}

impl SymbolicStabilizer {
    pub fn new(cfg: StabilizerConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &StabilizerConfig {
        &self.cfg
    }

    pub fn categorize(&self, global: &GlobalState) -> SymbolicLabel {
        let d = self.cfg.discretization;
        let categories = match self.cfg.scope {
            StabilizerScope::Aggregate => global.aggregate.iter().map(|&x| d.categorize(x)).collect(),
            StabilizerScope::PerStream => global
                .states
                .iter()
                .flatten()
                .map(|&x| d.categorize(x))
                .collect(),
        };
        SymbolicLabel { categories }
    }

    /// Control input for each stream, bounded by `max_feedback` per component
    /// whatever the label.
    pub fn feedback(&self, label: &SymbolicLabel, streams: usize, dimension: usize) -> Vec<Vec<f64>> {
        let max = self.cfg.max_feedback;
        let control: Vec<f64> = label
            .categories
            .iter()
            .map(|&c| (-self.cfg.feedback_gain * self.cfg.discretization.center(c)).clamp(-max, max))
            .collect();

        match self.cfg.scope {
            StabilizerScope::Aggregate => vec![control; streams],
            StabilizerScope::PerStream => control.chunks(dimension).map(|c| c.to_vec()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn global(states: Vec<Vec<f64>>) -> GlobalState {
        let n = states.len() as f64;
        let dim = states[0].len();
        let aggregate = (0..dim).map(|c| states.iter().map(|s| s[c]).sum::<f64>() / n).collect();
        GlobalState {
            tick: 0,
            states,
            aggregate,
            coefficient: 0.0,
        }
    }

    #[test]
    fn threshold_has_a_deadband() {
        let d = Discretization::Threshold { threshold: 0.05 };
        assert_eq!(d.categorize(0.04), Category(0));
        assert_eq!(d.categorize(0.06), Category(1));
        assert_eq!(d.categorize(-0.5), Category(-1));
        assert_eq!(d.alphabet_size(), 3);
    }

    #[test]
    fn bins_round_and_clamp() {
        let d = Discretization::Bins { width: 0.25, levels: 8 };
        assert_eq!(d.categorize(0.1), Category(0));
        assert_eq!(d.categorize(0.2), Category(1));
        assert_eq!(d.categorize(-0.6), Category(-2));
        assert_eq!(d.categorize(1e9), Category(8));
        assert_eq!(d.categorize(f64::NEG_INFINITY), Category(-8));
        assert_eq!(d.categorize(f64::NAN), Category(0));
        assert_eq!(d.alphabet_size(), 17);
    }

    #[test]
    fn feedback_opposes_and_is_bounded() {
        let stab = SymbolicStabilizer::new(StabilizerConfig::enabled().with_feedback(0.3, 0.5));
        let small = stab.categorize(&global(vec![vec![0.5]]));
        let huge = stab.categorize(&global(vec![vec![1e12]]));

        let c_small = stab.feedback(&small, 1, 1);
        let c_huge = stab.feedback(&huge, 1, 1);
        assert!((c_small[0][0] + 0.15).abs() < 1e-12);
        assert_eq!(c_huge[0][0], -0.5);

        let neutral = stab.categorize(&global(vec![vec![0.01]]));
        assert!(neutral.is_neutral());
        assert_eq!(stab.feedback(&neutral, 1, 1)[0][0], 0.0);
    }

    #[test]
    fn aggregate_scope_broadcasts_and_per_stream_splits() {
        let states = vec![vec![1.0, 0.0], vec![-1.0, 0.0]];
        let agg = SymbolicStabilizer::new(StabilizerConfig::enabled());
        let label = agg.categorize(&global(states.clone()));
        assert_eq!(label.categories, vec![Category(0), Category(0)]);
        assert_eq!(agg.feedback(&label, 2, 2).len(), 2);

        let per = SymbolicStabilizer::new(StabilizerConfig::enabled().with_scope(StabilizerScope::PerStream));
        let label = per.categorize(&global(states));
        assert_eq!(
            label.categories,
            vec![Category(4), Category(0), Category(-4), Category(0)]
        );
        let control = per.feedback(&label, 2, 2);
        assert!(control[0][0] < 0.0 && control[1][0] > 0.0);
        assert_eq!(control[0][1], 0.0);
    }

    #[test]
    fn validation_requires_positive_parameters() {
        let bad = StabilizerConfig::enabled()
            .with_discretization(Discretization::Bins { width: 0.0, levels: 4 });
        assert!(bad.validate().is_err());
        let bad = StabilizerConfig::enabled().with_discretization(Discretization::Bins { width: 0.1, levels: 0 });
        assert!(bad.validate().is_err());
        assert!(StabilizerConfig::enabled().with_feedback(0.3, 0.0).validate().is_err());
        assert!(StabilizerConfig::enabled().validate().is_ok());
    }
}

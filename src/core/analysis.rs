//! Post-perturbation regime classification.
//!
//! The analyzer measures how far the flattened stream state sits from its
//! pre-perturbation mean at every tick after onset, runs a small phase
//! machine over that deviation series, and applies threshold tests that
//! penalise too little response (frozen, collapse) and too much response
//! (runaway) alike.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::complexity::{self, ComplexityReport};
use crate::error::{check_range, ConfigError};
use crate::stabilizer::SymbolicLabel;
use crate::trajectory::{Termination, Trajectory};

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct AnalysisConfig {
    /// Ticks before onset averaged into the baseline.
    pub baseline_window: usize,
    pub min_baseline: usize,
    pub min_tail: usize,
    /// Late-window temporal variance below this counts as no movement.
    pub frozen_variance: f64,
    /// Late/early mean deviation ratio that counts as growth.
    pub growth_ratio: f64,
    /// Late deviation must also exceed this, plus the noise floor, for growth to count.
    pub runaway_floor: f64,
    /// Noise floor as a multiple of the largest deviation from the baseline
    /// mean inside the baseline window. Responses must clear it.
    pub noise_multiple: f64,
    /// Peak deviation beyond `excursion_ratio * |delta|` is unbounded.
    pub excursion_ratio: f64,
    /// Fraction of the peak a settled deviation must fall under.
    pub recovery_fraction: f64,
    /// Late cross-stream spread below this share of the baseline spread is collapse.
    pub collapse_ratio: f64,
    /// Baseline spreads below this are too small to compare against.
    pub spread_floor: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            baseline_window: 20,
            min_baseline: 4,
            min_tail: 16,
            frozen_variance: 1e-6,
            growth_ratio: 1.5,
            runaway_floor: 1e-2,
            noise_multiple: 5.0,
            excursion_ratio: 10.0,
            recovery_fraction: 0.5,
            collapse_ratio: 0.05,
            spread_floor: 1e-9,
        }
    }
}

impl AnalysisConfig {
    pub fn with_baseline_window(mut self, ticks: usize) -> Self {
        self.baseline_window = ticks;
        self
    }

    pub fn with_min_tail(mut self, ticks: usize) -> Self {
        self.min_tail = ticks;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.baseline_window < self.min_baseline {
            return Err(ConfigError::out_of_range(
                "analysis",
                "baseline_window",
                self.baseline_window as f64,
                ">= min_baseline",
            ));
        }
        check_range("analysis", "frozen_variance", self.frozen_variance, 0.0, f64::MAX, ">= 0")?;
        check_range("analysis", "growth_ratio", self.growth_ratio, 1.0, f64::MAX, ">= 1")?;
        check_range("analysis", "runaway_floor", self.runaway_floor, 0.0, f64::MAX, ">= 0")?;
        check_range("analysis", "noise_multiple", self.noise_multiple, 0.0, f64::MAX, ">= 0")?;
        check_range("analysis", "excursion_ratio", self.excursion_ratio, 1.0, f64::MAX, ">= 1")?;
        check_range("analysis", "recovery_fraction", self.recovery_fraction, 0.0, 1.0, "0..=1")?;
        check_range("analysis", "collapse_ratio", self.collapse_ratio, 0.0, 1.0, "0..=1")?;
        check_range("analysis", "spread_floor", self.spread_floor, 0.0, f64::MAX, ">= 0")?;
        Ok(())
    }
}

/// Why a run could not be classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "snake_case"))]
pub enum Ambiguity {
    NoPerturbation,
    TailTooShort { len: usize, min: usize },
    BaselineTooShort { len: usize, min: usize },
    /// The tail never left the pre-onset noise envelope.
    NoResponse,
    /// Enough data, but no rule matched.
    Unresolved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "regime", content = "reason", rename_all = "snake_case"))]
pub enum Regime {
    Frozen,
    RegulatedRecovery,
    Collapse,
    Runaway,
    Indeterminate(Ambiguity),
}

impl Regime {
    pub fn name(&self) -> &'static str {
        match self {
            Regime::Frozen => "frozen",
            Regime::RegulatedRecovery => "regulated-recovery",
            Regime::Collapse => "collapse",
            Regime::Runaway => "runaway",
            Regime::Indeterminate(_) => "indeterminate",
        }
    }
}

impl core::fmt::Display for Regime {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Regime::Indeterminate(why) => write!(f, "indeterminate ({why:?})"),
            other => f.write_str(other.name()),
        }
    }
}

/// Phase of the deviation series after onset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Deviation still at or above its running peak.
    Excursion,
    Decaying,
    /// Within the settle band; relapses go back to `Decaying`.
    Settled { since: usize },
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RecoveryReport {
    pub regime: Regime,
    pub onset: Option<usize>,
    pub peak_deviation: f64,
    pub peak_tick: Option<usize>,
    /// Deviation a response has to exceed to count as one.
    pub noise_floor: f64,
    /// Start of the final settled streak, if the run ended settled.
    pub settle_tick: Option<usize>,
    pub early_deviation: f64,
    pub late_deviation: f64,
    pub late_variance: f64,
    /// Late over baseline cross-stream spread; `None` for a single stream.
    pub spread_ratio: Option<f64>,
    pub complexity: ComplexityReport,
}

impl RecoveryReport {
    fn unclassified(regime: Regime, onset: Option<usize>) -> Self {
        Self {
            regime,
            onset,
            peak_deviation: 0.0,
            peak_tick: None,
            noise_floor: 0.0,
            settle_tick: None,
            early_deviation: 0.0,
            late_deviation: 0.0,
            late_variance: 0.0,
            spread_ratio: None,
            complexity: ComplexityReport::default(),
        }
    }
}

/// Threshold-based classifier over a finished trajectory.
#[derive(Debug, Clone, Default)]
pub struct RecoveryAnalyzer {
    cfg: AnalysisConfig,
}

impl RecoveryAnalyzer {
    pub fn new(cfg: AnalysisConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.cfg
    }

    /// Classify the tail starting at `onset`.
    ///
    /// `delta_norm` is the largest jump any fired perturbation made; it
    /// bounds what counts as a proportionate excursion.
    pub fn analyze(
        &self,
        trajectory: &Trajectory,
        onset: Option<usize>,
        delta_norm: f64,
        termination: &Termination,
    ) -> RecoveryReport {
        let cfg = &self.cfg;
        let records = trajectory.records();

        let Some(onset) = onset else {
            let regime = match termination {
                Termination::Diverged(_) => Regime::Runaway,
                Termination::Completed => Regime::Indeterminate(Ambiguity::NoPerturbation),
            };
            return RecoveryReport::unclassified(regime, None);
        };

        let states: Vec<Vec<f64>> = records.iter().map(|r| r.global.flattened()).collect();
        let base_start = onset.saturating_sub(cfg.baseline_window);
        let base_end = onset.min(states.len());
        let baseline = &states[base_start.min(base_end)..base_end];
        let tail = states.get(onset..).unwrap_or(&[]);

        let complexity = {
            let from = onset.saturating_sub(1).min(states.len());
            let labels: Vec<&SymbolicLabel> = records
                .get(onset..)
                .unwrap_or(&[])
                .iter()
                .filter_map(|r| r.label.as_ref())
                .collect();
            complexity::analyze(&states[from..], &labels)
        };

        let guard = match termination {
            Termination::Diverged(_) => Some(Regime::Runaway),
            Termination::Completed if tail.len() < cfg.min_tail => {
                Some(Regime::Indeterminate(Ambiguity::TailTooShort {
                    len: tail.len(),
                    min: cfg.min_tail,
                }))
            }
            Termination::Completed if baseline.len() < cfg.min_baseline => {
                Some(Regime::Indeterminate(Ambiguity::BaselineTooShort {
                    len: baseline.len(),
                    min: cfg.min_baseline,
                }))
            }
            Termination::Completed => None,
        };
        if baseline.is_empty() || tail.is_empty() {
            let mut report = RecoveryReport::unclassified(
                guard.unwrap_or(Regime::Indeterminate(Ambiguity::Unresolved)),
                Some(onset),
            );
            report.complexity = complexity;
            return report;
        }

        let base_mean = mean_vector(baseline);
        let base_rms = (baseline
            .iter()
            .map(|s| distance_sq(s, &base_mean))
            .sum::<f64>()
            / baseline.len() as f64)
            .sqrt();
        let envelope = baseline
            .iter()
            .map(|s| distance_sq(s, &base_mean).sqrt())
            .fold(0.0, f64::max);
        let noise_floor = cfg.noise_multiple * envelope;
        let deviation: Vec<f64> = tail.iter().map(|s| distance_sq(s, &base_mean).sqrt()).collect();

        // Phase machine over the deviation series.
        let mut phase = Phase::Excursion;
        let mut peak = 0.0f64;
        let mut peak_at = 0usize;
        for (i, &d) in deviation.iter().enumerate() {
            if d >= peak {
                peak = d;
                peak_at = i;
                phase = Phase::Excursion;
                continue;
            }
            let settled = d <= cfg.recovery_fraction * peak + base_rms;
            phase = match (phase, settled) {
                (Phase::Settled { since }, true) => Phase::Settled { since },
                (_, true) => Phase::Settled { since: i },
                (_, false) => Phase::Decaying,
            };
        }
        let settled_since = match phase {
            Phase::Settled { since } => Some(since),
            _ => None,
        };

        let window = (tail.len() / 4).max(4).min(tail.len());
        let early = mean(&deviation[..window]);
        let late = mean(&deviation[deviation.len() - window..]);
        let late_states = &tail[tail.len() - window..];
        let late_mean = mean_vector(late_states);
        let late_variance = late_states
            .iter()
            .map(|s| distance_sq(s, &late_mean))
            .sum::<f64>()
            / late_states.len() as f64;

        let spread_ratio = (trajectory.stream_count() >= 2).then(|| {
            let spread = |range: &[crate::trajectory::TickRecord]| {
                mean(&range.iter().map(|r| r.global.cross_stream_spread()).collect::<Vec<_>>())
            };
            let base_spread = spread(&records[base_start..base_end]);
            let late_spread = spread(&records[records.len() - window..]);
            if base_spread > cfg.spread_floor {
                late_spread / base_spread
            } else {
                f64::INFINITY
            }
        });

        let regime = guard.unwrap_or_else(|| {
            let excursion_bound = cfg.excursion_ratio * delta_norm.max(cfg.runaway_floor) + noise_floor;
            let growing = late > cfg.growth_ratio * early && late > cfg.runaway_floor + noise_floor;
            if peak > excursion_bound || growing {
                Regime::Runaway
            } else if late_variance < cfg.frozen_variance {
                let offset = distance_sq(&late_mean, &base_mean).sqrt();
                if offset > cfg.recovery_fraction * peak {
                    Regime::Collapse
                } else {
                    Regime::Frozen
                }
            } else if peak <= noise_floor {
                Regime::Indeterminate(Ambiguity::NoResponse)
            } else if spread_ratio.is_some_and(|r| r < cfg.collapse_ratio) {
                Regime::Collapse
            } else if settled_since.is_some_and(|since| deviation.len() - since >= window) {
                Regime::RegulatedRecovery
            } else {
                Regime::Indeterminate(Ambiguity::Unresolved)
            }
        });

        tracing::debug!(
            regime = regime.name(),
            peak,
            noise_floor,
            early,
            late,
            late_variance,
            "classified tail"
        );

        RecoveryReport {
            regime,
            onset: Some(onset),
            peak_deviation: peak,
            peak_tick: Some(onset + peak_at),
            noise_floor,
            settle_tick: settled_since.map(|s| onset + s),
            early_deviation: early,
            late_deviation: late,
            late_variance,
            spread_ratio,
            complexity,
        }
    }
}

fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    xs.iter().sum::<f64>() / xs.len() as f64
}

fn mean_vector(rows: &[Vec<f64>]) -> Vec<f64> {
    let dim = rows.first().map(|r| r.len()).unwrap_or(0);
    let mut out = vec![0.0; dim];
    for r in rows {
        for (o, x) in out.iter_mut().zip(r) {
            *o += x;
        }
    }
    let n = rows.len().max(1) as f64;
    out.iter_mut().for_each(|o| *o /= n);
    out
}

fn distance_sq(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trajectory::{Component, Degeneracy, GlobalState, TickRecord};

    fn trajectory(series: &[Vec<f64>]) -> Trajectory {
        let mut t = Trajectory::with_capacity(series[0].len());
        for tick in 0..series[0].len() {
            let states: Vec<Vec<f64>> = series.iter().map(|s| vec![s[tick]]).collect();
            let aggregate = vec![states.iter().map(|s| s[0]).sum::<f64>() / states.len() as f64];
            t.push(TickRecord {
                global: GlobalState {
                    tick,
                    states,
                    aggregate,
                    coefficient: 0.0,
                },
                label: None,
                observation: 0.0,
                control: Vec::new(),
            });
        }
        t
    }

    /// Deterministic jitter so variances are non-zero.
    fn jitter(t: usize) -> f64 {
        0.02 * ((t * 7919 % 13) as f64 / 13.0 - 0.5)
    }

    fn classify(series: &[Vec<f64>]) -> RecoveryReport {
        RecoveryAnalyzer::default().analyze(&trajectory(series), Some(50), 5.0, &Termination::Completed)
    }

    #[test]
    fn decaying_excursion_with_noise_is_regulated_recovery() {
        let s: Vec<f64> = (0..100)
            .map(|t| {
                let bump = if t >= 50 { 5.0 * 0.8f64.powi(t as i32 - 50) } else { 0.0 };
                bump + jitter(t)
            })
            .collect();
        let report = classify(&[s]);
        assert_eq!(report.regime, Regime::RegulatedRecovery);
        assert_eq!(report.peak_tick, Some(50));
        assert!(report.settle_tick.is_some_and(|t| t > 50));
    }

    #[test]
    fn exponential_growth_is_runaway() {
        let s: Vec<f64> = (0..100)
            .map(|t| if t >= 50 { 5.0 * 1.05f64.powi(t as i32 - 50) } else { jitter(t) })
            .collect();
        assert_eq!(classify(&[s]).regime, Regime::Runaway);
    }

    #[test]
    fn motionless_return_is_frozen() {
        let s: Vec<f64> = (0..100)
            .map(|t| if t >= 50 { 2.5 * 0.5f64.powi(t as i32 - 50) } else { 0.0 })
            .collect();
        let report = classify(&[s]);
        assert_eq!(report.regime, Regime::Frozen);
        assert_eq!(report.complexity.phrases, 3);
    }

    #[test]
    fn stuck_offset_is_collapse() {
        let s: Vec<f64> = (0..100).map(|t| if t >= 50 { 4.0 } else { jitter(t) }).collect();
        assert_eq!(classify(&[s]).regime, Regime::Collapse);
    }

    #[test]
    fn streams_locking_together_is_collapse() {
        let a: Vec<f64> = (0..100)
            .map(|t| if t < 50 { 1.0 + jitter(t) } else { 0.3 * (t as f64 * 0.7).sin() })
            .collect();
        let b: Vec<f64> = (0..100)
            .map(|t| if t < 50 { -1.0 + jitter(t + 3) } else { 0.3 * (t as f64 * 0.7).sin() })
            .collect();
        let report = classify(&[a, b]);
        assert_eq!(report.regime, Regime::Collapse);
        assert!(report.spread_ratio.is_some_and(|r| r < 0.05));
    }

    #[test]
    fn noise_alone_is_no_response() {
        let s: Vec<f64> = (0..100).map(jitter).collect();
        let report = classify(&[s]);
        assert_eq!(report.regime, Regime::Indeterminate(Ambiguity::NoResponse));
        assert!(report.peak_deviation <= report.noise_floor);

        // Same noise with a zero-size perturbation.
        let t = trajectory(&[(0..100).map(jitter).collect()]);
        let regime = RecoveryAnalyzer::default()
            .analyze(&t, Some(50), 0.0, &Termination::Completed)
            .regime;
        assert_eq!(regime, Regime::Indeterminate(Ambiguity::NoResponse));
    }

    #[test]
    fn short_windows_are_indeterminate() {
        let s = vec![0.0; 60];
        let analyzer = RecoveryAnalyzer::default();
        let t = trajectory(&[s]);
        assert_eq!(
            analyzer.analyze(&t, Some(50), 5.0, &Termination::Completed).regime,
            Regime::Indeterminate(Ambiguity::TailTooShort { len: 10, min: 16 })
        );
        assert_eq!(
            analyzer.analyze(&t, Some(2), 5.0, &Termination::Completed).regime,
            Regime::Indeterminate(Ambiguity::BaselineTooShort { len: 2, min: 4 })
        );
        assert_eq!(
            analyzer.analyze(&t, None, 0.0, &Termination::Completed).regime,
            Regime::Indeterminate(Ambiguity::NoPerturbation)
        );
    }

    #[test]
    fn divergence_is_always_runaway() {
        let t = trajectory(&[vec![0.0; 52]]);
        let diverged = Termination::Diverged(Degeneracy {
            tick: 52,
            component: Component::Stream(0),
            value: f64::INFINITY,
        });
        let analyzer = RecoveryAnalyzer::default();
        assert_eq!(analyzer.analyze(&t, Some(50), 5.0, &diverged).regime, Regime::Runaway);
        assert_eq!(analyzer.analyze(&t, None, 0.0, &diverged).regime, Regime::Runaway);
    }

    #[test]
    fn regime_names() {
        assert_eq!(Regime::RegulatedRecovery.to_string(), "regulated-recovery");
        assert_eq!(Regime::Indeterminate(Ambiguity::Unresolved).name(), "indeterminate");
    }
}

// Independent runs, optionally spread over a thread pool.
//
// Runs share nothing, so the only coordination is collecting results in
// input order.

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::config::RunConfig;
use crate::engine::{self, RunResult};
use crate::error::ConfigError;

/// Run every configuration. Results keep the input order; a configuration
/// that fails validation yields its error without affecting the others.
pub fn run_batch(configs: &[RunConfig]) -> Vec<Result<RunResult, ConfigError>> {
    tracing::debug!(runs = configs.len(), "starting batch");

    #[cfg(feature = "parallel")]
    {
        configs.par_iter().map(engine::run).collect()
    }

    #[cfg(not(feature = "parallel"))]
    {
        configs.iter().map(engine::run).collect()
    }
}

/// One result per coefficient, everything else held at `base`.
pub fn sweep_binding(base: &RunConfig, coefficients: &[f64]) -> Vec<(f64, Result<RunResult, ConfigError>)> {
    let configs: Vec<RunConfig> = coefficients
        .iter()
        .map(|&k| base.clone().with_coefficient(k))
        .collect();
    coefficients.iter().copied().zip(run_batch(&configs)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::perturbation::PerturbationEvent;
    use crate::stream::StreamParams;

    fn base() -> RunConfig {
        RunConfig::new(vec![StreamParams::default(); 2], 60)
            .with_seed(5)
            .with_perturbation(PerturbationEvent::offset_stream(30, 0, vec![4.0]))
    }

    #[test]
    fn batch_matches_sequential_runs() {
        let configs: Vec<RunConfig> = (1..4).map(|s| base().with_seed(s)).collect();
        let batch = run_batch(&configs);
        for (cfg, result) in configs.iter().zip(batch) {
            assert_eq!(result.unwrap(), engine::run(cfg).unwrap());
        }
    }

    #[test]
    fn sweep_reports_each_coefficient_and_isolates_errors() {
        let sweep = sweep_binding(&base(), &[0.0, 0.5, 5.0]);
        assert_eq!(sweep.len(), 3);
        assert_eq!(sweep[1].0, 0.5);
        let coefficient = sweep[1].1.as_ref().map(|r| r.trajectory.records()[0].global.coefficient);
        assert_eq!(coefficient, Ok(0.5));
        assert!(sweep[0].1.is_ok());
        assert!(matches!(sweep[2].1, Err(ConfigError::OutOfRange { .. })));
    }
}

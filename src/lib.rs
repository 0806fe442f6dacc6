//! # streambind
//!
//! A small dynamical-systems testbed for telling qualitative regimes of a
//! multi-stream agent apart.
//!
//! A run wires N streams through a binding layer, couples them to an
//! environment in both directions, optionally adds a symbolic stabilizer,
//! applies a scheduled perturbation and then classifies the tail as frozen,
//! regulated recovery, collapse, runaway or indeterminate. Nothing learns and
//! nothing is fitted: the point is comparing conditions under a fixed seed.
//!
//! ## Quick Start
//!
//! ```
//! use streambind::prelude::*;
//!
//! let cfg = RunConfig::new(vec![StreamParams::leaky(1.05, 1.0)], 100)
//!     .with_seed(7)
//!     .with_stabilizer(StabilizerConfig::enabled())
//!     .with_perturbation(PerturbationEvent::offset_stream(50, 0, vec![5.0]));
//!
//! let result = streambind::engine::run(&cfg).unwrap();
//! println!("{} (proxy {:.3})", result.regime(), result.complexity_proxy());
//! ```
//!
//! ## Feature Flags
//!
//! - `serde` (default): JSON configuration and result export
//! - `parallel`: run batches on a rayon thread pool
//!
//! ## Modules
//!
//! - [`engine`]: one run, tick by tick
//! - [`analysis`]: regime classification
//! - [`complexity`]: Lempel–Ziv complexity proxy
//! - [`batch`]: independent runs and binding sweeps
//! - [`observer`]: read-only summaries

#[path = "core/prng.rs"]
pub mod prng;

#[path = "core/error.rs"]
pub mod error;

#[path = "core/stream.rs"]
pub mod stream;

#[path = "core/binding.rs"]
pub mod binding;

#[path = "core/trajectory.rs"]
pub mod trajectory;

#[path = "core/environment.rs"]
pub mod environment;

#[path = "core/stabilizer.rs"]
pub mod stabilizer;

#[path = "core/perturbation.rs"]
pub mod perturbation;

#[path = "core/complexity.rs"]
pub mod complexity;

#[path = "core/analysis.rs"]
pub mod analysis;

#[path = "core/config.rs"]
pub mod config;

#[path = "core/engine.rs"]
pub mod engine;

#[path = "core/batch.rs"]
pub mod batch;

pub mod observer;

/// Commonly used types.
pub mod prelude {
    pub use crate::analysis::{AnalysisConfig, Ambiguity, RecoveryReport, Regime};
    pub use crate::batch::{run_batch, sweep_binding};
    pub use crate::binding::{Aggregate, BindingConfig, Topology};
    pub use crate::config::{EnvironmentConfig, RunConfig};
    pub use crate::engine::{RunResult, Simulation};
    pub use crate::environment::EnvironmentKind;
    pub use crate::error::{ConfigError, Error};
    pub use crate::perturbation::{PerturbationEvent, PerturbationTarget};
    pub use crate::stabilizer::{Discretization, StabilizerConfig, StabilizerScope};
    pub use crate::stream::{StreamParams, UpdateRule};
    pub use crate::trajectory::{Termination, Trajectory};
}

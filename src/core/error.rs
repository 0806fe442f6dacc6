use thiserror::Error;

/// Setup-time configuration problems. A run with any of these never starts.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("run must contain at least one stream")]
    NoStreams,

    #[error("run length must be > 0")]
    EmptyRun,

    #[error("stream {stream}: state dimension must be > 0")]
    ZeroDimension { stream: usize },

    #[error("stream {stream}: dimension {found} does not match run dimension {expected}")]
    DimensionMismatch {
        stream: usize,
        expected: usize,
        found: usize,
    },

    #[error("stream {stream}: {rule} requires dimension {required}, got {found}")]
    UnsupportedDimension {
        stream: usize,
        rule: &'static str,
        required: usize,
        found: usize,
    },

    #[error("{component}: {name} = {value} is out of range ({expected})")]
    OutOfRange {
        component: &'static str,
        name: &'static str,
        value: f64,
        expected: &'static str,
    },

    #[error("{component}: expected {expected} entries for {name}, got {found}")]
    LengthMismatch {
        component: &'static str,
        name: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("perturbation at tick {tick} is outside the run [0, {run_length})")]
    PerturbationOutOfRange { tick: usize, run_length: usize },

    #[error("more than one perturbation scheduled at tick {tick}")]
    DuplicatePerturbation { tick: usize },

    #[error("perturbation at tick {tick} targets stream {stream}, but the run has {stream_count}")]
    UnknownStream {
        tick: usize,
        stream: usize,
        stream_count: usize,
    },

    #[error("perturbation at tick {tick}: delta has {found} components, target has {expected}")]
    DeltaDimensionMismatch {
        tick: usize,
        expected: usize,
        found: usize,
    },

    #[error("perturbation at tick {tick}: delta contains a non-finite value")]
    NonFiniteDelta { tick: usize },

    #[error("perturbation at tick {tick} targets the quiet environment, which has no dynamics to move")]
    InertTarget { tick: usize },
}

impl ConfigError {
    pub(crate) fn out_of_range(
        component: &'static str,
        name: &'static str,
        value: f64,
        expected: &'static str,
    ) -> Self {
        Self::OutOfRange {
            component,
            name,
            value,
            expected,
        }
    }
}

/// Crate-level error: configuration plus the JSON surface.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = core::result::Result<T, Error>;

/// Check `lo <= value <= hi` with a finite value.
pub(crate) fn check_range(
    component: &'static str,
    name: &'static str,
    value: f64,
    lo: f64,
    hi: f64,
    expected: &'static str,
) -> core::result::Result<(), ConfigError> {
    if value.is_finite() && value >= lo && value <= hi {
        Ok(())
    } else {
        Err(ConfigError::out_of_range(component, name, value, expected))
    }
}

use thiserror::Error;

/// Malformed input rejected at the scoring boundary.
#[derive(Debug, Error)]
pub enum ScoreError {
    #[error("unparseable timestamp {value:?}: {source}")]
    Timestamp {
        value: String,
        #[source]
        source: chrono::ParseError,
    },
    #[error("amount must be a non-negative number, got {0}")]
    InvalidAmount(f64),
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
}

/// Startup configuration rejected by validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("velocity_probability must be within [0, 1], got {0}")]
    VelocityProbability(f64),
    #[error("high_amount must be non-negative, got {0}")]
    HighAmount(f64),
    #[error("invalid time of day {value:?} for {field}")]
    TimeOfDay { field: &'static str, value: String },
    #[error("source amount range is empty: {min}..={max}")]
    AmountRange { min: f64, max: f64 },
    #[error("source batch range is empty: {min}..={max}")]
    BatchRange { min: usize, max: usize },
    #[error("source needs at least one user and one transaction location")]
    EmptySource,
    #[error("rule {label:?} must be worth at least one point")]
    ZeroPoints { label: String },
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

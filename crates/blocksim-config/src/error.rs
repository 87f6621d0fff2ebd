use std::path::PathBuf;

use thiserror::Error;

/// Category 1 of spec.md §7: raised at world construction, before any event
/// is scheduled.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path} as JSON: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{file}: {source}")]
    InvalidDistribution {
        file: PathBuf,
        #[source]
        source: blocksim_sampling::SampleError,
    },

    #[error(
        "location sets disagree: {reference_file} has {reference:?}, {other_file} has {other:?}"
    )]
    LocationSetMismatch {
        reference_file: PathBuf,
        reference: Vec<String>,
        other_file: PathBuf,
        other: Vec<String>,
    },

    #[error("simulation duration must be a positive integer number of seconds, got {0}")]
    InvalidDuration(f64),

    #[error("malformed tuple parameter {value:?} in {field}: {source}")]
    InvalidTuple {
        field: String,
        value: String,
        #[source]
        source: std::num::ParseFloatError,
    },

    #[error("{field} expects a (lo, hi) pair, got {count} values")]
    WrongArity { field: String, count: usize },
}

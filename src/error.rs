//! Error types for label parsing, transforms and dataset processing.

use std::path::PathBuf;
use thiserror::Error;

/// A single label line that could not be turned into a box.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LabelParseError {
    #[error("line {line}: expected 5 tokens, found {found}")]
    WrongTokenCount { line: usize, found: usize },

    #[error("line {line}: invalid class id '{token}'")]
    InvalidClassId { line: usize, token: String },

    #[error("line {line}: invalid coordinate '{token}'")]
    InvalidCoordinate { line: usize, token: String },

    #[error("line {line}: non-finite coordinate '{token}'")]
    NonFinite { line: usize, token: String },
}

/// Why a single augmented variant was rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransformError {
    #[error("image has zero width or height")]
    EmptyImage,

    #[error("box {index} has no area before transforming")]
    InvalidInputBox { index: usize },

    #[error("box {index} became unrepresentable after {op}")]
    Unrepresentable { index: usize, op: &'static str },
}

/// Problems with the transform spec or run options.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("probability for {op} must be in [0.0, 1.0] (got {p})")]
    Probability { op: &'static str, p: f64 },

    #[error("{name} must be in [0.0, {max}] (got {value})")]
    OutOfRange {
        name: &'static str,
        value: f64,
        max: f64,
    },

    #[error("variants per sample must be at least 1")]
    NoVariants,

    #[error("failed to read transform config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse transform config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors surfaced by the dataset orchestrator.
///
/// Only `Write`, `Config` and `ThreadPool` escape [`crate::augment_dataset`];
/// the data-quality variants are logged and counted per sample.
#[derive(Debug, Error)]
pub enum AugmentError {
    #[error("failed to decode image {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("failed to read labels {path}: {source}")]
    LabelRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {reason}")]
    Write { path: PathBuf, reason: String },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl AugmentError {
    pub(crate) fn write(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        AugmentError::Write {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

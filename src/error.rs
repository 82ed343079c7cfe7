use std::{io, path::PathBuf};

use ndarray_npy::{ReadNpyError, WriteNpyError};
use thiserror::Error;

use crate::{Ab, Bucket};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to load artifact: {0}")]
    Load(#[from] LoadError),

    #[error("inconsistent artifacts: {0}")]
    Consistency(#[from] ConsistencyError),

    #[error("expected {expected}, got shape {found:?}")]
    Shape {
        expected: &'static str,
        found: Vec<usize>,
    },

    #[error("unknown bucket {bucket} at {position:?}")]
    UnknownBucket { bucket: Bucket, position: Vec<usize> },

    /// An input ab-value is NaN, infinite, or too large for `f32`.
    #[error("ab-value {ab:?} at {position:?} is not a finite f32 pair")]
    NonFiniteAb { ab: [f64; 2], position: Vec<usize> },

    #[error("failed to encode npy data: {0}")]
    Encode(#[from] WriteNpyError),
}

/// A palette or index artifact could not be read or is structurally invalid.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid npy data: {0}")]
    Npy(#[from] ReadNpyError),

    #[error("invalid json data: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported npy dtype")]
    UnsupportedDtype,

    #[error("palette must have shape (N, 2), got {0:?}")]
    PaletteShape(Vec<usize>),

    #[error("palette row {row} holds {value}, which is not an integral ab-value")]
    NonIntegral { row: usize, value: f64 },

    #[error("palette is empty")]
    EmptyPalette,

    #[error("malformed nearest-neighbor index: {0}")]
    MalformedIndex(String),
}

/// The palette and the nearest-neighbor index do not describe the same buckets.
#[derive(Debug, Error)]
pub enum ConsistencyError {
    #[error("index expects {index} input features, palette has {palette} columns")]
    DimensionMismatch { index: usize, palette: usize },

    #[error("ab-value {ab:?} appears at palette rows {first} and {second}")]
    DuplicateEntry { ab: Ab, first: usize, second: usize },

    #[error("index label {label} is outside the bucket range 1..={len}")]
    LabelOutOfRange { label: Bucket, len: usize },

    #[error("palette entry {ab:?} is bucket {bucket}, but the index predicts {predicted}")]
    Mislabeled {
        ab: Ab,
        bucket: Bucket,
        predicted: Bucket,
    },

    #[error("index returned {found} predictions for {expected} points")]
    PredictionCount { expected: usize, found: usize },

    #[error("bucket {bucket} predicted for pixel {pixel} does not fit in i32")]
    BucketOverflow { bucket: Bucket, pixel: usize },
}

impl LoadError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

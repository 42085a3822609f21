use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AbsorptionError {
    #[error("unsupported volume format: {0}")]
    Format(String),

    #[error("{axis} range {start}..{end} out of bounds for dimension {len}")]
    OutOfRange {
        axis: &'static str,
        start: usize,
        end: usize,
        len: usize,
    },

    #[error("invalid shape: {0}")]
    InvalidShape(String),

    #[error("region has zero area ({rows} rows x {cols} columns)")]
    EmptyRegion { rows: usize, cols: usize },

    #[error("the number of points should be even, got {0}")]
    OddPointCount(usize),

    #[error("need at least 2 samples to fit, got {0}")]
    InsufficientSamples(usize),

    #[error("signal of length {len} is too short to filter (need at least {required})")]
    SignalTooShort { len: usize, required: usize },

    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Shape(#[from] ndarray::ShapeError),

    #[error(transparent)]
    Npy(#[from] ndarray_npy::ReadNpyError),

    #[error(transparent)]
    Npz(#[from] ndarray_npy::ReadNpzError),

    #[error(transparent)]
    Tiff(#[from] tiff::TiffError),
}

impl AbsorptionError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Builds an `OutOfRange` for a single index, reported as `index..index + 1`.
    pub(crate) fn index_out_of_range(axis: &'static str, index: usize, len: usize) -> Self {
        Self::OutOfRange {
            axis,
            start: index,
            end: index.saturating_add(1),
            len,
        }
    }
}

pub type Result<T, E = AbsorptionError> = std::result::Result<T, E>;

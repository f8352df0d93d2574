//! Error taxonomy of the batch pipeline.
//!
//! Errors live on two levels:
//! - [`TransformError`] belongs to a single image. It is captured by the task
//!   pool as a `Settled::Failure` and never fails the batch.
//! - [`BatchError`] is fatal for the whole batch: configuration problems are
//!   reported before any job is started, archive problems after every job
//!   settled (in which case no partial archive is returned).

use crate::job_controller::pool::PoolError;
use thiserror::Error;

/// Per-image failure.
#[derive(Debug, Error)]
pub enum TransformError {
    /// The payload is not an image in any recognised format, or is corrupt.
    #[error("cannot decode image: {0}")]
    Decode(String),
    /// The payload looked like an image but could not be loaded.
    #[error("cannot load image: {0}")]
    Load(String),
    #[error("cannot encode output page: {0}")]
    Encode(String),
}

/// Batch-level failure.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("concurrency limit must be at least 1, got {0}")]
    InvalidLimit(usize),
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),
    #[error("failed to write archive: {0}")]
    ArchiveWrite(#[from] zip::result::ZipError),
}

impl From<PoolError> for BatchError {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::InvalidLimit(limit) => BatchError::InvalidLimit(limit),
        }
    }
}

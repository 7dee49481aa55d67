//! Error types for quake-campaign
//!
//! Toyota Way: Clear error messages with actionable guidance (Respect for People)
//!
//! Sample-level skips are deliberately *not* errors: see
//! [`SkipReason`](crate::solver::SkipReason). An `Error` either aborts the
//! current operation (extraction, persistence) or the whole campaign
//! (`SolverFatal`).

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// quake-campaign error types
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid caller-supplied value
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Campaign configuration rejected by validation
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Storage error (dataset/checkpoint/table persistence)
    #[error("Storage error: {0}")]
    StorageError(String),

    /// Solver output artifact missing or unreadable
    #[error("Extraction failed for {}: {reason}", artifact.display())]
    Extraction {
        /// Artifact that could not be used
        artifact: PathBuf,
        /// What was wrong with it
        reason: String,
    },

    /// Parameter name shadows a derived result column
    #[error("Parameter '{0}' collides with a derived result field")]
    FieldCollision(String),

    /// Solver could not be run at all (not a numerical failure)
    #[error("Solver failed fatally: {0}\nCampaign aborted; partial dataset was persisted")]
    SolverFatal(String),

    /// Parallel worker panicked or was cancelled
    #[error("Campaign worker failed: {0}")]
    Worker(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Arrow error
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Parquet error
    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// JSON (config) error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Build an [`Error::Extraction`] for `artifact`.
    pub fn extraction(artifact: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Extraction {
            artifact: artifact.into(),
            reason: reason.into(),
        }
    }
}

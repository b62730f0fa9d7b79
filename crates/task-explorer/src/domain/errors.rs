//! Domain-specific errors.

use std::path::PathBuf;

use thiserror::Error;

/// Failure to evaluate a single project file.
#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed project file {}: {message}", path.display())]
    Malformed { path: PathBuf, message: String },
    #[error("import depth exceeded while evaluating {}", path.display())]
    ImportDepth { path: PathBuf },
}

/// Non-fatal problems recorded on a tree build.
#[derive(Debug, Error)]
pub enum TreeError {
    #[error("invalid filter pattern '{pattern}': {message}")]
    InvalidFilter { pattern: String, message: String },
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
}

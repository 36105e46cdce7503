//! Error types for the correction crate.

use thiserror::Error;

use crate::pipeline::EditOperation;

/// Failures reported by the generation pipeline.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GenerationError {
    #[error("{0}")]
    Failed(String),

    #[error("Generated output could not be used: {0}")]
    UnusableOutput(String),

    #[error("Edit could not be applied: {message}")]
    EditFailed {
        message: String,
        edit: EditOperation,
    },

    #[error("Generation cancelled")]
    Cancelled,
}

impl GenerationError {
    /// The edit that failed to apply, if that is what went wrong.
    pub fn failed_edit(&self) -> Option<&EditOperation> {
        match self {
            GenerationError::EditFailed { edit, .. } => Some(edit),
            _ => None,
        }
    }
}

/// Result type for generation operations.
pub type GenerationResult<T> = Result<T, GenerationError>;

/// Failures reported by the live preview.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PreviewError {
    /// The code did not compile
    #[error("{0}")]
    Compilation(String),

    /// The code compiled but threw while the preview loaded it
    #[error("{0}")]
    Runtime(String),
}

/// Result type for preview operations.
pub type PreviewResult<T> = Result<T, PreviewError>;

//! Error types for latch.
//!
//! Uses thiserror for derive macros and provides user-actionable error messages.
//! Lock conflicts and version mismatches are ordinary return values inside the
//! core; `Conflict` and `Contention` only surface once a caller gives up.

use crate::exit_codes;
use thiserror::Error;

/// Main error type for latch operations.
#[derive(Error, Debug)]
pub enum LatchError {
    /// Malformed input: resource path, agent identity, config value, or arguments.
    #[error("{0}")]
    Validation(String),

    /// A resource is held by someone else.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The project or a named record does not exist.
    #[error("{0}")]
    NotFound(String),

    /// Filesystem operation failed.
    #[error("I/O error: {0}")]
    Io(String),

    /// JSON or YAML encoding failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Optimistic write kept losing to concurrent writers.
    #[error("Write contention: {0}")]
    Contention(String),
}

impl LatchError {
    /// Returns the process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            LatchError::Validation(_) | LatchError::Conflict(_) | LatchError::NotFound(_) => {
                exit_codes::FAILURE
            }
            LatchError::Io(_) | LatchError::Serialization(_) | LatchError::Contention(_) => {
                exit_codes::UNEXPECTED
            }
        }
    }

    /// Short machine-readable kind, used in JSON error output.
    pub fn kind(&self) -> &'static str {
        match self {
            LatchError::Validation(_) => "validation",
            LatchError::Conflict(_) => "conflict",
            LatchError::NotFound(_) => "not_found",
            LatchError::Io(_) => "io",
            LatchError::Serialization(_) => "serialization",
            LatchError::Contention(_) => "contention",
        }
    }
}

/// Result type alias for latch operations.
pub type Result<T> = std::result::Result<T, LatchError>;

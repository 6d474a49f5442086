//! Error kinds raised while registering and running tasks.

use std::fmt;
use std::path::PathBuf;

/// Errors produced while resolving a glob group into files.
#[derive(Debug, thiserror::Error)]
pub enum MatchError {
    #[error("Base directory not found: {0}")]
    NotFound(PathBuf),

    #[error("Invalid glob pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("Failed to read {path}: {message}")]
    Read { path: PathBuf, message: String },
}

/// A single file rejected by a transform.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{path}: {cause}")]
pub struct TransformError {
    /// Path of the rejected file, relative to its glob group base.
    pub path: PathBuf,

    /// Message from the underlying converter.
    pub cause: String,
}

impl TransformError {
    pub fn new(path: impl Into<PathBuf>, cause: impl fmt::Display) -> Self {
        Self {
            path: path.into(),
            cause: cause.to_string(),
        }
    }
}

/// Destination could not be written.
#[derive(Debug, thiserror::Error)]
#[error("Failed to write {path}: {cause}")]
pub struct WriteError {
    pub path: PathBuf,
    pub cause: String,
}

/// Failure of a single leaf task.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error(transparent)]
    Match(#[from] MatchError),

    #[error("{} file(s) failed to transform: {}", .0.len(), join_errors(.0))]
    Transform(Vec<TransformError>),

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error("Misconfigured task: {0}")]
    Misconfigured(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<TransformError> for TaskError {
    fn from(err: TransformError) -> Self {
        TaskError::Transform(vec![err])
    }
}

fn join_errors(errors: &[TransformError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Configuration errors raised when a task is registered.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Task '{0}' is already registered")]
    Duplicate(String),

    #[error("Task '{task}' references unknown task '{missing}'")]
    Unknown { task: String, missing: String },

    #[error("Task composition is cyclic: {}", .0.join(" -> "))]
    Cycle(Vec<String>),

    #[error("Task '{0}' is not registered")]
    NotRegistered(String),
}

//! Error types for the sandql engine

use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

/// Broad classes used to decide how a failure propagates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Parser rejected the statement text.
    Syntax,
    /// Statement was well formed but invalid against the catalog or data.
    Semantic,
    /// A table's indexes disagreed with its rows and were rebuilt.
    IndexConsistency,
    /// The backing store rejected a write or read.
    Persistence,
    /// A configured limit or cancellation stopped the work.
    Resource,
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Syntax error at offset {position}: {expected}")]
    Syntax { position: usize, expected: String },

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Unknown reference: {0}")]
    UnknownReference(String),

    #[error("Index consistency error on table '{table}': {detail}")]
    IndexConsistency { table: String, detail: String },

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Limit exceeded: {0}")]
    LimitExceeded(String),

    #[error("Cancelled before execution")]
    Cancelled,

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl EngineError {
    pub fn syntax(position: usize, expected: impl Into<String>) -> Self {
        EngineError::Syntax {
            position,
            expected: expected.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Syntax { .. } => ErrorKind::Syntax,
            EngineError::AlreadyExists(_)
            | EngineError::NotFound(_)
            | EngineError::TypeMismatch(_)
            | EngineError::ConstraintViolation(_)
            | EngineError::UnknownReference(_) => ErrorKind::Semantic,
            EngineError::IndexConsistency { .. } => ErrorKind::IndexConsistency,
            EngineError::Persistence(_)
            | EngineError::Io(_)
            | EngineError::Serialization(_) => ErrorKind::Persistence,
            EngineError::LimitExceeded(_) | EngineError::Cancelled | EngineError::Config(_) => {
                ErrorKind::Resource
            }
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Serialization(err.to_string())
    }
}

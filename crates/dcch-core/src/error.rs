//! Error taxonomy for the harness.
//!
//! Only conditions that abort a pipeline stage are errors. Comparison
//! outcomes (diagnostic mismatches, output mismatches, oracle divergences)
//! are collected as [`crate::domain::result::Failure`] values instead.

use std::path::PathBuf;

/// Errors produced by the harness.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("environment failure at {}: {reason}", path.display())]
    Environment { path: PathBuf, reason: String },

    #[error("compiler fault in {compiler}: {detail}")]
    CompilerFault { compiler: String, detail: String },

    #[error("invalid run request: {0}")]
    InvalidRequest(String),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("invalid diagnostic record: {0}")]
    InvalidDiagnostic(String),

    #[error("excuse registry error: {0}")]
    ExcuseRegistry(String),

    #[error("run cancelled")]
    Cancelled,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl HarnessError {
    /// Wrap an IO failure that happened while touching `path`.
    pub fn environment(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        HarnessError::Environment {
            path: path.into(),
            reason: err.to_string(),
        }
    }

    pub fn compiler_fault(compiler: impl Into<String>, detail: impl Into<String>) -> Self {
        HarnessError::CompilerFault {
            compiler: compiler.into(),
            detail: detail.into(),
        }
    }

    /// Whether this error aborts the run with no further pipeline stages.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            HarnessError::Environment { .. }
                | HarnessError::CompilerFault { .. }
                | HarnessError::InvalidConfiguration(_)
                | HarnessError::Io(_)
        )
    }
}

/// Result type for harness operations.
pub type Result<T> = std::result::Result<T, HarnessError>;

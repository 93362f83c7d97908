//! CLI error types.

use plcsync_core::CoreError;
use plcsync_engine::EngineError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for CLI commands.
pub type CliResult<T> = Result<T, CliError>;

/// Errors reported by CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// Record file could not be read.
    #[error("cannot read {path}: {source}")]
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Record file or argument is not valid JSON.
    #[error("invalid JSON in {what}: {source}")]
    Json {
        /// What was being parsed.
        what: String,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// Record content is invalid.
    #[error(transparent)]
    Record(#[from] CoreError),

    /// Gateway error.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Bad command-line usage.
    #[error("{0}")]
    Usage(String),
}

impl CliError {
    /// Creates a usage error.
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage(message.into())
    }
}

//! Error types for Retrace

use thiserror::Error;

/// Core error type for Retrace operations.
///
/// Missing sessions, messages, projects or snapshots are not errors; they
/// surface as `None` or empty collections. Only malformed input and failures
/// to run the version control executable end up here.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid {kind} id: {value:?}")]
    InvalidId { kind: &'static str, value: String },

    #[error("Invalid file path: {0:?}")]
    InvalidPath(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Failed to run {program}: {source}")]
    GitSpawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("git {command} exited with {status}: {stderr}")]
    Git {
        command: String,
        status: String,
        stderr: String,
    },
}

impl Error {
    /// Whether this error was caused by caller input rather than the environment.
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, Error::InvalidId { .. } | Error::InvalidPath(_))
    }
}

/// Result alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;

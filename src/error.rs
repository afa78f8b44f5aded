//! Error types for process supervision

use thiserror::Error;

/// Errors surfaced by the supervisor.
///
/// Only [`SupervisorError::ProcessTable`] is fatal to a cascade. Everything
/// else either happens before a cascade starts (configuration) or is reported
/// by the wrapper as an exit status.
#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("Failed to enumerate the process table: {0}")]
    ProcessTable(String),
    #[error("Failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid pattern for category `{category}`: {reason}")]
    InvalidPattern { category: String, reason: String },
    #[error("Unknown signal `{0}`")]
    InvalidSignal(String),
    #[error("Config error: {0}")]
    Config(String),
}

impl SupervisorError {
    /// Whether this error must abort the invocation with a non-zero status
    pub fn is_fatal(&self) -> bool {
        matches!(self, SupervisorError::ProcessTable(_))
    }
}

pub type Result<T> = std::result::Result<T, SupervisorError>;

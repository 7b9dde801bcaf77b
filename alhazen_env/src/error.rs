//! Error types for an Alhazen run.

use crate::types::WorkerId;
use thiserror::Error;

/// Errors that can end a run (or prevent one from starting).
///
/// A run reports at most one of these: the first fault observed.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// Invalid participant/round/worker counts, empty condition list,
    /// or structured logging without field names
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// `run()` was called on an orchestrator that has already run
    #[error("Experiment has already been run; construct a new orchestrator")]
    Reuse,

    /// A user hook failed inside a worker
    #[error("Participant {participant} under condition {condition} failed on {worker}: {message}")]
    Participant {
        /// Debug rendering of the condition value ("none" for the null condition)
        condition: String,
        /// Participant index within the condition
        participant: usize,
        /// Worker that executed the task
        worker: WorkerId,
        /// Error or panic message from the hook
        message: String,
    },

    /// A user hook failed in the orchestrator
    #[error("Hook {hook} failed: {message}")]
    Orchestrator {
        /// Name of the hook that failed
        hook: &'static str,
        /// Error or panic message from the hook
        message: String,
    },

    /// The log destination could not be opened or written
    #[error("Logging error: {0}")]
    Logging(String),

    /// A context value could not be stored or read back
    #[error("Context error: {0}")]
    Context(String),

    /// The worker pool could not be started or lost a worker
    #[error("Worker pool error: {0}")]
    Pool(String),
}

impl HarnessError {
    /// Creates a configuration error.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Creates a logging error.
    pub fn logging(msg: impl Into<String>) -> Self {
        Self::Logging(msg.into())
    }

    /// Creates a context error.
    pub fn context(msg: impl Into<String>) -> Self {
        Self::Context(msg.into())
    }

    /// Creates a worker pool error.
    pub fn pool(msg: impl Into<String>) -> Self {
        Self::Pool(msg.into())
    }

    /// Returns true if this error came from a user hook (worker or orchestrator side).
    pub fn is_hook_fault(&self) -> bool {
        matches!(self, Self::Participant { .. } | Self::Orchestrator { .. })
    }
}

/// Result alias used throughout the harness.
pub type Result<T> = std::result::Result<T, HarnessError>;

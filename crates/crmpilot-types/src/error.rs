//! Error taxonomy for the orchestration core.
//!
//! Five recoverable categories (transport, inference, validation,
//! adapter-transient, adapter-permanent) plus the repository error used by
//! the history store. None of these terminate a session; only repository
//! failure propagates out of a request cycle.

use thiserror::Error;

/// Errors from CRM adapter invocations.
///
/// The transient/permanent split drives the dispatcher's retry policy:
/// transient failures are retried with backoff, permanent ones surface
/// immediately.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("CRM unreachable: {0}")]
    Network(String),

    #[error("CRM call timed out")]
    Timeout,

    #[error("CRM authentication failed: {0}")]
    Unauthorized(String),

    #[error("CRM rejected the operation: {0}")]
    Rejected(String),

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("adapter configuration invalid: {0}")]
    Config(String),
}

impl AdapterError {
    /// Whether the dispatcher may retry this failure.
    pub fn is_transient(&self) -> bool {
        matches!(self, AdapterError::Network(_) | AdapterError::Timeout)
    }

    /// Short machine-readable label recorded on failure turns.
    pub fn code(&self) -> &'static str {
        match self {
            AdapterError::Network(_) => "adapter-unreachable",
            AdapterError::Timeout => "adapter-timeout",
            AdapterError::Unauthorized(_) => "adapter-unauthorized",
            AdapterError::Rejected(_) => "adapter-rejected",
            AdapterError::NotFound(_) => "adapter-not-found",
            AdapterError::Config(_) => "adapter-config",
        }
    }
}

/// Errors from the intent inference collaborator.
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("inference provider unreachable: {0}")]
    Unavailable(String),

    #[error("inference call timed out")]
    Timeout,

    #[error("inference output did not match the expected schema: {0}")]
    Malformed(String),
}

/// Errors from the transport channel abstraction.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("channel is not open")]
    Closed,
}

/// Errors from history store implementations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,
}

/// Errors surfaced by the orchestrator when a request cannot even be queued.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("session worker unavailable")]
    WorkerUnavailable,

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

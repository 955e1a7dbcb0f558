//! Error types for the loan conversation orchestrator

use thiserror::Error;

/// Result type alias for orchestrator operations
pub type Result<T> = std::result::Result<T, OrchestrationError>;

#[derive(Error, Debug)]
pub enum OrchestrationError {

    // =============================
    // Session Store Errors
    // =============================

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Session already exists: {0}")]
    SessionAlreadyExists(String),

    #[error("Version conflict for session {session_id}: expected {expected}, found {actual}")]
    VersionConflict {
        session_id: String,
        expected: u64,
        actual: u64,
    },

    /// A second compare-and-swap conflict on the same turn. The turn is
    /// abandoned rather than risking a double-applied message.
    #[error("Concurrent modification of session {0}")]
    ConcurrentModification(String),

    // =============================
    // Invariant / Programming Errors
    // =============================

    #[error("Illegal stage transition: {from} -> {to}")]
    IllegalTransition { from: String, to: String },

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Session {0} is terminal and accepts no further turns")]
    TerminalSession(String),

    // =============================
    // Collaborator Errors
    // =============================

    #[error("Collaborator error ({collaborator}): {detail}")]
    CollaboratorError {
        collaborator: &'static str,
        detail: String,
    },

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Audit error: {0}")]
    AuditError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("UUID parse error: {0}")]
    UuidError(#[from] uuid::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl OrchestrationError {
    /// Invariant-class failures are operator bugs, not user or business
    /// outcomes; callers log them distinctly and surface a generic reply.
    pub fn is_invariant_error(&self) -> bool {
        matches!(
            self,
            OrchestrationError::IllegalTransition { .. }
                | OrchestrationError::InvariantViolation(_)
                | OrchestrationError::ConcurrentModification(_)
        )
    }
}

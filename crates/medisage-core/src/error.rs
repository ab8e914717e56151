//! Error types for the assessment engine.

use thiserror::Error;

/// Why a completion call did not produce a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionErrorKind {
    /// Transport failure or retryable status after the attempt budget ran out.
    Unavailable,
    /// Non-retryable provider response (bad request, bad credentials).
    Rejected,
    /// Success status but no assistant text in the payload.
    EmptyResponse,
    /// The overall deadline elapsed.
    Timeout,
}

impl std::fmt::Display for CompletionErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CompletionErrorKind::Unavailable => "unavailable",
            CompletionErrorKind::Rejected => "rejected",
            CompletionErrorKind::EmptyResponse => "empty response",
            CompletionErrorKind::Timeout => "timeout",
        };
        f.write_str(s)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Completion {kind}: {message}")]
pub struct CompletionError {
    pub kind: CompletionErrorKind,
    pub message: String,
}

impl CompletionError {
    pub fn new(kind: CompletionErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Message has no text and no attachments")]
    EmptyMessage,

    #[error(transparent)]
    Completion(#[from] CompletionError),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Session {0} belongs to another owner")]
    NotOwner(String),

    #[error("Assessment not found: {0}")]
    AssessmentNotFound(uuid::Uuid),

    #[error("Unsupported test variant: {0}")]
    UnsupportedVariant(String),

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

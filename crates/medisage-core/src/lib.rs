//! Conversational assessment engine for MediSage.

pub mod attachment;
mod assessment_store;
mod completion;
mod db;
mod error;
pub mod formatter;
mod orchestrator;
pub mod scoring;

pub use assessment_store::AssessmentStore;
pub use completion::{
    AttemptError, CompletionClient, CompletionSettings, CompletionTransport, HttpTransport,
    HttpTransportConfig, RetryPolicy, is_retryable_status,
};
pub use db::SessionStore;
pub use error::{CompletionError, CompletionErrorKind, EngineError};
pub use orchestrator::{
    APOLOGY, OrchestratorConfig, SessionOrchestrator, TurnOutcome, TurnPhase, TurnRequest,
};

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

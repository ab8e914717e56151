//! Per-turn orchestration of formatting, completion and persistence.
//!
//! A turn moves `Idle -> Formatting -> AwaitingCompletion -> Persisting -> Idle`.
//! Completion failures do not abort the turn: the user's message is stored
//! together with an apology reply so the conversation stays consistent.
//! Turns for the same session id are serialized by a per-session lock; turns
//! for different sessions run concurrently.

use crate::error::CompletionErrorKind;
use crate::{AssessmentStore, CompletionClient, EngineError, Result, SessionStore, formatter, scoring};
use chrono::Utc;
use dashmap::DashMap;
use medisage_types::{
    AssessmentForm, Attachment, ConversationTurn, RiskAssessmentRecord, Session, SessionSummary,
    TestVariant,
};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, info};
use uuid::Uuid;

/// Reply stored when the completion call fails.
pub const APOLOGY: &str = "Sorry, there was an error processing your request. Please try again.";

/// Where a turn currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Idle,
    Formatting,
    AwaitingCompletion,
    Persisting,
    Failed,
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub system_prompt: Option<String>,
    /// Prior non-system turns sent with each request.
    pub history_window: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            system_prompt: Some(
                "You are MediSage, a careful health assistant. Answer clearly, \
                 and recommend seeing a clinician for diagnosis or treatment."
                    .to_string(),
            ),
            history_window: 20,
        }
    }
}

/// New user input for a session.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    /// Existing or client-chosen id; a new one is generated when absent.
    pub session_id: Option<String>,
    pub owner_id: String,
    pub text: String,
    pub attachments: Vec<Attachment>,
}

/// Result of a handled turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub session_id: String,
    /// Assistant text as stored (the apology on failure).
    pub reply: String,
    /// Set when the completion call failed and the apology was stored.
    pub failure: Option<CompletionErrorKind>,
    pub session: Session,
}

impl TurnOutcome {
    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }
}

/// Holds a session's lock; drops the map entry when nobody else wants it.
struct SessionLease<'a> {
    locks: &'a DashMap<String, Arc<Mutex<()>>>,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for SessionLease<'_> {
    fn drop(&mut self) {
        self.guard.take();
        self.locks
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}

pub struct SessionOrchestrator {
    sessions: Arc<SessionStore>,
    assessments: Arc<AssessmentStore>,
    completion: CompletionClient,
    config: OrchestratorConfig,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl SessionOrchestrator {
    pub fn new(
        sessions: Arc<SessionStore>,
        assessments: Arc<AssessmentStore>,
        completion: CompletionClient,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            sessions,
            assessments,
            completion,
            config,
            locks: DashMap::new(),
        }
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn assessments(&self) -> &Arc<AssessmentStore> {
        &self.assessments
    }

    async fn lease(&self, session_id: &str) -> SessionLease<'_> {
        let lock = self
            .locks
            .entry(session_id.to_string())
            .or_default()
            .clone();
        SessionLease {
            locks: &self.locks,
            key: session_id.to_string(),
            guard: Some(lock.lock_owned().await),
        }
    }

    /// Number of sessions with a turn in flight.
    pub fn in_flight(&self) -> usize {
        self.locks.len()
    }

    fn enter(&self, session_id: &str, phase: TurnPhase) {
        debug!(target: "medisage::chat", "Session {}: {:?}", session_id, phase);
    }

    /// Handle one user turn end to end.
    ///
    /// Fails only on empty input, an ownership mismatch, or a store error.
    /// Completion failures are absorbed into an apology reply.
    pub async fn submit(&self, request: TurnRequest) -> Result<TurnOutcome> {
        let TurnRequest {
            session_id,
            owner_id,
            text,
            attachments,
        } = request;
        let session_id = session_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        self.enter(&session_id, TurnPhase::Formatting);
        formatter::user_blocks(&text, &attachments)?;

        let _lease = self.lease(&session_id).await;

        let history = match self.sessions.get(&session_id)? {
            Some(session) if !session.readable_by(&owner_id) => {
                return Err(EngineError::NotOwner(session_id));
            }
            Some(session) => session.turns,
            None => Vec::new(),
        };

        let messages = formatter::format_conversation(
            &history,
            &text,
            &attachments,
            self.config.history_window,
        )?;
        let user_turn = ConversationTurn::user(text, attachments);

        self.enter(&session_id, TurnPhase::AwaitingCompletion);
        let result = self
            .completion
            .complete(self.config.system_prompt.as_deref(), messages)
            .await;

        let (reply, failure) = match result {
            Ok(reply) => (reply, None),
            Err(e) => {
                self.enter(&session_id, TurnPhase::Failed);
                error!(
                    target: "medisage::chat",
                    "Completion failed for session {}: {}; storing apology", session_id, e
                );
                (APOLOGY.to_string(), Some(e.kind))
            }
        };

        self.enter(&session_id, TurnPhase::Persisting);
        let assistant_turn = ConversationTurn::assistant(reply.clone());
        let session = self
            .sessions
            .upsert_append(&session_id, &owner_id, &[user_turn, assistant_turn])
            .inspect_err(|e| {
                error!(target: "medisage::chat", "Failed to persist turn for {}: {}", session_id, e);
            })?;

        self.enter(&session_id, TurnPhase::Idle);
        info!(
            target: "medisage::chat",
            "Session {} now has {} turns (success: {})",
            session_id,
            session.turns.len(),
            failure.is_none()
        );

        Ok(TurnOutcome {
            session_id,
            reply,
            failure,
            session,
        })
    }

    /// Append already-formed turns without calling the model.
    pub async fn append_turns(
        &self,
        session_id: &str,
        owner_id: &str,
        turns: Vec<ConversationTurn>,
    ) -> Result<Session> {
        let _lease = self.lease(session_id).await;
        if let Some(existing) = self.sessions.get(session_id)? {
            if !existing.readable_by(owner_id) {
                return Err(EngineError::NotOwner(session_id.to_string()));
            }
        }
        self.sessions.upsert_append(session_id, owner_id, &turns)
    }

    /// Fetch a session, enforcing ownership when a caller is given.
    pub fn get_session(&self, session_id: &str, caller: Option<&str>) -> Result<Session> {
        let session = self
            .sessions
            .get(session_id)?
            .ok_or_else(|| EngineError::SessionNotFound(session_id.to_string()))?;
        match caller {
            Some(owner) if !session.readable_by(owner) => {
                Err(EngineError::NotOwner(session_id.to_string()))
            }
            _ => Ok(session),
        }
    }

    pub fn list_sessions(&self, owner_id: &str, limit: usize) -> Result<Vec<SessionSummary>> {
        self.sessions.list_by_owner(owner_id, limit)
    }

    /// Delete a session owned by `owner_id`. Sessions owned by someone else
    /// are reported as not found.
    pub async fn delete_session(&self, session_id: &str, owner_id: &str) -> Result<()> {
        let _lease = self.lease(session_id).await;
        match self.sessions.get(session_id)? {
            Some(session) if session.owner_id == owner_id => {
                self.sessions.delete(session_id)?;
                info!(target: "medisage::chat", "Deleted session {}", session_id);
                Ok(())
            }
            _ => Err(EngineError::SessionNotFound(session_id.to_string())),
        }
    }

    /// Score a form and store the result as a new record.
    pub fn submit_assessment(
        &self,
        owner_id: &str,
        test_variant: &str,
        form: AssessmentForm,
    ) -> Result<RiskAssessmentRecord> {
        let variant: TestVariant = test_variant
            .parse()
            .map_err(|_| EngineError::UnsupportedVariant(test_variant.to_string()))?;
        let result = scoring::score(variant, &form);

        let record = RiskAssessmentRecord {
            test_id: Uuid::new_v4(),
            owner_id: owner_id.to_string(),
            test_variant: variant,
            input_form: form,
            score: result.score,
            risk_label: result.risk_label,
            created_at: Utc::now(),
        };
        self.assessments.insert(&record)?;

        info!(
            target: "medisage::assessment",
            "Stored {} assessment {} for {}: score {} ({})",
            variant,
            record.test_id,
            owner_id,
            record.score,
            record.risk_label.as_str()
        );
        Ok(record)
    }

    pub fn list_assessments(&self, owner_id: &str, limit: usize) -> Result<Vec<RiskAssessmentRecord>> {
        self.assessments.list_by_owner(owner_id, limit)
    }

    pub fn get_assessment(&self, test_id: Uuid) -> Result<RiskAssessmentRecord> {
        self.assessments
            .get(test_id)?
            .ok_or(EngineError::AssessmentNotFound(test_id))
    }
}

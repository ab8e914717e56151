//! Shared application state.

use crate::config::Config;
use medisage_core::{
    AssessmentStore, CompletionClient, CompletionTransport, HttpTransport, SessionOrchestrator,
    SessionStore,
};
use std::sync::Arc;
use tracing::warn;

/// Shared application state.
pub struct AppState {
    pub orchestrator: Arc<SessionOrchestrator>,
    pub config: Config,
}

impl AppState {
    /// Build state backed by the configured HTTPS completion endpoint.
    pub fn new(config: Config) -> medisage_core::Result<Self> {
        let api_key = std::env::var(&config.completion.api_key_env).unwrap_or_else(|_| {
            warn!(
                target: "medisage::startup",
                "{} is not set; completion calls will be rejected",
                config.completion.api_key_env
            );
            String::new()
        });
        let transport = HttpTransport::new(config.completion.transport(api_key))?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Build state with a caller-supplied transport.
    pub fn with_transport(
        config: Config,
        transport: Arc<dyn CompletionTransport>,
    ) -> medisage_core::Result<Self> {
        let sessions = Arc::new(SessionStore::open(&config.db_path)?);
        let assessments = Arc::new(AssessmentStore::open(&config.db_path)?);
        let completion = CompletionClient::new(transport, config.completion.settings());
        let orchestrator = Arc::new(SessionOrchestrator::new(
            sessions,
            assessments,
            completion,
            config.chat.orchestrator(),
        ));

        Ok(Self {
            orchestrator,
            config,
        })
    }
}

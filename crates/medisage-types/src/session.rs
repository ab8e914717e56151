//! Session types and the list projection.

use crate::{ConversationTurn, Role};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Owner id used when no user is signed in.
pub const ANONYMOUS_OWNER: &str = "anonymous";

/// Title shown for a session with no user text yet.
pub const DEFAULT_TITLE: &str = "New Chat";

const TITLE_CHARS: usize = 50;
const PREVIEW_CHARS: usize = 100;

/// An append-only conversation identified by its session id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub session_id: String,
    pub owner_id: String,
    /// Turns in insertion order.
    pub turns: Vec<ConversationTurn>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Whether `owner_id` may read this session.
    pub fn readable_by(&self, owner_id: &str) -> bool {
        self.owner_id == owner_id || self.owner_id == ANONYMOUS_OWNER
    }
}

/// Summary view of a session for listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: String,
    pub title: String,
    pub last_message: String,
    pub timestamp: DateTime<Utc>,
    /// Number of user/assistant exchanges.
    pub message_count: usize,
    pub turn_count: usize,
}

impl From<&Session> for SessionSummary {
    fn from(s: &Session) -> Self {
        let title = s
            .turns
            .iter()
            .find(|t| t.role == Role::User)
            .map(|t| t.text())
            .filter(|text| !text.trim().is_empty())
            .map(|text| truncate_chars(&text, TITLE_CHARS))
            .unwrap_or_else(|| DEFAULT_TITLE.to_string());

        let last_message = s
            .turns
            .last()
            .map(|t| truncate_chars(&t.text(), PREVIEW_CHARS))
            .unwrap_or_default();

        Self {
            id: s.session_id.clone(),
            title,
            last_message,
            timestamp: s.updated_at,
            message_count: s.turns.len().div_ceil(2),
            turn_count: s.turns.len(),
        }
    }
}

/// Keep the first `max` characters, adding an ellipsis when anything was cut.
fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

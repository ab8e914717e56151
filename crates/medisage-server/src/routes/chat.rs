//! Chat session routes.

use super::{ApiError, ApiJson, ApiQuery, ApiResult, owner_or_anonymous};
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
};
use medisage_core::{TurnRequest, attachment};
use medisage_types::{Attachment, AttachmentKind, ConversationTurn, Session, SessionSummary};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Attachment as sent by the upload widget.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentInput {
    pub url: String,
    #[serde(default)]
    pub name: Option<String>,
    /// `image`, `document`, or a MIME type.
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
}

impl AttachmentInput {
    fn into_attachment(self) -> Attachment {
        let explicit = match self.kind.as_deref().map(str::trim) {
            Some("image") => Some(AttachmentKind::Image),
            Some("document") => Some(AttachmentKind::Document),
            _ => None,
        };
        let content_type = self
            .content_type
            .as_deref()
            .or_else(|| self.kind.as_deref().filter(|k| k.contains('/')));

        let mut described = attachment::describe(&self.url, self.name.as_deref(), content_type);
        if let Some(kind) = explicit {
            described.kind = kind;
        }
        described
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub chat_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub attachments: Vec<AttachmentInput>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub success: bool,
    pub chat_id: String,
    pub response: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Handle one user message. A failed completion still answers 200 with
/// `success: false` and the stored apology.
pub async fn send(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<ChatRequest>,
) -> ApiResult<ChatResponse> {
    let attachments = req
        .attachments
        .into_iter()
        .map(AttachmentInput::into_attachment)
        .collect();

    let outcome = state
        .orchestrator
        .submit(TurnRequest {
            session_id: req.chat_id,
            owner_id: owner_or_anonymous(req.user_id),
            text: req.message,
            attachments,
        })
        .await?;

    Ok(Json(ChatResponse {
        success: outcome.succeeded(),
        error: outcome
            .failure
            .map(|kind| format!("Completion {}", kind)),
        chat_id: outcome.session_id,
        response: outcome.reply,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerQuery {
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub success: bool,
    pub chats: Vec<SessionSummary>,
}

pub async fn history(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<OwnerQuery>,
) -> ApiResult<HistoryResponse> {
    let limit = query.limit.unwrap_or(state.config.chat.list_limit);
    let chats = state
        .orchestrator
        .list_sessions(&owner_or_anonymous(query.owner_id), limit)?;

    Ok(Json(HistoryResponse {
        success: true,
        chats,
    }))
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub success: bool,
    pub chat: Session,
}

pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ApiQuery(query): ApiQuery<OwnerQuery>,
) -> ApiResult<SessionResponse> {
    let chat = state
        .orchestrator
        .get_session(&id, query.owner_id.as_deref())?;
    Ok(Json(SessionResponse {
        success: true,
        chat,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppendRequest {
    #[serde(default)]
    pub owner_id: Option<String>,
    pub turns: Vec<ConversationTurn>,
}

/// Append already-formed turns, creating the session when absent.
pub async fn append(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<AppendRequest>,
) -> ApiResult<SessionResponse> {
    if id.trim().is_empty() {
        return Err(ApiError::bad_request("Chat id is required"));
    }
    let chat = state
        .orchestrator
        .append_turns(&id, &owner_or_anonymous(req.owner_id), req.turns)
        .await?;
    Ok(Json(SessionResponse {
        success: true,
        chat,
    }))
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub success: bool,
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ApiQuery(query): ApiQuery<OwnerQuery>,
) -> ApiResult<DeleteResponse> {
    let owner = owner_or_anonymous(query.owner_id);
    state.orchestrator.delete_session(&id, &owner).await?;
    info!(target: "medisage::api", "Chat {} deleted by {}", id, owner);
    Ok(Json(DeleteResponse { success: true }))
}

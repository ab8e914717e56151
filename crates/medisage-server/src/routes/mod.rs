//! HTTP route handlers.
//!
//! Every response body carries a `success` flag; failures add an `error`
//! string alongside it.

pub mod assessments;
pub mod chat;

use crate::state::AppState;
use axum::{
    Json, Router,
    extract::{
        FromRequest, FromRequestParts,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use medisage_core::EngineError;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, warn};

/// Owner used when a request does not name one.
pub(crate) fn owner_or_anonymous(owner: Option<String>) -> String {
    owner
        .filter(|o| !o.trim().is_empty())
        .unwrap_or_else(|| medisage_types::ANONYMOUS_OWNER.to_string())
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Failure response rendered as `{success: false, error}`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        let status = match &e {
            EngineError::EmptyMessage | EngineError::UnsupportedVariant(_) => {
                StatusCode::BAD_REQUEST
            }
            EngineError::SessionNotFound(_) | EngineError::AssessmentNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            EngineError::NotOwner(_) => StatusCode::FORBIDDEN,
            EngineError::Completion(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            error!(target: "medisage::api", "Request failed: {}", e);
        } else {
            warn!(target: "medisage::api", "Request rejected ({}): {}", status.as_u16(), e);
        }
        Self::new(status, e.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        warn!(target: "medisage::api", "Rejected request body: {}", rejection.body_text());
        Self::new(rejection.status(), rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        warn!(target: "medisage::api", "Rejected query string: {}", rejection.body_text());
        Self::new(rejection.status(), rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "success": false,
            "error": self.message,
        }));
        (self.status, body).into_response()
    }
}

pub type ApiResult<T> = Result<Json<T>, ApiError>;

/// JSON body extractor whose rejections use the `{success: false, error}` envelope.
#[derive(FromRequest)]
#[from_request(via(Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// Query extractor with the same rejection envelope as [`ApiJson`].
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);

/// All `/api` routes, with state attached.
pub fn router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/chat", post(chat::send))
        .route("/chat-history", get(chat::history))
        .route("/chat/{id}", get(chat::get).delete(chat::delete))
        .route("/chat/{id}/turns", post(chat::append))
        .route("/assessments", post(assessments::submit).get(assessments::list))
        .route("/assessments/{id}", get(assessments::get))
        .route("/health", get(health));

    Router::new().nest("/api", api).with_state(state)
}

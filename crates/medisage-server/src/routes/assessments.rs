//! Risk assessment routes.

use super::{ApiError, ApiJson, ApiQuery, ApiResult, owner_or_anonymous};
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
};
use medisage_types::{AssessmentForm, RiskAssessmentRecord, RiskLabel};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    pub test_variant: String,
    #[serde(default)]
    pub form: AssessmentForm,
    #[serde(default, alias = "userId")]
    pub owner_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub success: bool,
    pub test_id: Uuid,
    pub score: i32,
    pub risk_label: RiskLabel,
}

pub async fn submit(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<SubmitRequest>,
) -> ApiResult<SubmitResponse> {
    let record = state.orchestrator.submit_assessment(
        &owner_or_anonymous(req.owner_id),
        &req.test_variant,
        req.form,
    )?;

    Ok(Json(SubmitResponse {
        success: true,
        test_id: record.test_id,
        score: record.score,
        risk_label: record.risk_label,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub success: bool,
    pub tests: Vec<RiskAssessmentRecord>,
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> ApiResult<ListResponse> {
    let limit = query.limit.unwrap_or(state.config.chat.list_limit);
    let tests = state
        .orchestrator
        .list_assessments(&owner_or_anonymous(query.owner_id), limit)?;
    Ok(Json(ListResponse {
        success: true,
        tests,
    }))
}

#[derive(Debug, Serialize)]
pub struct RecordResponse {
    pub success: bool,
    pub test: RiskAssessmentRecord,
}

pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<RecordResponse> {
    let test_id = Uuid::parse_str(&id)
        .map_err(|_| ApiError::bad_request(format!("Invalid test id: {}", id)))?;
    let test = state.orchestrator.get_assessment(test_id)?;
    Ok(Json(RecordResponse {
        success: true,
        test,
    }))
}

//! Visitor tracking endpoints.

use axum::{extract::State, Json};

use super::{error, success, ApiResult};
use crate::errors::AppError;
use crate::models::{RecordVisitRequest, VisitorCount, VisitorRecord};
use crate::AppState;

/// POST /api/visitors - Record a visit for an identity.
pub async fn record_visit(
    State(state): State<AppState>,
    Json(request): Json<RecordVisitRequest>,
) -> ApiResult<VisitorRecord> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    if request.voter_identity.trim().is_empty() {
        return error(
            AppError::Validation("Visitor identity is required".to_string()),
            revision_id,
        );
    }

    match state
        .repo
        .record_visit(&request.voter_identity, request.user_agent.as_deref())
        .await
    {
        Ok(record) => success(record, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// GET /api/visitors/count - Number of distinct visitors.
pub async fn visitor_count(State(state): State<AppState>) -> ApiResult<VisitorCount> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.visitor_count().await {
        Ok(total_visitors) => success(VisitorCount { total_visitors }, revision_id),
        Err(e) => error(e, revision_id),
    }
}

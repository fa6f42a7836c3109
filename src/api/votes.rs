//! Vote API endpoints.

use axum::{
    extract::{Path, Query, State},
    Json,
};

use super::{error, success, ApiResult};
use crate::errors::AppError;
use crate::models::{NewVote, Vote, VoteKind, VoteLookup};
use crate::AppState;

fn parse_kind(raw: &str) -> Result<VoteKind, AppError> {
    VoteKind::parse(raw).ok_or_else(|| AppError::BadRequest(format!("Unknown vote kind '{}'", raw)))
}

/// GET /api/votes/:kind - Votes by one voter on one target.
pub async fn find_votes(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Query(lookup): Query<VoteLookup>,
) -> ApiResult<Vec<Vote>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    let kind = match parse_kind(&kind) {
        Ok(kind) => kind,
        Err(e) => return error(e, revision_id),
    };

    match state
        .repo
        .find_votes(kind, &lookup.target_id, lookup.target_kind, &lookup.voter)
        .await
    {
        Ok(votes) => success(votes, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/votes/:kind - Record a vote; the store recomputes counters.
pub async fn cast_vote(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Json(request): Json<NewVote>,
) -> ApiResult<Vote> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    let kind = match parse_kind(&kind) {
        Ok(kind) => kind,
        Err(e) => return error(e, revision_id),
    };
    if request.voter_identity.trim().is_empty() {
        return error(
            AppError::Validation("Voter identity is required".to_string()),
            revision_id,
        );
    }

    match state.repo.insert_vote(kind, &request).await {
        Ok(inserted) => {
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            if let Some(resource) = inserted.resource {
                state.changes.resource_updated(new_revision, resource);
            }
            if let Some(edit) = inserted.edit {
                state.changes.edit_updated(new_revision, edit);
            }
            success(inserted.vote, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

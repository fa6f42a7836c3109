//! Edit proposal API endpoints.

use axum::extract::{Path, Query, State};
use serde::{Deserialize, Serialize};

use super::{error, success, ApiResult};
use crate::errors::AppError;
use crate::models::{EditQuery, Resource, ResourceEdit};
use crate::AppState;

/// Result of applying an edit: the terminal edit and the updated resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditApproval {
    pub edit: ResourceEdit,
    pub resource: Resource,
}

/// GET /api/edits - List edits, newest first, optionally by `?status=`.
pub async fn list_edits(
    State(state): State<AppState>,
    Query(query): Query<EditQuery>,
) -> ApiResult<Vec<ResourceEdit>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.list_edits(query.status).await {
        Ok(edits) => success(edits, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// GET /api/edits/:id - Get a single edit.
pub async fn get_edit(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<ResourceEdit> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.get_edit(&id).await {
        Ok(Some(edit)) => success(edit, revision_id),
        Ok(None) => error(
            AppError::NotFound(format!("Edit {} not found", id)),
            revision_id,
        ),
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/edits/:id/approve - Apply a pending edit to its resource.
pub async fn approve_edit(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<EditApproval> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.approve_edit(&id).await {
        Ok((edit, resource)) => {
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            state.changes.edit_updated(new_revision, edit.clone());
            state.changes.resource_updated(new_revision, resource.clone());
            success(EditApproval { edit, resource }, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/admin/edits/:id/reject - Reject a pending edit.
pub async fn reject_edit(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<ResourceEdit> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.reject_edit(&id).await {
        Ok(edit) => {
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            state.changes.edit_updated(new_revision, edit.clone());
            success(edit, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

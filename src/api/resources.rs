//! Resource API endpoints.

use axum::{
    extract::{Path, Query, State},
    Json,
};

use super::{error, success, ApiResult};
use crate::errors::AppError;
use crate::models::{
    Moderation, Resource, ResourceEdit, ResourceFields, ResourceQuery, Submission, VoteCounts,
};
use crate::AppState;

/// GET /api/resources - List resources, newest first. `?live=true` for the public view.
pub async fn list_resources(
    State(state): State<AppState>,
    Query(query): Query<ResourceQuery>,
) -> ApiResult<Vec<Resource>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.list_resources(query.live).await {
        Ok(resources) => success(resources, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// GET /api/resources/:id - Get a single resource.
pub async fn get_resource(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Resource> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.get_resource(&id).await {
        Ok(Some(resource)) => success(resource, revision_id),
        Ok(None) => error(
            AppError::NotFound(format!("Resource {} not found", id)),
            revision_id,
        ),
        Err(e) => error(e, revision_id),
    }
}

/// GET /api/resources/:id/counts - Read back store-maintained vote counters.
pub async fn get_vote_counts(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<VoteCounts> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.get_vote_counts(&id).await {
        Ok(counts) => success(counts, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/resources - Community submission. Always starts pending.
pub async fn create_resource(
    State(state): State<AppState>,
    Json(fields): Json<ResourceFields>,
) -> ApiResult<Resource> {
    submit_resource(state, fields, Submission::Community).await
}

/// POST /api/admin/resources - Admin submission. Starts live.
pub async fn admin_create_resource(
    State(state): State<AppState>,
    Json(fields): Json<ResourceFields>,
) -> ApiResult<Resource> {
    submit_resource(state, fields, Submission::Admin).await
}

async fn submit_resource(
    state: AppState,
    fields: ResourceFields,
    submission: Submission,
) -> ApiResult<Resource> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    let fields = fields.normalized();
    if let Err(message) = fields.validate() {
        return error(AppError::Validation(message), revision_id);
    }

    match state.repo.create_resource(&fields, submission).await {
        Ok(resource) => {
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            state.changes.resource_inserted(new_revision, resource.clone());
            success(resource, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/resources/:id/edits - Propose an edit for community review.
pub async fn propose_edit(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(fields): Json<ResourceFields>,
) -> ApiResult<ResourceEdit> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    let fields = fields.normalized();
    if let Err(message) = fields.validate() {
        return error(AppError::Validation(message), revision_id);
    }

    match state.repo.create_edit(&id, &fields).await {
        Ok(edit) => {
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            state.changes.edit_inserted(new_revision, edit.clone());
            success(edit, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// PUT /api/admin/resources/:id - Direct admin edit, skipping review.
pub async fn admin_edit_resource(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(fields): Json<ResourceFields>,
) -> ApiResult<Resource> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    let fields = fields.normalized();
    if let Err(message) = fields.validate() {
        return error(AppError::Validation(message), revision_id);
    }

    match state.repo.admin_update_resource(&id, &fields).await {
        Ok(resource) => {
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            state.changes.resource_updated(new_revision, resource.clone());
            success(resource, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/admin/resources/:id/approve
pub async fn approve_resource(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Resource> {
    moderate(state, id, Moderation::Approve).await
}

/// POST /api/admin/resources/:id/reject
pub async fn reject_resource(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Resource> {
    moderate(state, id, Moderation::Reject).await
}

async fn moderate(state: AppState, id: String, decision: Moderation) -> ApiResult<Resource> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.moderate_resource(&id, decision).await {
        Ok(resource) => {
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            state.changes.resource_updated(new_revision, resource.clone());
            success(resource, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// DELETE /api/admin/resources/:id - Delete a resource.
pub async fn delete_resource(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<()> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.delete_resource(&id).await {
        Ok(()) => {
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            state.changes.resource_deleted(new_revision, id);
            success((), new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

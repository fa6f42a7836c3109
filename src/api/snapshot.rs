//! Snapshot API endpoints.

use axum::extract::State;

use super::{success, ApiResult};
use crate::errors::AppErrorWithRevision;
use crate::models::{DirectorySnapshot, RevisionInfo};
use crate::AppState;

/// GET /api/snapshot - All resources and pending edits at one revision.
pub async fn get_snapshot(State(state): State<AppState>) -> ApiResult<DirectorySnapshot> {
    let snapshot = state
        .repo
        .get_snapshot()
        .await
        .map_err(|e| AppErrorWithRevision {
            error: e,
            revision_id: 0,
        })?;

    let revision_id = snapshot.revision_id;
    success(snapshot, revision_id)
}

/// GET /api/snapshot/revision - Get the current revision info.
pub async fn get_revision(State(state): State<AppState>) -> ApiResult<RevisionInfo> {
    let revision_info =
        state
            .repo
            .get_revision_info()
            .await
            .map_err(|e| AppErrorWithRevision {
                error: e,
                revision_id: 0,
            })?;

    success(revision_info.clone(), revision_info.revision_id)
}

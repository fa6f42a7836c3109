//! Optimistic mutation with rollback.

use std::future::Future;

use super::read_model::{ReadModel, SharedModel};
use super::ClientError;

/// Snapshot the model, apply `change`, then await `remote`. On failure the
/// snapshot is restored exactly; on success nothing else happens and the
/// change stream reconciles.
pub async fn with_rollback<T, C, F>(
    model: &SharedModel,
    change: C,
    remote: F,
) -> Result<T, ClientError>
where
    C: FnOnce(&mut ReadModel),
    F: Future<Output = Result<T, ClientError>>,
{
    let snapshot = model
        .update(|current| {
            let before = current.clone();
            change(current);
            before
        })
        .await;

    let result = remote.await;

    if let (Err(e), Some(snapshot)) = (&result, snapshot) {
        if model.replace(snapshot).await {
            tracing::warn!(error = %e, "Remote write failed, local change rolled back");
        }
    }

    result
}

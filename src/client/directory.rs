//! Resource store operations over the shared read model.

use std::sync::Arc;

use super::completion::CompletionCache;
use super::ledger::{VoteLedger, VoteReceipt};
use super::optimistic::with_rollback;
use super::read_model::{ReadModel, SharedModel};
use super::remote::RemoteStore;
use super::sync::{self, LiveSync, Subscription, VoteCountWatch};
use super::ClientError;
use crate::models::{
    ChangeEvent, Moderation, Resource, ResourceEdit, ResourceFields, RowChange, TargetKind,
    VerificationStatus, VoteKind, VoteType,
};

/// The resource store as seen by one client: a live read model plus the
/// lifecycle operations that change it.
pub struct ResourceDirectory {
    remote: Arc<dyn RemoteStore>,
    model: Arc<SharedModel>,
    ledger: Arc<VoteLedger>,
    cache: Arc<CompletionCache>,
}

impl ResourceDirectory {
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        ledger: Arc<VoteLedger>,
        cache: Arc<CompletionCache>,
    ) -> Self {
        Self {
            remote,
            model: Arc::new(SharedModel::default()),
            ledger,
            cache,
        }
    }

    pub fn model(&self) -> &Arc<SharedModel> {
        &self.model
    }

    /// Initial load: the only full fetch outside of resyncs.
    pub async fn load(&self) -> Result<(), ClientError> {
        sync::resync(self.remote.as_ref(), &self.model).await
    }

    /// Start applying change notifications. Drop the handle to stop.
    pub async fn start_sync(&self) -> Result<Subscription, ClientError> {
        LiveSync::new(self.remote.clone(), self.model.clone())
            .start()
            .await
    }

    pub async fn watch_vote_counts(&self, resource_id: &str) -> Result<VoteCountWatch, ClientError> {
        LiveSync::new(self.remote.clone(), self.model.clone())
            .watch_vote_counts(resource_id)
            .await
    }

    /// Tear down: responses still in flight are ignored from now on.
    pub fn close(&self) {
        self.model.close();
    }

    /// Copy of the current read model.
    pub async fn view(&self) -> ReadModel {
        self.model.read().await.clone()
    }

    pub async fn live_resources(&self) -> Vec<Resource> {
        self.model.read().await.live_resources().to_vec()
    }

    pub async fn all_resources(&self) -> Vec<Resource> {
        self.model.read().await.all_resources().to_vec()
    }

    pub async fn pending_edits(&self) -> Vec<ResourceEdit> {
        self.model.read().await.pending_edits().to_vec()
    }

    pub async fn live_count(&self) -> usize {
        self.model.read().await.live_count()
    }

    /// Community submission. Always enters review, whatever the caller intended.
    pub async fn create_resource(&self, fields: ResourceFields) -> Result<Resource, ClientError> {
        let fields = validated(fields)?;
        let created = self.remote.insert_resource(&fields).await.map_err(|e| {
            tracing::error!(error = %e, name = %fields.name, "Failed to submit resource");
            e
        })?;
        tracing::info!(id = %created.id, "Resource submitted for review");
        self.apply(ChangeEvent::Resources(RowChange::Insert {
            record: created.clone(),
        }))
        .await;
        Ok(created)
    }

    /// Admin submission, live immediately.
    pub async fn admin_create_resource(
        &self,
        fields: ResourceFields,
    ) -> Result<Resource, ClientError> {
        let fields = validated(fields)?;
        let created = self.remote.admin_insert_resource(&fields).await?;
        self.apply(ChangeEvent::Resources(RowChange::Insert {
            record: created.clone(),
        }))
        .await;
        Ok(created)
    }

    /// Propose a change. The resource itself is untouched until approval.
    pub async fn propose_edit(
        &self,
        resource_id: &str,
        fields: ResourceFields,
    ) -> Result<ResourceEdit, ClientError> {
        let fields = validated(fields)?;
        let proposed = self.remote.insert_edit(resource_id, &fields).await?;
        tracing::info!(id = %proposed.id, resource_id, "Edit proposed");
        self.apply(ChangeEvent::ResourceEdits(RowChange::Insert {
            record: proposed.clone(),
        }))
        .await;
        Ok(proposed)
    }

    /// Privileged direct edit; skips the vote workflow.
    pub async fn admin_edit_resource(
        &self,
        resource_id: &str,
        fields: ResourceFields,
    ) -> Result<Resource, ClientError> {
        let fields = validated(fields)?;
        let updated = self.remote.admin_update_resource(resource_id, &fields).await?;
        self.apply(ChangeEvent::Resources(RowChange::Update {
            record: updated.clone(),
        }))
        .await;
        Ok(updated)
    }

    pub async fn approve_resource(&self, resource_id: &str) -> Result<Resource, ClientError> {
        self.moderate(resource_id, Moderation::Approve).await
    }

    pub async fn reject_resource(&self, resource_id: &str) -> Result<Resource, ClientError> {
        self.moderate(resource_id, Moderation::Reject).await
    }

    async fn moderate(
        &self,
        resource_id: &str,
        decision: Moderation,
    ) -> Result<Resource, ClientError> {
        let change = |model: &mut ReadModel| {
            if let Some(mut local) = model.resource(resource_id).cloned() {
                match decision {
                    Moderation::Approve => {
                        local.approved = true;
                        local.verification_status = VerificationStatus::Live;
                    }
                    Moderation::Reject => local.verification_status = VerificationStatus::Rejected,
                }
                model.upsert_resource(local);
            }
        };

        let updated = with_rollback(
            &self.model,
            change,
            self.remote.moderate_resource(resource_id, decision),
        )
        .await?;
        tracing::info!(id = resource_id, status = updated.verification_status.as_str(), "Resource moderated");
        Ok(updated)
    }

    /// Optimistic delete: gone locally at once, restored if the store refuses.
    pub async fn delete_resource(&self, resource_id: &str) -> Result<(), ClientError> {
        with_rollback(
            &self.model,
            |model| {
                model.remove_resource(resource_id);
            },
            self.remote.delete_resource(resource_id),
        )
        .await
        .map_err(|e| {
            tracing::error!(error = %e, id = resource_id, "Delete failed");
            e
        })
    }

    /// Apply a pending edit's fields to its resource. The resource keeps its
    /// moderation state; the edit becomes terminal.
    pub async fn approve_edit(&self, edit_id: &str) -> Result<Resource, ClientError> {
        let (approved, resource) = self.remote.approve_edit(edit_id).await?;
        tracing::info!(edit_id, resource_id = %resource.id, "Edit applied");
        self.apply(ChangeEvent::ResourceEdits(RowChange::Update { record: approved }))
            .await;
        self.apply(ChangeEvent::Resources(RowChange::Update {
            record: resource.clone(),
        }))
        .await;
        Ok(resource)
    }

    pub async fn reject_edit(&self, edit_id: &str) -> Result<ResourceEdit, ClientError> {
        let rejected = self.remote.reject_edit(edit_id).await?;
        self.apply(ChangeEvent::ResourceEdits(RowChange::Update {
            record: rejected.clone(),
        }))
        .await;
        Ok(rejected)
    }

    /// Helpfulness vote on a live resource. A duplicate still marks the
    /// resource as voted for this visitor.
    pub async fn vote_helpfulness(
        &self,
        resource_id: &str,
        vote_type: VoteType,
    ) -> Result<VoteReceipt, ClientError> {
        let result = self
            .ledger
            .cast_vote(VoteKind::Helpfulness, resource_id, TargetKind::Resource, vote_type)
            .await;

        match &result {
            Ok(receipt) => {
                self.cache.mark_voted(resource_id);
                if let Some(counts) = receipt.counts {
                    self.model
                        .update(|model| {
                            if let Some(mut local) = model.resource(resource_id).cloned() {
                                local.helpful_votes = counts.helpful_votes;
                                local.unhelpful_votes = counts.unhelpful_votes;
                                local.verification_votes = counts.verification_votes;
                                model.upsert_resource(local);
                            }
                        })
                        .await;
                }
            }
            Err(e) if e.is_informational() => self.cache.mark_voted(resource_id),
            Err(_) => {}
        }

        result
    }

    pub fn has_voted(&self, resource_id: &str) -> bool {
        self.cache.has_voted(resource_id)
    }

    async fn apply(&self, event: ChangeEvent) {
        self.model.update(|model| model.apply(&event)).await;
    }
}

fn validated(fields: ResourceFields) -> Result<ResourceFields, ClientError> {
    let fields = fields.normalized();
    fields.validate().map_err(ClientError::ValidationFailed)?;
    Ok(fields)
}

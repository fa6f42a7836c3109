//! Community verification of pending resources and edits.
//!
//! A helpful vote on an edit applies it at once. Resource votes only go into
//! the ledger; promoting a resource to live stays an admin decision.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::completion::CompletionCache;
use super::directory::ResourceDirectory;
use super::ledger::VoteLedger;
use super::ClientError;
use crate::models::{Resource, ResourceEdit, TargetKind, VoteKind, VoteType};

/// Exit animation after a recorded vote.
pub const EXIT_DELAY: Duration = Duration::from_millis(800);
/// Shorter exit when the visitor had already voted.
pub const ALREADY_VOTED_EXIT_DELAY: Duration = Duration::from_millis(500);

/// Something awaiting community review.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingItem {
    Resource(Resource),
    Edit(ResourceEdit),
}

impl PendingItem {
    pub fn id(&self) -> &str {
        match self {
            PendingItem::Resource(r) => &r.id,
            PendingItem::Edit(e) => &e.id,
        }
    }
}

/// Client-side phase of an item. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemPhase {
    Pending,
    Resolving,
}

#[derive(Debug, Clone, PartialEq)]
pub enum VerificationOutcome {
    /// The edit was applied to its resource
    EditApplied(Resource),
    /// The vote was recorded
    Recorded,
    /// This visitor had already voted; treated as done
    AlreadyVerified,
}

#[derive(Debug, Default)]
struct ItemSets {
    hidden: HashSet<String>,
    resolving: HashSet<String>,
}

pub struct VerificationController {
    directory: Arc<ResourceDirectory>,
    ledger: Arc<VoteLedger>,
    cache: Arc<CompletionCache>,
    items: Arc<Mutex<ItemSets>>,
}

impl VerificationController {
    pub fn new(
        directory: Arc<ResourceDirectory>,
        ledger: Arc<VoteLedger>,
        cache: Arc<CompletionCache>,
    ) -> Self {
        Self {
            directory,
            ledger,
            cache,
            items: Arc::new(Mutex::new(ItemSets::default())),
        }
    }

    /// Items this visitor can still review: pending community submissions,
    /// then pending edits. Completed and hidden items are excluded; admin
    /// submissions never appear.
    pub async fn pending_items(&self) -> Vec<PendingItem> {
        let model = self.directory.model().read().await;
        let items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        let open = |id: &str| !self.cache.has_completed(id) && !items.hidden.contains(id);

        let resources = model
            .all_resources()
            .iter()
            .filter(|r| r.needs_review())
            .filter(|r| open(&r.id))
            .cloned()
            .map(PendingItem::Resource);

        let edits = model
            .pending_edits()
            .iter()
            .filter(|e| e.is_pending())
            .filter(|e| open(&e.id))
            .cloned()
            .map(PendingItem::Edit);

        resources.chain(edits).collect()
    }

    pub fn phase(&self, item_id: &str) -> ItemPhase {
        let items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        if items.resolving.contains(item_id) {
            ItemPhase::Resolving
        } else {
            ItemPhase::Pending
        }
    }

    /// The section shows unless ignored or empty.
    pub async fn section_visible(&self) -> bool {
        !self.cache.is_ignored() && !self.pending_items().await.is_empty()
    }

    pub fn is_minimized(&self) -> bool {
        self.cache.is_minimized()
    }

    pub fn toggle_minimized(&self) -> bool {
        self.cache.toggle_minimized()
    }

    pub fn ignore_section(&self) {
        self.cache.ignore();
    }

    pub fn show_section(&self) {
        self.cache.show();
    }

    /// One helpful vote applies an edit.
    pub async fn vote_helpful_on_edit(
        &self,
        edit_id: &str,
    ) -> Result<VerificationOutcome, ClientError> {
        self.set_resolving(edit_id, true);
        match self.directory.approve_edit(edit_id).await {
            Ok(resource) => {
                self.cache.mark_completed(edit_id);
                self.hide_after(edit_id, EXIT_DELAY);
                Ok(VerificationOutcome::EditApplied(resource))
            }
            Err(e) => {
                self.set_resolving(edit_id, false);
                tracing::warn!(error = %e, edit_id, "Edit approval failed");
                Err(e)
            }
        }
    }

    /// Unhelpful vote on an edit; recorded, never applied.
    pub async fn vote_unhelpful_on_edit(
        &self,
        edit_id: &str,
    ) -> Result<VerificationOutcome, ClientError> {
        self.record_vote(edit_id, TargetKind::ResourceEdit, VoteType::Unhelpful)
            .await
    }

    pub async fn vote_on_resource(
        &self,
        resource_id: &str,
        vote_type: VoteType,
    ) -> Result<VerificationOutcome, ClientError> {
        self.record_vote(resource_id, TargetKind::Resource, vote_type)
            .await
    }

    async fn record_vote(
        &self,
        item_id: &str,
        target_kind: TargetKind,
        vote_type: VoteType,
    ) -> Result<VerificationOutcome, ClientError> {
        self.set_resolving(item_id, true);

        match self
            .ledger
            .cast_vote(VoteKind::Verification, item_id, target_kind, vote_type)
            .await
        {
            Ok(_) => {
                self.cache.mark_completed(item_id);
                self.hide_after(item_id, EXIT_DELAY);
                Ok(VerificationOutcome::Recorded)
            }
            Err(ClientError::AlreadyVoted) => {
                self.set_resolving(item_id, false);
                self.cache.mark_completed(item_id);
                self.hide_after(item_id, ALREADY_VOTED_EXIT_DELAY);
                Ok(VerificationOutcome::AlreadyVerified)
            }
            Err(e) => {
                self.set_resolving(item_id, false);
                Err(e)
            }
        }
    }

    fn set_resolving(&self, item_id: &str, resolving: bool) {
        let mut items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        if resolving {
            items.resolving.insert(item_id.to_string());
        } else {
            items.resolving.remove(item_id);
        }
    }

    fn hide_after(&self, item_id: &str, delay: Duration) {
        let items = self.items.clone();
        let item_id = item_id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let mut items = items.lock().unwrap_or_else(|e| e.into_inner());
            items.resolving.remove(&item_id);
            items.hidden.insert(item_id);
        });
    }
}
